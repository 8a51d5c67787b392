pub mod activity;

use std::sync::Arc;

use anyhow::{Context, Result};
use http::StatusCode;
use octocrab::{GitHubError, Octocrab};
use sentinel_core::{config::GitHubConfig, error::AdapterError, models::RepoId};
use serde::{Deserialize, Serialize, de::IgnoredAny};
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};

use crate::activity::{Activity, CommitSummary, IssueSummary};

const PER_PAGE: u8 = 100;
const MAX_PAGES: u32 = 10;

#[derive(Clone)]
pub struct GitHub {
    pub client: Octocrab,
}

#[derive(Serialize)]
struct ListParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    since: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    direction: Option<&'a str>,
    per_page: u8,
    page: u32,
}

#[derive(Deserialize)]
struct CommitEntry {
    sha: String,
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    message: String,
}

#[derive(Deserialize)]
struct IssueEntry {
    number: u64,
    title: String,
    closed_at: Option<String>,
    pull_request: Option<IgnoredAny>,
}

#[derive(Deserialize)]
struct PullEntry {
    number: u64,
    title: Option<String>,
    merged_at: Option<String>,
    updated_at: Option<String>,
}

fn parse_timestamp(value: Option<&str>) -> Option<OffsetDateTime> {
    value.and_then(|v| OffsetDateTime::parse(v, &Rfc3339).ok())
}

impl GitHub {
    pub fn new(config: &GitHubConfig) -> Result<Arc<Self>> {
        let mut builder = Octocrab::builder().personal_token(config.token.clone());
        if let Some(api_base) = &config.api_base {
            builder = builder.base_uri(api_base.as_str()).context("Invalid GitHub API base")?;
        }
        let client = builder.build().context("Failed to create GitHub client")?;
        Ok(Arc::new(Self { client }))
    }

    /// Collect the repository's activity over the last `lookback_days` days
    /// and render it as markdown.
    pub async fn export(
        &self,
        repo: &RepoId,
        lookback_days: u32,
        now: OffsetDateTime,
    ) -> Result<String, AdapterError> {
        let Some(since) = now.checked_sub(Duration::days(lookback_days.into())) else {
            return Err(AdapterError::InvalidWindow { unit: repo.to_string(), lookback_days });
        };
        let activity = self.fetch_activity(repo, since, now).await.map_err(|e| match e {
            octocrab::Error::GitHub { source, .. }
                if matches!(*source, GitHubError { status_code: StatusCode::NOT_FOUND, .. }) =>
            {
                AdapterError::NotFound { unit: repo.to_string() }
            }
            e => AdapterError::Unreachable { unit: repo.to_string(), cause: Box::new(e) },
        })?;
        tracing::info!(
            "Fetched activity for {}: {} commits, {} issues closed, {} pull requests merged",
            repo,
            activity.commits.len(),
            activity.issues_closed.len(),
            activity.pulls_merged.len()
        );
        Ok(activity.to_markdown())
    }

    pub async fn fetch_activity(
        &self,
        repo: &RepoId,
        since: OffsetDateTime,
        until: OffsetDateTime,
    ) -> octocrab::Result<Activity> {
        let since_str = since.format(&Rfc3339).unwrap_or_default();
        let commits = self.fetch_commits(repo, &since_str).await?;
        let issues_closed = self.fetch_closed_issues(repo, &since_str, since).await?;
        let pulls_merged = self.fetch_merged_pulls(repo, since).await?;
        Ok(Activity { repo: repo.clone(), since, until, commits, issues_closed, pulls_merged })
    }

    async fn fetch_commits(&self, repo: &RepoId, since: &str) -> octocrab::Result<Vec<CommitSummary>> {
        let route = format!("/repos/{}/{}/commits", repo.owner, repo.name);
        let mut result = Vec::new();
        for page in 1..=MAX_PAGES {
            let params = ListParams {
                state: None,
                since: Some(since),
                sort: None,
                direction: None,
                per_page: PER_PAGE,
                page,
            };
            let items: Vec<CommitEntry> = self.client.get(&route, Some(&params)).await?;
            let done = items.len() < PER_PAGE as usize;
            result.extend(
                items
                    .into_iter()
                    .map(|c| CommitSummary { sha: c.sha, message: c.commit.message }),
            );
            if done {
                break;
            }
        }
        Ok(result)
    }

    async fn fetch_closed_issues(
        &self,
        repo: &RepoId,
        since_str: &str,
        since: OffsetDateTime,
    ) -> octocrab::Result<Vec<IssueSummary>> {
        let route = format!("/repos/{}/{}/issues", repo.owner, repo.name);
        let mut result = Vec::new();
        for page in 1..=MAX_PAGES {
            let params = ListParams {
                state: Some("closed"),
                since: Some(since_str),
                sort: None,
                direction: None,
                per_page: PER_PAGE,
                page,
            };
            let items: Vec<IssueEntry> = self.client.get(&route, Some(&params)).await?;
            let done = items.len() < PER_PAGE as usize;
            // `since` filters on update time; the issues endpoint also lists pull requests
            result.extend(
                items
                    .into_iter()
                    .filter(|i| i.pull_request.is_none())
                    .filter(|i| parse_timestamp(i.closed_at.as_deref()).is_some_and(|t| t >= since))
                    .map(|i| IssueSummary { number: i.number, title: i.title }),
            );
            if done {
                break;
            }
        }
        Ok(result)
    }

    async fn fetch_merged_pulls(
        &self,
        repo: &RepoId,
        since: OffsetDateTime,
    ) -> octocrab::Result<Vec<IssueSummary>> {
        let route = format!("/repos/{}/{}/pulls", repo.owner, repo.name);
        let mut result = Vec::new();
        for page in 1..=MAX_PAGES {
            let params = ListParams {
                state: Some("closed"),
                since: None,
                sort: Some("updated"),
                direction: Some("desc"),
                per_page: PER_PAGE,
                page,
            };
            let items: Vec<PullEntry> = self.client.get(&route, Some(&params)).await?;
            let mut done = items.len() < PER_PAGE as usize;
            for pull in items {
                if parse_timestamp(pull.updated_at.as_deref()).is_some_and(|t| t < since) {
                    // Sorted by update time, nothing older can have merged in the window
                    done = true;
                    break;
                }
                if parse_timestamp(pull.merged_at.as_deref()).is_some_and(|t| t >= since) {
                    result.push(IssueSummary {
                        number: pull.number,
                        title: pull.title.unwrap_or_default(),
                    });
                }
            }
            if done {
                break;
            }
        }
        Ok(result)
    }
}
