use async_trait::async_trait;
use sentinel_core::{error::AdapterError, models::RepoId};
use sentinel_github::GitHub;
use sentinel_news::HackerNews;
use time::OffsetDateTime;

/// Produces a markdown activity export for one repository.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    async fn export(
        &self,
        repo: &RepoId,
        lookback_days: u32,
        now: OffsetDateTime,
    ) -> Result<String, AdapterError>;
}

/// Produces a markdown digest of a page range, or `None` if nothing was found.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch(
        &self,
        page_from: u32,
        page_to: u32,
        now: OffsetDateTime,
    ) -> Result<Option<String>, AdapterError>;
}

#[async_trait]
impl RepositorySource for GitHub {
    async fn export(
        &self,
        repo: &RepoId,
        lookback_days: u32,
        now: OffsetDateTime,
    ) -> Result<String, AdapterError> {
        GitHub::export(self, repo, lookback_days, now).await
    }
}

#[async_trait]
impl NewsSource for HackerNews {
    async fn fetch(
        &self,
        page_from: u32,
        page_to: u32,
        now: OffsetDateTime,
    ) -> Result<Option<String>, AdapterError> {
        HackerNews::fetch(self, page_from, page_to, now).await
    }
}
