use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use sentinel_core::{
    config::TimeoutConfig,
    error::{AdapterError, DeliveryError, PipelineError, SynthesisError},
    models::{JobDefinition, JobKind, RepoId, ReportArtifact, ReportCategory},
};
use sentinel_llm::Synthesizer;
use sentinel_news::SOURCE_NAME as NEWS_SOURCE;
use sentinel_notify::Notifier;
use sentinel_store::{ArtifactStore, SubscriptionStore};
use time::{OffsetDateTime, UtcOffset};

use crate::{
    scheduler::JobRunner,
    sources::{NewsSource, RepositorySource},
};

pub const NEWS_SUBJECT: &str = "Hacker News Report";

/// Result of one unit of work: a repository, or the news page range.
#[derive(Debug)]
pub struct UnitOutcome {
    pub unit: String,
    pub result: Result<ReportArtifact, PipelineError>,
}

#[derive(Debug)]
pub struct JobRun {
    pub job: String,
    pub outcomes: Vec<UnitOutcome>,
}

impl JobRun {
    pub fn artifacts(&self) -> impl Iterator<Item = &ReportArtifact> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &PipelineError)> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err().map(|e| (o.unit.as_str(), e)))
    }
}

/// Everything a job run needs, owned for the lifetime of the daemon.
pub struct Pipeline {
    pub repositories: Arc<dyn RepositorySource>,
    pub news: Arc<dyn NewsSource>,
    pub subscriptions: SubscriptionStore,
    pub artifacts: ArtifactStore,
    pub repository_synthesizer: Synthesizer,
    pub news_synthesizer: Synthesizer,
    pub notifier: Arc<dyn Notifier>,
    pub timeouts: TimeoutConfig,
    /// Offset used for artifact timestamps.
    pub offset: UtcOffset,
}

/// Bound `future` by `secs`, returning the limit on expiry.
async fn timed<F: Future>(secs: u64, future: F) -> Result<F::Output, u64> {
    tokio::time::timeout(Duration::from_secs(secs), future).await.map_err(|_| secs)
}

impl Pipeline {
    fn now(&self) -> OffsetDateTime { OffsetDateTime::now_utc().to_offset(self.offset) }

    /// Run every unit of work for `job`.
    ///
    /// Unit failures are recorded in the returned [`JobRun`]; only a failure
    /// that prevents any unit from starting is returned as an error.
    pub async fn run_job(&self, job: &JobDefinition) -> Result<JobRun, PipelineError> {
        let outcomes = match job.kind {
            JobKind::RepositoryActivity { lookback_days } => {
                let repos = self.subscriptions.list()?;
                if repos.is_empty() {
                    tracing::warn!(
                        "Job {}: no subscriptions in {}",
                        job.name,
                        self.subscriptions.path().display()
                    );
                }
                let mut outcomes = Vec::with_capacity(repos.len());
                for repo in repos {
                    let result = self.run_repository(&repo, lookback_days).await;
                    outcomes.push(UnitOutcome { unit: repo.to_string(), result });
                }
                outcomes
            }
            JobKind::NewsDigest { page_from, page_to } => {
                let result = self.run_news(page_from, page_to).await;
                vec![UnitOutcome { unit: NEWS_SOURCE.to_string(), result }]
            }
        };
        Ok(JobRun { job: job.name.clone(), outcomes })
    }

    async fn run_repository(
        &self,
        repo: &RepoId,
        lookback_days: u32,
    ) -> Result<ReportArtifact, PipelineError> {
        let unit = repo.to_string();
        let secs = self.timeouts.fetch_secs;
        let body = timed(secs, self.repositories.export(repo, lookback_days, self.now()))
            .await
            .map_err(|secs| AdapterError::TimedOut { unit: unit.clone(), secs })??;
        self.complete(ReportCategory::RepositoryActivity, &self.repository_synthesizer, &unit, body)
            .await
    }

    async fn run_news(&self, page_from: u32, page_to: u32) -> Result<ReportArtifact, PipelineError> {
        let secs = self.timeouts.fetch_secs;
        let Some(body) = timed(secs, self.news.fetch(page_from, page_to, self.now()))
            .await
            .map_err(|secs| AdapterError::TimedOut { unit: NEWS_SOURCE.to_string(), secs })??
        else {
            return Err(AdapterError::Empty { unit: NEWS_SOURCE.to_string() }.into());
        };
        self.complete(ReportCategory::NewsDigest, &self.news_synthesizer, NEWS_SOURCE, body).await
    }

    /// Persist the raw collection, synthesize it, persist the report and
    /// deliver it.
    async fn complete(
        &self,
        category: ReportCategory,
        synthesizer: &Synthesizer,
        unit: &str,
        body: String,
    ) -> Result<ReportArtifact, PipelineError> {
        let raw = self.artifacts.write_raw(category, unit, body, self.now())?;
        let report = timed(self.timeouts.synthesis_secs, synthesizer.summarize(category, &raw.body))
            .await
            .map_err(|secs| SynthesisError::TimedOut { secs })??;
        let artifact = self.artifacts.write_report(&raw, report, self.now())?;

        let subject = match category {
            ReportCategory::RepositoryActivity => unit,
            ReportCategory::NewsDigest => NEWS_SUBJECT,
        };
        if synthesizer.is_dry_run() {
            tracing::info!("Dry run: not delivering '{}'", subject);
            return Ok(artifact);
        }
        timed(self.timeouts.delivery_secs, self.notifier.notify(subject, &artifact.body))
            .await
            .map_err(|secs| DeliveryError::TimedOut { secs })??;
        Ok(artifact)
    }
}

#[async_trait]
impl JobRunner for Pipeline {
    async fn run(&self, job: &JobDefinition) -> Result<JobRun, PipelineError> {
        self.run_job(job).await
    }
}
