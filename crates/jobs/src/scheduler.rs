use std::{error::Error, time::Instant};

use async_trait::async_trait;
use sentinel_core::{error::PipelineError, models::JobDefinition, util::format_datetime};
use time::OffsetDateTime;

use crate::pipeline::JobRun;

/// Executes one job definition to completion.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &JobDefinition) -> Result<JobRun, PipelineError>;
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum JobState {
    Pending,
    Due,
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub definition: JobDefinition,
    pub state: JobState,
    pub next_run: OffsetDateTime,
    pub last_run: Option<OffsetDateTime>,
}

impl ScheduledJob {
    fn new(definition: JobDefinition, now: OffsetDateTime) -> Self {
        let mut job =
            Self { definition, state: JobState::Pending, next_run: now, last_run: None };
        job.reschedule(now);
        job
    }

    /// Back to pending at the next trigger after `now`. A trigger past the
    /// end of the calendar stops the job instead.
    fn reschedule(&mut self, now: OffsetDateTime) {
        match self.definition.recurrence.next_after(now) {
            Some(next_run) => {
                self.next_run = next_run;
                self.state = JobState::Pending;
            }
            None => {
                tracing::error!("Job {}: next run is out of range, stopping", self.definition.name);
                self.state = JobState::Stopped;
            }
        }
    }
}

/// Tracks when each configured job runs next. All transitions take `now`
/// explicitly, so the schedule is fully determined by its inputs.
#[derive(Debug, Clone)]
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
}

impl Scheduler {
    pub fn new(definitions: impl IntoIterator<Item = JobDefinition>, now: OffsetDateTime) -> Self {
        let jobs: Vec<_> = definitions.into_iter().map(|d| ScheduledJob::new(d, now)).collect();
        for job in jobs.iter().filter(|j| j.state == JobState::Pending) {
            tracing::info!(
                "Scheduled job {} ({}), first run at {}",
                job.definition.name,
                job.definition.category(),
                format_datetime(job.next_run)
            );
        }
        Self { jobs }
    }

    pub fn jobs(&self) -> &[ScheduledJob] { &self.jobs }

    pub fn is_stopped(&self) -> bool { self.jobs.iter().all(|j| j.state == JobState::Stopped) }

    /// Mark every pending job whose trigger has passed as due. Returns the
    /// number of due jobs.
    pub fn poll(&mut self, now: OffsetDateTime) -> usize {
        for job in &mut self.jobs {
            if job.state == JobState::Pending && job.next_run <= now {
                job.state = JobState::Due;
            }
        }
        self.jobs.iter().filter(|j| j.state == JobState::Due).count()
    }

    /// Run every due job in configuration order. Returns the number run.
    pub async fn run_due(&mut self, runner: &dyn JobRunner, now: OffsetDateTime) -> usize {
        let mut count = 0;
        for job in &mut self.jobs {
            if job.state == JobState::Due {
                execute(job, runner, now).await;
                count += 1;
            }
        }
        count
    }

    /// Run every job once regardless of its schedule.
    pub async fn run_all(&mut self, runner: &dyn JobRunner, now: OffsetDateTime) {
        for job in &mut self.jobs {
            if job.state != JobState::Stopped {
                execute(job, runner, now).await;
            }
        }
    }

    pub fn stop(&mut self) {
        for job in &mut self.jobs {
            job.state = JobState::Stopped;
        }
    }
}

async fn execute(job: &mut ScheduledJob, runner: &dyn JobRunner, now: OffsetDateTime) {
    job.state = JobState::Running;
    let name = job.definition.name.as_str();
    tracing::info!("Running job {}", name);
    let start = Instant::now();
    match runner.run(&job.definition).await {
        Ok(run) => {
            let mut succeeded = 0;
            for artifact in run.artifacts() {
                tracing::debug!("Job {}: {} report at {}", name, artifact.source, artifact.path.display());
                succeeded += 1;
            }
            let mut failed = 0;
            for (unit, e) in run.failures() {
                tracing::error!("Job {}: {} failed at {} stage: {}", name, unit, e.kind(), chain(e));
                failed += 1;
            }
            tracing::info!(
                "Job {} finished in {:?}: {} succeeded, {} failed",
                name,
                start.elapsed(),
                succeeded,
                failed
            );
        }
        Err(e) => tracing::error!("Job {} failed: {}", name, chain(&e)),
    }
    job.last_run = Some(now);
    job.reschedule(now);
    if job.state == JobState::Pending {
        tracing::info!("Next run of {} at {}", job.definition.name, format_datetime(job.next_run));
    }
}

/// Error message followed by its sources, `a: b: c`.
fn chain(e: &dyn Error) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use sentinel_core::{
        error::AdapterError,
        models::{JobKind, Recurrence},
    };
    use time::{
        Duration,
        macros::{datetime, time},
    };

    use super::*;
    use crate::pipeline::UnitOutcome;

    #[derive(Default)]
    struct RecordingRunner {
        runs: Mutex<Vec<String>>,
    }

    impl RecordingRunner {
        fn runs(&self) -> Vec<String> { self.runs.lock().unwrap().clone() }
    }

    #[async_trait]
    impl JobRunner for RecordingRunner {
        async fn run(&self, job: &JobDefinition) -> Result<JobRun, PipelineError> {
            self.runs.lock().unwrap().push(job.name.clone());
            if job.name == "broken" {
                return Err(AdapterError::NotFound { unit: "octo/missing".to_string() }.into());
            }
            Ok(JobRun {
                job: job.name.clone(),
                outcomes: vec![UnitOutcome {
                    unit: "octo/flaky".to_string(),
                    result: Err(AdapterError::Empty { unit: "octo/flaky".to_string() }.into()),
                }],
            })
        }
    }

    fn job(name: &str, recurrence: Recurrence) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            kind: JobKind::NewsDigest { page_from: 1, page_to: 2 },
            recurrence,
        }
    }

    fn repository_job(name: &str, recurrence: Recurrence) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            kind: JobKind::RepositoryActivity { lookback_days: 2 },
            recurrence,
        }
    }

    #[test]
    fn test_poll_marks_due_jobs() {
        let start = datetime!(2024-09-16 07:00 UTC);
        let mut scheduler = Scheduler::new(
            [
                job("hourly", Recurrence::every(Duration::hours(1))),
                job("daily", Recurrence::every(Duration::days(1))),
            ],
            start,
        );
        assert_eq!(scheduler.jobs()[0].next_run, datetime!(2024-09-16 08:00 UTC));
        assert_eq!(scheduler.poll(datetime!(2024-09-16 07:59 UTC)), 0);
        assert_eq!(scheduler.poll(datetime!(2024-09-16 08:00 UTC)), 1);
        assert_eq!(scheduler.jobs()[0].state, JobState::Due);
        assert_eq!(scheduler.jobs()[1].state, JobState::Pending);
    }

    #[tokio::test]
    async fn test_jobs_due_in_same_tick_all_run() {
        let start = datetime!(2024-09-16 07:00 UTC);
        let mut scheduler = Scheduler::new(
            [
                repository_job("github", Recurrence::every(Duration::days(2))),
                job("hacker-news", Recurrence::every(Duration::hours(4))),
            ],
            start,
        );
        let runner = RecordingRunner::default();
        // Both triggers have passed by this tick.
        let tick = datetime!(2024-09-18 07:00:01 UTC);
        assert_eq!(scheduler.poll(tick), 2);
        assert_eq!(scheduler.run_due(&runner, tick).await, 2);
        assert_eq!(runner.runs(), ["github", "hacker-news"]);
        for job in scheduler.jobs() {
            assert_eq!(job.state, JobState::Pending);
            assert_eq!(job.last_run, Some(tick));
        }
        assert_eq!(scheduler.jobs()[0].next_run, datetime!(2024-09-20 07:00:01 UTC));
        assert_eq!(scheduler.jobs()[1].next_run, datetime!(2024-09-18 11:00:01 UTC));
    }

    #[tokio::test]
    async fn test_failed_job_is_rescheduled() {
        let start = datetime!(2024-09-16 07:00 UTC);
        let mut scheduler = Scheduler::new(
            [
                job("broken", Recurrence::every(Duration::minutes(30))),
                job("healthy", Recurrence::every(Duration::minutes(30))),
            ],
            start,
        );
        let runner = RecordingRunner::default();
        let tick = datetime!(2024-09-16 07:30 UTC);
        scheduler.poll(tick);
        scheduler.run_due(&runner, tick).await;
        assert_eq!(runner.runs(), ["broken", "healthy"]);
        assert_eq!(scheduler.jobs()[0].state, JobState::Pending);
        assert_eq!(scheduler.jobs()[0].next_run, datetime!(2024-09-16 08:00 UTC));
    }

    #[tokio::test]
    async fn test_anchored_job_keeps_time_of_day() {
        let start = datetime!(2024-09-16 07:00 UTC);
        let recurrence = Recurrence::every(Duration::days(2)).at(time!(08:00));
        let mut scheduler = Scheduler::new([job("github", recurrence)], start);
        assert_eq!(scheduler.jobs()[0].next_run, datetime!(2024-09-18 08:00 UTC));

        let runner = RecordingRunner::default();
        // The startup pass runs late in the day; the next trigger stays at 08:00.
        let late = datetime!(2024-09-16 21:13 UTC);
        scheduler.run_all(&runner, late).await;
        assert_eq!(scheduler.jobs()[0].next_run, datetime!(2024-09-18 08:00 UTC));
    }

    #[tokio::test]
    async fn test_stopped_jobs_never_run() {
        let start = datetime!(2024-09-16 07:00 UTC);
        let mut scheduler =
            Scheduler::new([job("github", Recurrence::every(Duration::minutes(1)))], start);
        scheduler.stop();
        assert!(scheduler.is_stopped());

        let runner = RecordingRunner::default();
        let later = datetime!(2024-09-17 07:00 UTC);
        assert_eq!(scheduler.poll(later), 0);
        assert_eq!(scheduler.run_due(&runner, later).await, 0);
        scheduler.run_all(&runner, later).await;
        assert!(runner.runs().is_empty());
    }

    #[test]
    fn test_out_of_range_job_is_stopped() {
        let start = datetime!(2024-09-16 07:00 UTC);
        let scheduler = Scheduler::new(
            [
                repository_job("forever", Recurrence::every(Duration::days(4_000_000))),
                job("hacker-news", Recurrence::every(Duration::hours(4))),
            ],
            start,
        );
        assert_eq!(scheduler.jobs()[0].state, JobState::Stopped);
        assert_eq!(scheduler.jobs()[1].state, JobState::Pending);
    }

    #[test]
    fn test_error_chain() {
        let e = PipelineError::from(AdapterError::Unreachable {
            unit: "octo/proj-a".to_string(),
            cause: "connection reset".into(),
        });
        assert_eq!(e.kind(), "adapter");
        assert_eq!(chain(&e), "octo/proj-a: source unreachable: connection reset");
    }
}
