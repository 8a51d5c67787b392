use std::{future::Future, time::Duration};

use sentinel_core::config::SchedulerConfig;
use time::{OffsetDateTime, UtcOffset};
use tokio::time::{Interval, MissedTickBehavior};

use crate::scheduler::{JobRunner, Scheduler};

/// Drives a [`Scheduler`] from the wall clock until shutdown.
pub struct Daemon<R> {
    scheduler: Scheduler,
    runner: R,
    tick: Duration,
    run_on_startup: bool,
    offset: UtcOffset,
}

impl<R: JobRunner> Daemon<R> {
    pub fn new(scheduler: Scheduler, runner: R, config: &SchedulerConfig, offset: UtcOffset) -> Self {
        Self {
            scheduler,
            runner,
            tick: config.tick(),
            run_on_startup: config.run_on_startup,
            offset,
        }
    }

    pub fn scheduler(&self) -> &Scheduler { &self.scheduler }

    pub fn runner(&self) -> &R { &self.runner }

    fn now(&self) -> OffsetDateTime { OffsetDateTime::now_utc().to_offset(self.offset) }

    /// Run every job once, then stop.
    pub async fn run_once(&mut self) {
        let now = self.now();
        self.scheduler.run_all(&self.runner, now).await;
        self.scheduler.stop();
    }

    /// Run until `shutdown` resolves. A job in flight at that point is
    /// dropped at its next await; every job ends up stopped.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        if self.run_on_startup {
            tracing::info!("Running all jobs on startup");
            let now = self.now();
            let interrupted = tokio::select! {
                _ = &mut shutdown => true,
                _ = self.scheduler.run_all(&self.runner, now) => false,
            };
            if interrupted {
                self.stop();
                return;
            }
        }

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.step(&mut interval) => {}
            }
        }
        self.stop();
    }

    async fn step(&mut self, interval: &mut Interval) {
        interval.tick().await;
        let now = self.now();
        if self.scheduler.poll(now) > 0 {
            self.scheduler.run_due(&self.runner, now).await;
        }
    }

    fn stop(&mut self) {
        self.scheduler.stop();
        tracing::info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use sentinel_core::{
        error::PipelineError,
        models::{JobDefinition, JobKind, Recurrence},
    };

    use super::*;
    use crate::{pipeline::JobRun, scheduler::JobState};

    #[derive(Default)]
    struct CountingRunner {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl JobRunner for CountingRunner {
        async fn run(&self, job: &JobDefinition) -> Result<JobRun, PipelineError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(JobRun { job: job.name.clone(), outcomes: Vec::new() })
        }
    }

    fn daemon(run_on_startup: bool) -> Daemon<CountingRunner> {
        let jobs = ["github", "hacker-news"].map(|name| JobDefinition {
            name: name.to_string(),
            kind: JobKind::RepositoryActivity { lookback_days: 1 },
            recurrence: Recurrence::every(time::Duration::hours(1)),
        });
        let scheduler = Scheduler::new(jobs, OffsetDateTime::now_utc());
        let config = SchedulerConfig { tick_millis: 10, run_on_startup };
        Daemon::new(scheduler, CountingRunner::default(), &config, UtcOffset::UTC)
    }

    #[tokio::test]
    async fn test_startup_pass_then_shutdown() {
        let mut daemon = daemon(true);
        daemon.run(tokio::time::sleep(Duration::from_millis(50))).await;
        assert_eq!(daemon.runner().runs.load(Ordering::SeqCst), 2);
        assert!(daemon.scheduler().jobs().iter().all(|j| j.state == JobState::Stopped));
    }

    #[tokio::test]
    async fn test_no_startup_pass() {
        let mut daemon = daemon(false);
        daemon.run(tokio::time::sleep(Duration::from_millis(50))).await;
        // Nothing is due within the first hour.
        assert_eq!(daemon.runner().runs.load(Ordering::SeqCst), 0);
        assert!(daemon.scheduler().is_stopped());
    }

    #[tokio::test]
    async fn test_run_once() {
        let mut daemon = daemon(false);
        daemon.run_once().await;
        assert_eq!(daemon.runner().runs.load(Ordering::SeqCst), 2);
        assert!(daemon.scheduler().is_stopped());
    }
}
