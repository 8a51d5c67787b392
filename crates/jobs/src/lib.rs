mod daemon;
mod pipeline;
mod scheduler;
mod sources;

pub use daemon::Daemon;
pub use pipeline::{JobRun, NEWS_SUBJECT, Pipeline, UnitOutcome};
pub use scheduler::{JobRunner, JobState, ScheduledJob, Scheduler};
pub use sources::{NewsSource, RepositorySource};
