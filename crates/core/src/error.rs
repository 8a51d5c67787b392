use std::{io, path::PathBuf};

use thiserror::Error;

use crate::models::ReportCategory;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A source could not produce a raw collection.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("{unit}: not found")]
    NotFound { unit: String },
    #[error("{unit}: source unreachable")]
    Unreachable {
        unit: String,
        #[source]
        cause: BoxError,
    },
    #[error("{unit}: nothing collected")]
    Empty { unit: String },
    #[error("{unit}: timed out after {secs}s")]
    TimedOut { unit: String, secs: u64 },
    #[error("{unit}: lookback of {lookback_days} days is out of range")]
    InvalidWindow { unit: String, lookback_days: u32 },
}

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("text-generation backend unreachable")]
    Unreachable(#[source] BoxError),
    #[error("text-generation backend returned an empty completion")]
    Empty,
    #[error("synthesizer is bound to {expected}, got {actual}")]
    CategoryMismatch { expected: ReportCategory, actual: ReportCategory },
    #[error("failed to write dry-run payload")]
    DryRun(#[source] PersistenceError),
    #[error("text generation timed out after {secs}s")]
    TimedOut { secs: u64 },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },
    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },
}

impl PersistenceError {
    pub fn read(path: impl Into<PathBuf>, cause: io::Error) -> Self {
        Self::Read { path: path.into(), cause }
    }

    pub fn write(path: impl Into<PathBuf>, cause: io::Error) -> Self {
        Self::Write { path: path.into(), cause }
    }
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("notification transport unreachable")]
    Unreachable(#[source] BoxError),
    #[error("notification could not be composed")]
    Malformed(#[source] BoxError),
    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("notification timed out after {secs}s")]
    TimedOut { secs: u64 },
}

/// Failure of one unit of work in a job run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Adapter(_) => "adapter",
            Self::Synthesis(_) => "synthesis",
            Self::Persistence(_) => "persistence",
            Self::Delivery(_) => "delivery",
        }
    }
}
