use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, Time, macros::format_description};

/// A watched repository, written as `owner/name`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self { owner: owner.into(), name: name.into() }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidRepoId(pub String);

impl fmt::Display for InvalidRepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid repository identifier '{}', expected owner/name", self.0)
    }
}

impl std::error::Error for InvalidRepoId {}

impl FromStr for RepoId {
    type Err = InvalidRepoId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some((owner, name)) = s.split_once('/') else {
            return Err(InvalidRepoId(s.to_string()));
        };
        let valid = |part: &str| {
            !part.is_empty()
                && !part.contains('/')
                && part != "."
                && part != ".."
                && !part.chars().any(char::is_whitespace)
        };
        if !valid(owner) || !valid(name) {
            return Err(InvalidRepoId(s.to_string()));
        }
        Ok(Self::new(owner, name))
    }
}

impl TryFrom<String> for RepoId {
    type Error = InvalidRepoId;

    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<RepoId> for String {
    fn from(value: RepoId) -> Self { value.to_string() }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    RepositoryActivity,
    NewsDigest,
}

impl ReportCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepositoryActivity => "repository_activity",
            Self::NewsDigest => "news_digest",
        }
    }
}

impl fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// What a job collects, together with the parameters of its source.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum JobKind {
    RepositoryActivity { lookback_days: u32 },
    NewsDigest { page_from: u32, page_to: u32 },
}

impl JobKind {
    pub fn category(&self) -> ReportCategory {
        match self {
            Self::RepositoryActivity { .. } => ReportCategory::RepositoryActivity,
            Self::NewsDigest { .. } => ReportCategory::NewsDigest,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct Interval {
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
}

impl Interval {
    pub fn to_duration(self) -> Duration {
        Duration::days(self.days.into())
            + Duration::hours(self.hours.into())
            + Duration::minutes(self.minutes.into())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Recurrence {
    pub interval: Duration,
    /// Time of day the trigger is aligned to, in the scheduler's local offset.
    pub anchor: Option<Time>,
}

impl Recurrence {
    pub fn every(interval: Duration) -> Self { Self { interval, anchor: None } }

    pub fn at(mut self, anchor: Time) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// The first trigger strictly after `last`, or `None` if it falls outside
    /// the representable date range.
    pub fn next_after(&self, last: OffsetDateTime) -> Option<OffsetDateTime> {
        if self.interval <= Duration::ZERO {
            return None;
        }
        let next = last.checked_add(self.interval)?;
        let Some(anchor) = self.anchor else {
            return Some(next);
        };
        let mut aligned = next.replace_time(anchor);
        while aligned <= last {
            aligned = aligned.checked_add(self.interval)?;
        }
        Some(aligned)
    }
}

pub fn parse_anchor(value: &str) -> Result<Time, time::error::Parse> {
    Time::parse(value.trim(), format_description!("[hour]:[minute]"))
}

pub const MAX_INTERVAL: Duration = Duration::days(366);
pub const MAX_LOOKBACK_DAYS: u32 = 366;

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
#[serde(try_from = "JobConfig")]
pub struct JobDefinition {
    pub name: String,
    pub kind: JobKind,
    pub recurrence: Recurrence,
}

impl JobDefinition {
    pub fn category(&self) -> ReportCategory { self.kind.category() }
}

/// On-disk shape of a job entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobConfig {
    name: String,
    kind: ReportCategory,
    lookback_days: Option<u32>,
    page_from: Option<u32>,
    page_to: Option<u32>,
    every: Interval,
    at: Option<String>,
}

impl TryFrom<JobConfig> for JobDefinition {
    type Error = String;

    fn try_from(value: JobConfig) -> Result<Self, Self::Error> {
        let name = value.name;
        let kind = match value.kind {
            ReportCategory::RepositoryActivity => {
                if value.page_from.is_some() || value.page_to.is_some() {
                    return Err(format!("job '{name}': page range is only valid for news_digest"));
                }
                let lookback_days = value.lookback_days.unwrap_or(1);
                if !(1..=MAX_LOOKBACK_DAYS).contains(&lookback_days) {
                    return Err(format!(
                        "job '{name}': lookback_days must be between 1 and {MAX_LOOKBACK_DAYS}"
                    ));
                }
                JobKind::RepositoryActivity { lookback_days }
            }
            ReportCategory::NewsDigest => {
                if value.lookback_days.is_some() {
                    return Err(format!(
                        "job '{name}': lookback_days is only valid for repository_activity"
                    ));
                }
                let page_from = value.page_from.unwrap_or(1);
                let page_to = value.page_to.unwrap_or(2);
                if page_from == 0 || page_from > page_to {
                    return Err(format!(
                        "job '{name}': invalid page range {page_from}..={page_to}"
                    ));
                }
                JobKind::NewsDigest { page_from, page_to }
            }
        };
        let interval = value.every.to_duration();
        if interval <= Duration::ZERO {
            return Err(format!("job '{name}': interval must be greater than zero"));
        }
        if interval > MAX_INTERVAL {
            return Err(format!(
                "job '{name}': interval must be at most {} days",
                MAX_INTERVAL.whole_days()
            ));
        }
        let anchor = value
            .at
            .as_deref()
            .map(parse_anchor)
            .transpose()
            .map_err(|e| format!("job '{name}': invalid anchor time: {e}"))?;
        Ok(Self { name, kind, recurrence: Recurrence { interval, anchor } })
    }
}

/// Unprocessed adapter output, persisted before synthesis.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawCollection {
    pub category: ReportCategory,
    pub source: String,
    pub body: String,
    pub path: PathBuf,
    pub collected_at: OffsetDateTime,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReportArtifact {
    pub category: ReportCategory,
    pub source: String,
    pub generated_at: OffsetDateTime,
    pub body: String,
    pub path: PathBuf,
}
