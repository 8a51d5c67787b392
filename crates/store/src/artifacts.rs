use std::path::{Path, PathBuf};

use sentinel_core::{
    error::PersistenceError,
    models::{RawCollection, ReportArtifact, ReportCategory},
    util::{atomic_create, timestamp_stem},
};
use time::OffsetDateTime;

const REPORT_SUFFIX: &str = "_report";
const EXTENSION: &str = "md";

/// Append-only storage for raw collections and the reports derived from them.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    repository_dir: PathBuf,
    news_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(repository_dir: impl Into<PathBuf>, news_dir: impl Into<PathBuf>) -> Self {
        Self { repository_dir: repository_dir.into(), news_dir: news_dir.into() }
    }

    /// Directory and file stem prefix for a raw collection.
    fn raw_location(&self, category: ReportCategory, source: &str) -> (PathBuf, String) {
        match category {
            ReportCategory::RepositoryActivity => {
                // `owner/name` becomes one directory per repository
                (self.repository_dir.join(source.replace('/', "_")), String::new())
            }
            ReportCategory::NewsDigest => (self.news_dir.clone(), "hacker_news_".to_string()),
        }
    }

    pub fn write_raw(
        &self,
        category: ReportCategory,
        source: &str,
        body: String,
        now: OffsetDateTime,
    ) -> Result<RawCollection, PersistenceError> {
        let (dir, prefix) = self.raw_location(category, source);
        let stem = format!("{prefix}{}", timestamp_stem(now));
        let mut attempt = 0u32;
        let path = loop {
            let candidate = if attempt == 0 {
                dir.join(format!("{stem}.{EXTENSION}"))
            } else {
                dir.join(format!("{stem}-{attempt}.{EXTENSION}"))
            };
            match atomic_create(&candidate, body.as_bytes()) {
                Ok(()) => break candidate,
                // Another run in the same second already claimed this name.
                Err(_) if candidate.exists() && attempt < 100 => attempt += 1,
                Err(e) => return Err(e),
            }
        };
        tracing::debug!("Raw {} collection for {} saved to {}", category, source, path.display());
        Ok(RawCollection {
            category,
            source: source.to_string(),
            body,
            path,
            collected_at: now,
        })
    }

    pub fn write_report(
        &self,
        raw: &RawCollection,
        body: String,
        now: OffsetDateTime,
    ) -> Result<ReportArtifact, PersistenceError> {
        let path = report_path_for(&raw.path);
        atomic_create(&path, body.as_bytes())?;
        tracing::info!("{} report for {} saved to {}", raw.category, raw.source, path.display());
        Ok(ReportArtifact {
            category: raw.category,
            source: raw.source.clone(),
            generated_at: now,
            body,
            path,
        })
    }
}

/// Sibling report path for a raw collection: same stem, `_report.md` suffix.
pub fn report_path_for(raw_path: &Path) -> PathBuf {
    let stem = raw_path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    raw_path.with_file_name(format!("{stem}{REPORT_SUFFIX}.{EXTENSION}"))
}
