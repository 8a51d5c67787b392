use std::{
    io,
    path::{Path, PathBuf},
};

use sentinel_core::{error::PersistenceError, models::RepoId, util::atomic_write};

/// Flat-file list of watched repositories, one `owner/name` per line.
///
/// The file is the only source of truth: every call reads it, and every
/// mutation replaces it atomically. Mutations touch only the lines naming the
/// repository; comments and unparsable lines survive.
#[derive(Debug, Clone)]
pub struct SubscriptionStore {
    path: PathBuf,
}

impl SubscriptionStore {
    pub fn open(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    pub fn path(&self) -> &Path { &self.path }

    pub fn list(&self) -> Result<Vec<RepoId>, PersistenceError> {
        Ok(parse(&self.read()?))
    }

    /// Returns `true` if the repository was not subscribed before.
    pub fn add(&self, repo: &RepoId) -> Result<bool, PersistenceError> {
        let mut contents = self.read()?;
        if parse(&contents).contains(repo) {
            return Ok(false);
        }
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str(&repo.to_string());
        contents.push('\n');
        atomic_write(&self.path, contents.as_bytes())?;
        tracing::info!("Subscribed to {}", repo);
        Ok(true)
    }

    /// Returns `true` if the repository was subscribed. Comments and
    /// unparsable lines are kept as they are.
    pub fn remove(&self, repo: &RepoId) -> Result<bool, PersistenceError> {
        let contents = self.read()?;
        let mut removed = false;
        let mut kept = String::with_capacity(contents.len());
        for line in contents.lines() {
            if line.trim().parse::<RepoId>().is_ok_and(|r| &r == repo) {
                removed = true;
                continue;
            }
            kept.push_str(line);
            kept.push('\n');
        }
        if !removed {
            return Ok(false);
        }
        atomic_write(&self.path, kept.as_bytes())?;
        tracing::info!("Unsubscribed from {}", repo);
        Ok(true)
    }

    /// Raw file contents; a missing file reads as empty.
    fn read(&self) -> Result<String, PersistenceError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(PersistenceError::read(&self.path, e)),
        }
    }
}

fn parse(contents: &str) -> Vec<RepoId> {
    let mut entries = Vec::<RepoId>::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<RepoId>() {
            Ok(repo) if !entries.contains(&repo) => entries.push(repo),
            Ok(_) => {}
            Err(e) => tracing::warn!("Skipping subscriptions line {}: {}", idx + 1, e),
        }
    }
    entries
}
