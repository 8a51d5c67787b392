use std::{io::Write, path::Path};

use tempfile::NamedTempFile;
use time::{OffsetDateTime, macros::format_description};

use crate::error::PersistenceError;

/// Second-granularity timestamp used in artifact file names.
pub fn timestamp_stem(value: OffsetDateTime) -> String {
    value
        .format(format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]"))
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

pub fn format_date(value: OffsetDateTime) -> String {
    value
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

pub fn format_datetime(value: OffsetDateTime) -> String {
    value
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

/// Replace `path` with `contents` so that readers only ever see the old or
/// the new file. The temporary file lives in the target directory so the
/// final rename never crosses filesystems.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let file = write_temp(path, contents)?;
    file.persist(path).map_err(|e| PersistenceError::write(path, e.error))?;
    Ok(())
}

/// Like [`atomic_write`], but fails instead of replacing an existing file.
pub fn atomic_create(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let file = write_temp(path, contents)?;
    file.persist_noclobber(path).map_err(|e| PersistenceError::write(path, e.error))?;
    Ok(())
}

fn write_temp(path: &Path, contents: &[u8]) -> Result<NamedTempFile, PersistenceError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| PersistenceError::write(dir, e))?;
    let mut file = NamedTempFile::new_in(dir).map_err(|e| PersistenceError::write(path, e))?;
    file.write_all(contents).map_err(|e| PersistenceError::write(path, e))?;
    file.as_file().sync_all().map_err(|e| PersistenceError::write(path, e))?;
    Ok(file)
}
