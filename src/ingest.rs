use std::path::Path;

use crate::error::MigrateError;
use crate::zonename;

/// Produces the list of zone names a batch run should migrate.
///
/// Generalizes `original_source/powerdns_migrator/cli.py`'s inline
/// `zones_path.open(...)` loop into a trait, so a database- or
/// message-queue-backed source (out of scope per spec.md §1) can be
/// added later without the batch executor changing.
pub trait ZoneSource {
    fn load(&self) -> Result<Vec<String>, MigrateError>;
}

/// Reads zone names one per line from a text file, skipping blank lines
/// and lines starting with `#` (spec.md §6).
pub struct FileZoneSource {
    path: std::path::PathBuf,
}

impl FileZoneSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ZoneSource for FileZoneSource {
    fn load(&self) -> Result<Vec<String>, MigrateError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            MigrateError::config(format!("reading zones file {}: {e}", self.path.display()))
        })?;
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(zonename::normalize)
            .collect())
    }
}
