//! Local history store: settled deployments that survive restarts.
//!
//! # Storage layout
//!
//! ```text
//! ~/.pressroom/
//!   deploymentHistory.json   (JSON array, most recently added first)
//! ```
//!
//! Every write trims the array to `max_entries`. Trimming follows insertion
//! order, not timestamps: the entries kept are the ones added last, even when
//! a record merged in from the CI system carries an older completion time.
//!
//! A corrupt document is logged and treated as empty history; it is replaced
//! on the next successful write.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, StoreError};
use crate::types::{CommitSha, DeploymentRecord};

pub const HISTORY_FILE: &str = "deploymentHistory.json";
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// `<home>/.pressroom/deploymentHistory.json`. Pure, no I/O.
pub fn history_path_at(home: &Path) -> PathBuf {
    home.join(".pressroom").join(HISTORY_FILE)
}

/// Handle on the persisted history document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStore {
    path: PathBuf,
    max_entries: usize,
}

impl HistoryStore {
    /// Store rooted at an explicit home; used in tests with `TempDir`.
    pub fn at(home: &Path, max_entries: usize) -> Self {
        Self {
            path: history_path_at(home),
            max_entries: max_entries.max(1),
        }
    }

    /// Store under `dirs::home_dir()`.
    pub fn open(max_entries: usize) -> Result<Self, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::HomeNotFound)?;
        Ok(Self::at(&home, max_entries))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Takes effect on the next write.
    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries.max(1);
    }

    /// Load all records, most recently added first.
    ///
    /// Missing file → empty. Malformed document → warning + empty. Individual
    /// entries that fail to decode or validate are skipped.
    pub fn load(&self) -> Result<Vec<DeploymentRecord>, StoreError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(io_err(&self.path, err)),
        };
        if contents.trim().is_empty() {
            return Ok(vec![]);
        }

        let entries: Vec<serde_json::Value> = match serde_json::from_str(&contents) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "deployment history is malformed; treating as empty",
                );
                return Ok(vec![]);
            }
        };

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let record: DeploymentRecord = match serde_json::from_value(entry) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping undecodable history entry");
                    continue;
                }
            };
            if let Err(err) = record.validate() {
                tracing::warn!(error = %err, "skipping invalid history entry");
                continue;
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Add one settled record and return the trimmed history.
    pub fn append(&self, record: DeploymentRecord) -> Result<Vec<DeploymentRecord>, StoreError> {
        self.append_all(vec![record])
    }

    /// Add records in order (the last one ends up newest) and return the
    /// trimmed history.
    pub fn append_all(
        &self,
        records: Vec<DeploymentRecord>,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        let mut history = self.load()?;
        for record in records {
            history.insert(0, record);
        }
        self.save(&history)?;
        history.truncate(self.max_entries);
        Ok(history)
    }

    /// Atomically replace the document with `records`, trimmed to the cap.
    ///
    /// Write flow: serialize → `.json.tmp` sibling → `rename`.
    pub fn save(&self, records: &[DeploymentRecord]) -> Result<(), StoreError> {
        let Some(dir) = self.path.parent() else {
            return Err(io_err(
                &self.path,
                std::io::Error::other("invalid history path"),
            ));
        };
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

        let keep = records.len().min(self.max_entries);
        let json = serde_json::to_string_pretty(&records[..keep])?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeploymentStatus;
    use chrono::Utc;
    use tempfile::TempDir;

    fn settled(sha: &str) -> DeploymentRecord {
        let mut record =
            DeploymentRecord::pending(CommitSha::from(sha), "Update page", None, Utc::now());
        record.settle(DeploymentStatus::Completed, Utc::now());
        record
    }

    #[test]
    fn history_path_is_correct() {
        let home = TempDir::new().expect("tempdir");
        assert!(history_path_at(home.path()).ends_with(".pressroom/deploymentHistory.json"));
    }

    #[test]
    fn missing_file_loads_empty() {
        let home = TempDir::new().expect("tempdir");
        let store = HistoryStore::at(home.path(), 50);
        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn append_puts_newest_first() {
        let home = TempDir::new().expect("tempdir");
        let store = HistoryStore::at(home.path(), 50);
        store.append(settled("a1")).expect("append");
        let history = store.append(settled("b2")).expect("append");
        assert_eq!(history[0].commit_sha, CommitSha::from("b2"));
        assert_eq!(history[1].commit_sha, CommitSha::from("a1"));
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let home = TempDir::new().expect("tempdir");
        let store = HistoryStore::at(home.path(), 50);
        store.append(settled("a1")).expect("append");
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn zero_cap_is_raised_to_one() {
        let home = TempDir::new().expect("tempdir");
        let store = HistoryStore::at(home.path(), 0);
        assert_eq!(store.max_entries(), 1);
    }
}
