use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::date_range::DateRange;

pub const PROGRESS_VERSION: u32 = 1;

/// Which chunks have been finished and which need another attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub completed: BTreeSet<DateRange>,
    pub failed: Vec<DateRange>,
}

impl ProgressState {
    pub fn is_completed(&self, range: &DateRange) -> bool {
        self.completed.contains(range)
    }

    pub fn mark_completed(&mut self, range: DateRange) {
        self.failed.retain(|r| r != &range);
        self.completed.insert(range);
    }

    pub fn mark_failed(&mut self, range: DateRange) {
        if self.completed.contains(&range) || self.failed.contains(&range) {
            return;
        }
        self.failed.push(range);
    }
}

/// On-disk shape of the progress document.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressDocument {
    #[serde(default = "default_version")]
    version: u32,
    completed_ranges: Vec<DateRange>,
    failed_ranges: Vec<DateRange>,
    total_completed: usize,
    total_failed: usize,
    last_updated: DateTime<Utc>,
}

fn default_version() -> u32 {
    PROGRESS_VERSION
}

impl From<&ProgressState> for ProgressDocument {
    fn from(state: &ProgressState) -> Self {
        Self {
            version: PROGRESS_VERSION,
            completed_ranges: state.completed.iter().copied().collect(),
            failed_ranges: state.failed.clone(),
            total_completed: state.completed.len(),
            total_failed: state.failed.len(),
            last_updated: Utc::now(),
        }
    }
}

impl From<ProgressDocument> for ProgressState {
    fn from(doc: ProgressDocument) -> Self {
        let mut state = ProgressState {
            completed: doc.completed_ranges.into_iter().collect(),
            failed: vec![],
        };
        for range in doc.failed_ranges {
            state.mark_failed(range);
        }
        state
    }
}

/// Durable home of a [`ProgressState`], one JSON document per crawl.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: an absent or unreadable document means every chunk is
    /// still to do.
    pub fn load(&self) -> ProgressState {
        if !self.path.exists() {
            info!("No progress file at {}. Starting fresh.", self.path.display());
            return ProgressState::default();
        }
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to read progress file {}: {}", self.path.display(), e);
                return ProgressState::default();
            }
        };
        match serde_json::from_str::<ProgressDocument>(&content) {
            Ok(doc) => {
                if doc.version > PROGRESS_VERSION {
                    warn!(
                        "Progress file version {} is newer than supported version {}",
                        doc.version, PROGRESS_VERSION
                    );
                }
                let state = ProgressState::from(doc);
                info!(
                    "Resumed previous session: {} ranges completed, {} failed.",
                    state.completed.len(),
                    state.failed.len()
                );
                state
            }
            Err(e) => {
                error!("Failed to parse progress file: {}. Starting fresh.", e);
                ProgressState::default()
            }
        }
    }

    /// Writes through a sibling temp file and renames it into place.
    pub fn save(&self, state: &ProgressState) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&ProgressDocument::from(state))
            .context("failed to serialize progress state")?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to move progress into {}", self.path.display()))?;
        Ok(())
    }

    pub fn reset(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("failed to delete {}", self.path.display()))?;
            info!("Progress file {} deleted.", self.path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range(month: u32) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2020, month, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, month, 20).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn missing_file_means_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));
        assert_eq!(store.load(), ProgressState::default());
    }

    #[test]
    fn garbage_file_means_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(ProgressStore::new(path).load(), ProgressState::default());
    }

    #[test]
    fn save_then_load_keeps_both_lists() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("nested/progress.json"));
        let mut state = ProgressState::default();
        state.mark_completed(range(1));
        state.mark_completed(range(2));
        state.mark_failed(range(3));
        store.save(&state).unwrap();

        assert_eq!(store.load(), state);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["totalCompleted"], 2);
        assert_eq!(raw["totalFailed"], 1);
        assert_eq!(raw["completedRanges"][0]["start"], "2020-01-01");
        assert!(raw["lastUpdated"].is_string());
    }

    #[test]
    fn success_clears_earlier_failure() {
        let mut state = ProgressState::default();
        state.mark_failed(range(4));
        state.mark_failed(range(4));
        assert_eq!(state.failed.len(), 1);
        state.mark_completed(range(4));
        assert!(state.failed.is_empty());
        state.mark_failed(range(4));
        assert!(state.failed.is_empty());
    }

    #[test]
    fn reset_removes_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));
        store.save(&ProgressState::default()).unwrap();
        store.reset().unwrap();
        assert!(!store.path().exists());
        store.reset().unwrap();
    }
}
