use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use log::info;
use tokio::sync::RwLock;

use super::{JudgmentStore, StoreError, StoreStatistics};
use crate::record::{CanonicalJudgmentRecord, ContentKey, StatusUpdate};

/// Keeps judgments in process memory, keyed by id. Used for dry runs and
/// when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, CanonicalJudgmentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<CanonicalJudgmentRecord> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn get(&self, judgment_id: &str) -> Option<CanonicalJudgmentRecord> {
        self.records.read().await.get(judgment_id).cloned()
    }

    /// Writes every stored judgment to `path` as a JSON array.
    pub async fn write_json(&self, path: &Path) -> Result<(), StoreError> {
        let records = self.records().await;
        let json = serde_json::to_string_pretty(&records)?;
        tokio::fs::write(path, json).await?;
        info!("Wrote {} judgments to {}", records.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl JudgmentStore for MemoryStore {
    async fn exists(&self, judgment_id: &str) -> Result<bool, StoreError> {
        Ok(self.records.read().await.contains_key(judgment_id))
    }

    async fn find_by_content_key(&self, key: &ContentKey) -> Result<Option<String>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|record| record.content_key() == *key)
            .map(|record| record.judgment_id.clone()))
    }

    async fn insert(&self, record: &CanonicalJudgmentRecord) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.judgment_id) {
            return Ok(false);
        }
        records.insert(record.judgment_id.clone(), record.clone());
        Ok(true)
    }

    async fn update_status(&self, judgment_id: &str, update: &StatusUpdate) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(judgment_id) else {
            return Ok(false);
        };
        record.apply(update);
        Ok(true)
    }

    async fn statistics(&self) -> Result<StoreStatistics, StoreError> {
        let records = self.records.read().await;
        let mut stats = StoreStatistics {
            total_judgments: records.len() as u64,
            ..Default::default()
        };
        for record in records.values() {
            *stats
                .status_breakdown
                .entry(record.processing_status.to_string())
                .or_default() += 1;
        }
        stats.earliest_scraped = records.values().map(|r| r.scraped_at).min();
        stats.latest_scraped = records.values().map(|r| r.scraped_at).max();
        Ok(stats)
    }

    async fn close(&self) {}
}
