//! The persistence gateway the reconciler writes through.

mod memory;
mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::record::{CanonicalJudgmentRecord, ContentKey, StatusUpdate};
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStatistics {
    pub total_judgments: u64,
    pub status_breakdown: BTreeMap<String, u64>,
    pub earliest_scraped: Option<DateTime<Utc>>,
    pub latest_scraped: Option<DateTime<Utc>>,
}

impl StoreStatistics {
    pub fn completion_rate(&self) -> f64 {
        if self.total_judgments == 0 {
            return 0.0;
        }
        let completed = self.status_breakdown.get("completed").copied().unwrap_or(0);
        completed as f64 / self.total_judgments as f64 * 100.0
    }
}

#[async_trait]
pub trait JudgmentStore: Send + Sync {
    async fn exists(&self, judgment_id: &str) -> Result<bool, StoreError>;

    /// Id of a stored judgment with exactly this fingerprint.
    async fn find_by_content_key(&self, key: &ContentKey) -> Result<Option<String>, StoreError>;

    /// `Ok(false)` when a judgment with the same id is already stored.
    async fn insert(&self, record: &CanonicalJudgmentRecord) -> Result<bool, StoreError>;

    /// `Ok(false)` when no judgment has this id.
    async fn update_status(&self, judgment_id: &str, update: &StatusUpdate) -> Result<bool, StoreError>;

    async fn statistics(&self) -> Result<StoreStatistics, StoreError>;

    async fn close(&self);
}
