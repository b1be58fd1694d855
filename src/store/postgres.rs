use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{JudgmentStore, StoreError, StoreStatistics};
use crate::record::{CanonicalJudgmentRecord, ContentKey, StatusUpdate};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS judgments (
        judgment_id     TEXT PRIMARY KEY,
        court_type      TEXT NOT NULL,
        court_level     SMALLINT NOT NULL,
        court_name      TEXT NOT NULL,
        serial_number   TEXT,
        diary_number    TEXT,
        case_number     TEXT,
        parties         TEXT,
        advocate        TEXT,
        bench           TEXT,
        judgment_by     TEXT,
        judgment_date   TEXT,
        document_links  TEXT[] NOT NULL DEFAULT '{}',
        primary_link    TEXT,
        processing_status TEXT NOT NULL,
        error_message   TEXT,
        retry_count     INTEGER NOT NULL DEFAULT 0,
        file_name       TEXT,
        file_size       BIGINT,
        stored_objects  JSONB NOT NULL DEFAULT '[]',
        search_from     DATE NOT NULL,
        search_to       DATE NOT NULL,
        scraped_at      TIMESTAMPTZ NOT NULL,
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS judgments_content_key_idx
        ON judgments (diary_number, case_number, judgment_date)",
    "CREATE INDEX IF NOT EXISTS judgments_status_idx ON judgments (processing_status)",
    "CREATE INDEX IF NOT EXISTS judgments_court_idx ON judgments (court_type, court_level)",
];

/// Postgres-backed judgment store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and makes sure the table and its indexes exist.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!("Connected to judgment database");
        Ok(Self { pool })
    }
}

#[async_trait]
impl JudgmentStore for PgStore {
    async fn exists(&self, judgment_id: &str) -> Result<bool, StoreError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM judgments WHERE judgment_id = $1)")
                .bind(judgment_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn find_by_content_key(&self, key: &ContentKey) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT judgment_id FROM judgments
             WHERE COALESCE(diary_number, '') = $1
               AND COALESCE(case_number, '') = $2
               AND COALESCE(judgment_date, '') = $3
             LIMIT 1",
        )
        .bind(&key.diary_number)
        .bind(&key.case_number)
        .bind(&key.judgment_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn insert(&self, record: &CanonicalJudgmentRecord) -> Result<bool, StoreError> {
        let stored_objects = serde_json::to_string(&record.stored_objects)?;
        let result = sqlx::query(
            r#"
            INSERT INTO judgments (
                judgment_id, court_type, court_level, court_name,
                serial_number, diary_number, case_number, parties, advocate, bench,
                judgment_by, judgment_date, document_links, primary_link,
                processing_status, error_message, retry_count, file_name, file_size,
                stored_objects, search_from, search_to, scraped_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20::jsonb, $21, $22, $23)
            ON CONFLICT (judgment_id) DO NOTHING
            "#,
        )
        .bind(&record.judgment_id)
        .bind(&record.court_type)
        .bind(record.court_level)
        .bind(&record.court_name)
        .bind(&record.serial_number)
        .bind(&record.diary_number)
        .bind(&record.case_number)
        .bind(&record.parties)
        .bind(&record.advocate)
        .bind(&record.bench)
        .bind(&record.judgment_by)
        .bind(&record.judgment_date)
        .bind(&record.document_links)
        .bind(record.primary_link())
        .bind(record.processing_status.as_str())
        .bind(&record.error_message)
        .bind(record.retry_count)
        .bind(&record.file_name)
        .bind(record.file_size)
        .bind(stored_objects)
        .bind(record.search_from)
        .bind(record.search_to)
        .bind(record.scraped_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_status(&self, judgment_id: &str, update: &StatusUpdate) -> Result<bool, StoreError> {
        let status = update.status().as_str();
        let appended_object = match update {
            StatusUpdate::Uploaded { location } => serde_json::to_string(&[location])?,
            _ => String::new(),
        };
        let query = match update {
            StatusUpdate::Downloaded { file_name, file_size } => sqlx::query(
                "UPDATE judgments SET processing_status = $2, file_name = $3, file_size = $4,
                     updated_at = now()
                 WHERE judgment_id = $1",
            )
            .bind(judgment_id)
            .bind(status)
            .bind(file_name)
            .bind(i64::try_from(*file_size).unwrap_or(i64::MAX)),
            StatusUpdate::Uploaded { .. } => sqlx::query(
                "UPDATE judgments SET processing_status = $2,
                     stored_objects = stored_objects || $3::jsonb, updated_at = now()
                 WHERE judgment_id = $1",
            )
            .bind(judgment_id)
            .bind(status)
            .bind(&appended_object),
            StatusUpdate::Completed => sqlx::query(
                "UPDATE judgments SET processing_status = $2, error_message = NULL, updated_at = now()
                 WHERE judgment_id = $1",
            )
            .bind(judgment_id)
            .bind(status),
            StatusUpdate::Failed { error } => sqlx::query(
                "UPDATE judgments SET processing_status = $2, error_message = $3,
                     retry_count = retry_count + 1, updated_at = now()
                 WHERE judgment_id = $1",
            )
            .bind(judgment_id)
            .bind(status)
            .bind(error),
        };
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn statistics(&self) -> Result<StoreStatistics, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT processing_status, COUNT(*) FROM judgments GROUP BY processing_status",
        )
        .fetch_all(&self.pool)
        .await?;
        let (earliest_scraped, latest_scraped): (Option<DateTime<Utc>>, Option<DateTime<Utc>>) =
            sqlx::query_as("SELECT MIN(scraped_at), MAX(scraped_at) FROM judgments")
                .fetch_one(&self.pool)
                .await?;

        let mut stats = StoreStatistics {
            earliest_scraped,
            latest_scraped,
            ..Default::default()
        };
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or(0);
            stats.total_judgments += count;
            stats.status_breakdown.insert(status, count);
        }
        Ok(stats)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }
}
