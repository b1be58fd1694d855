//! From raw field mappings to stored, deduplicated judgments.

use std::ops::AddAssign;

use chrono::Utc;
use log::{debug, error, info};
use serde::Serialize;

use crate::date_range::DateRange;
use crate::extract::{Field, RawJudgmentFields};
use crate::record::{
    COURT_LEVEL, COURT_NAME, COURT_TYPE, CanonicalJudgmentRecord, ContentKey, ProcessingStatus,
};
use crate::store::{JudgmentStore, StoreError};
use crate::text::{collapse_whitespace, strip_html};

/// Scalar fields with markup removed and whitespace collapsed. Links are
/// carried over untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedFields {
    pub serial_number: Option<String>,
    pub diary_number: Option<String>,
    pub case_number: Option<String>,
    pub parties: Option<String>,
    pub advocate: Option<String>,
    pub bench: Option<String>,
    pub judgment_by: Option<String>,
    pub judgment_date: Option<String>,
    pub document_links: Vec<String>,
}

pub fn normalize(raw: &RawJudgmentFields) -> NormalizedFields {
    let field = |f: Field| {
        raw.get(f)
            .map(strip_html)
            .filter(|value| !value.is_empty())
    };
    NormalizedFields {
        serial_number: field(Field::SerialNumber),
        diary_number: field(Field::DiaryNumber),
        case_number: field(Field::CaseNumber),
        parties: field(Field::Parties),
        advocate: field(Field::Advocate),
        bench: field(Field::Bench),
        judgment_by: field(Field::JudgmentBy),
        judgment_date: field(Field::JudgmentDate),
        document_links: raw.links.clone(),
    }
}

impl NormalizedFields {
    /// A judgment is identifiable with a diary or case number and a date.
    pub fn is_complete(&self) -> bool {
        (self.diary_number.is_some() || self.case_number.is_some()) && self.judgment_date.is_some()
    }

    pub fn content_key(&self) -> ContentKey {
        ContentKey {
            diary_number: self.diary_number.clone().unwrap_or_default(),
            case_number: self.case_number.clone().unwrap_or_default(),
            judgment_date: self.judgment_date.clone().unwrap_or_default(),
        }
    }
}

/// Storage-safe id built from diary number, case number, and date. Case
/// and spacing differences do not change it.
pub fn judgment_id(diary_number: &str, case_number: &str, judgment_date: &str) -> String {
    let part = |s: &str| collapse_whitespace(&strip_html(s)).to_uppercase();
    format!(
        "{}_{}_{}",
        part(diary_number),
        part(case_number),
        part(judgment_date)
    )
    .replace(['/', ' ', ':'], "_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A stored judgment already has the same fingerprint.
    ContentDuplicate,
    /// A stored judgment already has the same id.
    IdDuplicate,
    /// Missing diary/case number or date.
    Incomplete,
}

#[derive(Debug)]
pub enum Outcome {
    Accepted(Box<CanonicalJudgmentRecord>),
    Rejected(Rejection),
    /// The store failed; the judgment was not saved.
    Failed(StoreError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub accepted: usize,
    pub duplicates: usize,
    pub incomplete: usize,
    pub failed: usize,
}

impl ReconcileStats {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Accepted(_) => self.accepted += 1,
            Outcome::Rejected(Rejection::Incomplete) => self.incomplete += 1,
            Outcome::Rejected(_) => self.duplicates += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn seen(&self) -> usize {
        self.accepted + self.duplicates + self.incomplete + self.failed
    }
}

impl AddAssign for ReconcileStats {
    fn add_assign(&mut self, other: Self) {
        self.accepted += other.accepted;
        self.duplicates += other.duplicates;
        self.incomplete += other.incomplete;
        self.failed += other.failed;
    }
}

/// Decides whether each extracted judgment is new and stores the new ones.
pub struct Reconciler<'a> {
    store: &'a dyn JudgmentStore,
    initial_status: ProcessingStatus,
}

impl<'a> Reconciler<'a> {
    /// New judgments are stored as completed: a direct document link is
    /// all that is needed.
    pub fn new(store: &'a dyn JudgmentStore) -> Self {
        Self {
            store,
            initial_status: ProcessingStatus::Completed,
        }
    }

    /// Stores new judgments as pending, for a later download and upload.
    pub fn pending(store: &'a dyn JudgmentStore) -> Self {
        Self {
            store,
            initial_status: ProcessingStatus::Pending,
        }
    }

    pub async fn reconcile(&self, raw: &RawJudgmentFields, range: &DateRange) -> Outcome {
        let fields = normalize(raw);
        if !fields.is_complete() {
            debug!("Skipping incomplete judgment {:?}", fields);
            return Outcome::Rejected(Rejection::Incomplete);
        }

        let key = fields.content_key();
        match self.store.find_by_content_key(&key).await {
            Ok(Some(existing)) => {
                info!("Duplicate judgment found (existing id {}), skipping", existing);
                return Outcome::Rejected(Rejection::ContentDuplicate);
            }
            Ok(None) => {}
            Err(e) => return failed("content lookup", e),
        }

        let id = judgment_id(&key.diary_number, &key.case_number, &key.judgment_date);
        match self.store.exists(&id).await {
            Ok(true) => {
                info!("Judgment {} already exists, skipping", id);
                return Outcome::Rejected(Rejection::IdDuplicate);
            }
            Ok(false) => {}
            Err(e) => return failed("id lookup", e),
        }

        let record = self.build(id, fields, range);
        match self.store.insert(&record).await {
            Ok(true) => {
                info!(
                    "Saved judgment: {} with {} links",
                    record.case_number.as_deref().unwrap_or(&record.judgment_id),
                    record.document_links.len()
                );
                Outcome::Accepted(Box::new(record))
            }
            Ok(false) => {
                info!("Judgment {} was stored concurrently, skipping", record.judgment_id);
                Outcome::Rejected(Rejection::IdDuplicate)
            }
            Err(e) => failed("insert", e),
        }
    }

    /// Reconciles every row and returns the accepted judgments with the
    /// tallies.
    pub async fn reconcile_all(
        &self,
        rows: &[RawJudgmentFields],
        range: &DateRange,
    ) -> (Vec<CanonicalJudgmentRecord>, ReconcileStats) {
        let mut stats = ReconcileStats::default();
        let mut accepted = vec![];
        for raw in rows {
            let outcome = self.reconcile(raw, range).await;
            stats.record(&outcome);
            if let Outcome::Accepted(record) = outcome {
                accepted.push(*record);
            }
        }
        (accepted, stats)
    }

    fn build(&self, judgment_id: String, fields: NormalizedFields, range: &DateRange) -> CanonicalJudgmentRecord {
        CanonicalJudgmentRecord {
            judgment_id,
            court_type: COURT_TYPE.to_string(),
            court_level: COURT_LEVEL,
            court_name: COURT_NAME.to_string(),
            serial_number: fields.serial_number,
            diary_number: fields.diary_number,
            case_number: fields.case_number,
            parties: fields.parties,
            advocate: fields.advocate,
            bench: fields.bench,
            judgment_by: fields.judgment_by,
            judgment_date: fields.judgment_date,
            document_links: fields.document_links,
            processing_status: self.initial_status,
            error_message: None,
            retry_count: 0,
            file_name: None,
            file_size: None,
            stored_objects: vec![],
            search_from: range.start(),
            search_to: range.end(),
            scraped_at: Utc::now(),
        }
    }
}

fn failed(step: &str, e: StoreError) -> Outcome {
    error!("Failed to save judgment ({}): {}", step, e);
    Outcome::Failed(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
        )
        .unwrap()
    }

    fn raw(diary: &str, case: &str, date: &str, links: &[&str]) -> RawJudgmentFields {
        let mut raw = RawJudgmentFields::default();
        raw.set(Field::DiaryNumber, diary);
        raw.set(Field::CaseNumber, case);
        raw.set(Field::JudgmentDate, date);
        links.iter().for_each(|l| raw.push_link(l));
        raw
    }

    #[test]
    fn id_is_storage_safe_and_case_insensitive() {
        assert_eq!(
            judgment_id("228/2011", "C.A. No.-009098", "02-01-2024"),
            "228_2011_C.A._NO.-009098_02-01-2024"
        );
        assert_eq!(
            judgment_id(" <b>228/2011</b> ", "c.a.  no.-009098", "02-01-2024"),
            judgment_id("228/2011", "C.A. No.-009098", "02-01-2024")
        );
        assert!(!judgment_id("1:2", "a b", "x/y").contains([':', ' ', '/']));
    }

    #[test]
    fn normalization_strips_scalars_and_keeps_links() {
        let mut input = raw("<span>228/2011</span>", "C.A.\n  No.-009098", "02-01-2024", &["a.pdf", "b.pdf"]);
        input.set(Field::Parties, "A<br>vs   B");
        let fields = normalize(&input);
        assert_eq!(fields.diary_number.as_deref(), Some("228/2011"));
        assert_eq!(fields.case_number.as_deref(), Some("C.A. No.-009098"));
        assert_eq!(fields.parties.as_deref(), Some("A vs B"));
        assert_eq!(fields.document_links, vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn incomplete_records_are_rejected_without_writes() {
        let store = MemoryStore::new();
        let reconciler = Reconciler::new(&store);
        let no_date = raw("228/2011", "CA 1", "", &["a.pdf"]);
        let no_numbers = raw("", "", "02-01-2024", &["a.pdf"]);
        for input in [no_date, no_numbers] {
            assert!(matches!(
                reconciler.reconcile(&input, &range()).await,
                Outcome::Rejected(Rejection::Incomplete)
            ));
        }
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn accepted_record_carries_provenance() {
        let store = MemoryStore::new();
        let outcome = Reconciler::new(&store)
            .reconcile(&raw("228/2011", "CA 1", "02-01-2024", &["a.pdf", "b.pdf"]), &range())
            .await;
        let record = match outcome {
            Outcome::Accepted(record) => record,
            other => panic!("expected acceptance, got {other:?}"),
        };
        assert_eq!(record.processing_status, ProcessingStatus::Completed);
        assert_eq!(record.court_type, "supreme_court");
        assert_eq!(record.search_from, range().start());
        assert_eq!(record.primary_link(), Some("a.pdf"));
        assert_eq!(store.get(&record.judgment_id).await.as_ref(), Some(record.as_ref()));
    }

    #[tokio::test]
    async fn second_submission_is_a_duplicate() {
        let store = MemoryStore::new();
        let reconciler = Reconciler::new(&store);
        let input = raw("228/2011", "CA 1", "02-01-2024", &[]);
        let (accepted, stats) = reconciler
            .reconcile_all(&[input.clone(), input], &range())
            .await;
        assert_eq!(accepted.len(), 1);
        assert_eq!(stats, ReconcileStats { accepted: 1, duplicates: 1, incomplete: 0, failed: 0 });
    }

    #[tokio::test]
    async fn capitalization_change_is_caught_by_id() {
        let store = MemoryStore::new();
        let reconciler = Reconciler::new(&store);
        reconciler
            .reconcile(&raw("228/2011", "C.A. No.-1", "02-01-2024", &[]), &range())
            .await;
        let outcome = reconciler
            .reconcile(&raw("228/2011", "c.a. no.-1", "02-01-2024", &[]), &range())
            .await;
        assert!(matches!(outcome, Outcome::Rejected(Rejection::IdDuplicate)));
    }
}
