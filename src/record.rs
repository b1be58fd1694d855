use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::object_store::ObjectDescriptor;

pub const COURT_TYPE: &str = "supreme_court";
pub const COURT_LEVEL: i16 = 1;
pub const COURT_NAME: &str = "Supreme Court of India";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Downloaded,
    Uploaded,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Downloaded => "downloaded",
            ProcessingStatus::Uploaded => "uploaded",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "downloaded" => Ok(ProcessingStatus::Downloaded),
            "uploaded" => Ok(ProcessingStatus::Uploaded),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(format!("unknown processing status {other:?}")),
        }
    }
}

/// A move along `Pending -> Downloaded -> Uploaded -> Completed`, or off
/// to `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Downloaded { file_name: String, file_size: u64 },
    Uploaded { location: ObjectDescriptor },
    Completed,
    Failed { error: String },
}

impl StatusUpdate {
    pub fn status(&self) -> ProcessingStatus {
        match self {
            StatusUpdate::Downloaded { .. } => ProcessingStatus::Downloaded,
            StatusUpdate::Uploaded { .. } => ProcessingStatus::Uploaded,
            StatusUpdate::Completed => ProcessingStatus::Completed,
            StatusUpdate::Failed { .. } => ProcessingStatus::Failed,
        }
    }
}

/// The (diary, case, date) fingerprint used to spot a judgment that is
/// already stored, whatever its id. Absent parts are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey {
    pub diary_number: String,
    pub case_number: String,
    pub judgment_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalJudgmentRecord {
    pub judgment_id: String,

    pub court_type: String,
    pub court_level: i16,
    pub court_name: String,

    pub serial_number: Option<String>,
    pub diary_number: Option<String>,
    pub case_number: Option<String>,
    pub parties: Option<String>,
    pub advocate: Option<String>,
    pub bench: Option<String>,
    pub judgment_by: Option<String>,
    pub judgment_date: Option<String>,
    pub document_links: Vec<String>,

    pub processing_status: ProcessingStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    /// One entry per uploaded document, in link order.
    #[serde(default)]
    pub stored_objects: Vec<ObjectDescriptor>,

    pub search_from: NaiveDate,
    pub search_to: NaiveDate,
    pub scraped_at: DateTime<Utc>,
}

impl CanonicalJudgmentRecord {
    /// First document link, for readers that expect a single one.
    pub fn primary_link(&self) -> Option<&str> {
        self.document_links.first().map(String::as_str)
    }

    pub fn content_key(&self) -> ContentKey {
        ContentKey {
            diary_number: self.diary_number.clone().unwrap_or_default(),
            case_number: self.case_number.clone().unwrap_or_default(),
            judgment_date: self.judgment_date.clone().unwrap_or_default(),
        }
    }

    pub fn apply(&mut self, update: &StatusUpdate) {
        self.processing_status = update.status();
        match update {
            StatusUpdate::Downloaded { file_name, file_size } => {
                self.file_name = Some(file_name.clone());
                self.file_size = Some(i64::try_from(*file_size).unwrap_or(i64::MAX));
            }
            StatusUpdate::Uploaded { location } => self.stored_objects.push(location.clone()),
            StatusUpdate::Completed => self.error_message = None,
            StatusUpdate::Failed { error } => {
                self.error_message = Some(error.clone());
                self.retry_count += 1;
            }
        }
    }
}
