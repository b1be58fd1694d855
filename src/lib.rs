pub mod archive;
pub mod browser;
pub mod captcha;
pub mod capture;
pub mod config;
pub mod crawler;
pub mod date_range;
pub mod error;
pub mod extract;
pub mod logger;
pub mod object_store;
pub mod progress;
pub mod ratelimit;
pub mod reconcile;
pub mod record;
pub mod requests;
pub mod retry;
pub mod runtime;
pub mod scheduler;
pub mod store;
mod text;

pub use crawler::{Crawler, RunReport};
pub use date_range::DateRange;
pub use error::CrawlError;
pub use extract::{Extraction, ExtractionPipeline, RawJudgmentFields};
pub use reconcile::{Outcome, ReconcileStats, Reconciler, Rejection};
pub use record::CanonicalJudgmentRecord;
pub use scheduler::RangeScheduler;
