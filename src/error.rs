use thiserror::Error;

use crate::browser::BrowserError;

/// Why a date range could not be processed. Record-level store failures
/// never reach this level; they are counted by the reconciler.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Network-level failure worth another attempt.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("captcha not solved after {attempts} attempts")]
    CaptchaExhausted { attempts: u32 },

    #[error("browser error: {0}")]
    Browser(BrowserError),
}

impl CrawlError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CrawlError::Transient(_))
    }
}

impl From<BrowserError> for CrawlError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::Network(msg) => CrawlError::Transient(msg),
            other => CrawlError::Browser(other),
        }
    }
}
