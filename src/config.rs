use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, ensure};
use serde::{Deserialize, de::DeserializeOwned};

use crate::retry::RetryPolicy;

/// Everything the crawler reads from the environment (or a `.env` file).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_start_year")]
    pub scraping_start_year: i32,
    #[serde(default = "default_end_year")]
    pub scraping_end_year: i32,
    #[serde(default = "default_max_days")]
    pub max_date_range_days: u32,
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
    #[serde(default = "default_inter_range_delay")]
    pub inter_range_delay_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_progress_file")]
    pub progress_file: PathBuf,
    #[serde(default)]
    pub debug_capture_dir: Option<PathBuf>,
    #[serde(default = "default_captcha_attempts")]
    pub captcha_max_attempts: u32,
    #[serde(default = "default_captcha_image_path")]
    pub captcha_image_path: PathBuf,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub archive_documents: bool,
    #[serde(default = "default_archive_root")]
    pub archive_root: PathBuf,
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,
}

fn default_base_url() -> String {
    "https://www.sci.gov.in/judgements-judgement-date/".to_string()
}
fn default_start_year() -> i32 {
    2004
}
fn default_end_year() -> i32 {
    2024
}
fn default_max_days() -> u32 {
    30
}
fn default_checkpoint_every() -> usize {
    10
}
fn default_inter_range_delay() -> u64 {
    5
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay() -> u64 {
    1000
}
fn default_request_timeout() -> u64 {
    30
}
fn default_progress_file() -> PathBuf {
    PathBuf::from("scraping_progress.json")
}
fn default_captcha_attempts() -> u32 {
    3
}
fn default_captcha_image_path() -> PathBuf {
    PathBuf::from("temp_captcha.png")
}
fn default_archive_root() -> PathBuf {
    PathBuf::from("archive")
}
fn default_archive_prefix() -> String {
    "judgments/".to_string()
}

impl AppConfig {
    /// Reads from an explicit variable list instead of the process
    /// environment.
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Self>(vars).context("failed to load variables into config struct")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.scraping_start_year <= self.scraping_end_year,
            "start year {} is after end year {}",
            self.scraping_start_year,
            self.scraping_end_year
        );
        ensure!(self.max_date_range_days > 0, "MAX_DATE_RANGE_DAYS must be positive");
        ensure!(self.checkpoint_every > 0, "CHECKPOINT_EVERY must be positive");
        ensure!(self.captcha_max_attempts > 0, "CAPTCHA_MAX_ATTEMPTS must be positive");
        url::Url::parse(&self.base_url).with_context(|| format!("BASE_URL {:?} is not a URL", self.base_url))?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn inter_range_delay(&self) -> Duration {
        Duration::from_secs(self.inter_range_delay_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_delay_ms))
    }
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config =
            envy::from_env::<Self>().context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config.scraping_start_year, 2004);
        assert_eq!(config.scraping_end_year, 2024);
        assert_eq!(config.max_date_range_days, 30);
        assert_eq!(config.checkpoint_every, 10);
        assert_eq!(config.progress_file, PathBuf::from("scraping_progress.json"));
        assert!(config.database_url.is_none());
        assert!(!config.archive_documents);
        config.validate().unwrap();
    }

    #[test]
    fn env_names_map_onto_fields() {
        let config = AppConfig::from_vars(vars(&[
            ("SCRAPING_START_YEAR", "2010"),
            ("SCRAPING_END_YEAR", "2011"),
            ("MAX_DATE_RANGE_DAYS", "7"),
            ("DATABASE_URL", "postgres://localhost/judgments"),
            ("ARCHIVE_DOCUMENTS", "true"),
        ]))
        .unwrap();
        assert_eq!(config.scraping_start_year, 2010);
        assert_eq!(config.max_date_range_days, 7);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/judgments"));
        assert!(config.archive_documents);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let inverted = AppConfig::from_vars(vars(&[
            ("SCRAPING_START_YEAR", "2020"),
            ("SCRAPING_END_YEAR", "2019"),
        ]))
        .unwrap();
        assert!(inverted.validate().is_err());

        let zero_chunk = AppConfig::from_vars(vars(&[("MAX_DATE_RANGE_DAYS", "0")])).unwrap();
        assert!(zero_chunk.validate().is_err());

        let zero_attempts = AppConfig::from_vars(vars(&[("CAPTCHA_MAX_ATTEMPTS", "0")])).unwrap();
        assert!(zero_attempts.validate().is_err());
    }
}
