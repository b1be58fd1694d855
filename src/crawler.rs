//! One pass over the remaining date ranges, strictly one range at a time.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{error, info, warn};
use serde::Serialize;

use crate::archive::Archiver;
use crate::browser::{BrowserError, BrowserSession};
use crate::capture::{Capture, TrafficCapture};
use crate::captcha::{self, CaptchaOutcome, CaptchaSolver};
use crate::config::AppConfig;
use crate::date_range::DateRange;
use crate::error::CrawlError;
use crate::extract::{ApiReplayer, Extraction, ExtractionPipeline, RawJudgmentFields};
use crate::reconcile::{ReconcileStats, Reconciler};
use crate::retry;
use crate::scheduler::RangeScheduler;
use crate::store::JudgmentStore;

/// What happened to one range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RangeReport {
    pub found: usize,
    pub reconcile: ReconcileStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub ranges_planned: usize,
    pub ranges_completed: usize,
    pub ranges_failed: usize,
    pub judgments_found: usize,
    pub reconcile: ReconcileStats,
    pub interrupted: bool,
}

impl RunReport {
    fn new(ranges_planned: usize) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            ranges_planned,
            ranges_completed: 0,
            ranges_failed: 0,
            judgments_found: 0,
            reconcile: ReconcileStats::default(),
            interrupted: false,
        }
    }

    pub fn log_summary(&self) {
        let elapsed = self.finished_at.unwrap_or_else(Utc::now) - self.started_at;
        info!("{}", "=".repeat(60));
        info!("SCRAPING COMPLETED{}", if self.interrupted { " (interrupted)" } else { "" });
        info!("Duration: {}s", elapsed.num_seconds());
        info!(
            "Ranges: {} planned, {} completed, {} failed",
            self.ranges_planned, self.ranges_completed, self.ranges_failed
        );
        info!("Judgments found: {}", self.judgments_found);
        info!(
            "Saved: {}, duplicates: {}, incomplete: {}, save failures: {}",
            self.reconcile.accepted,
            self.reconcile.duplicates,
            self.reconcile.incomplete,
            self.reconcile.failed
        );
        info!("{}", "=".repeat(60));
    }
}

pub struct Crawler {
    config: AppConfig,
    session: Box<dyn BrowserSession>,
    solver: Box<dyn CaptchaSolver>,
    store: Arc<dyn JudgmentStore>,
    pipeline: ExtractionPipeline,
    replayer: Option<ApiReplayer>,
    archiver: Option<Archiver>,
    capture: TrafficCapture,
}

impl Crawler {
    pub fn new(
        config: AppConfig,
        session: Box<dyn BrowserSession>,
        solver: Box<dyn CaptchaSolver>,
        store: Arc<dyn JudgmentStore>,
    ) -> Self {
        Self {
            config,
            session,
            solver,
            store,
            pipeline: ExtractionPipeline::default(),
            replayer: None,
            archiver: None,
            capture: TrafficCapture::new(),
        }
    }

    /// Reissues recorded API calls when nothing else found judgments.
    pub fn with_replayer(mut self, replayer: ApiReplayer) -> Self {
        self.replayer = Some(replayer);
        self
    }

    /// Downloads and archives the documents of every new judgment.
    pub fn with_archiver(mut self, archiver: Archiver) -> Self {
        self.archiver = Some(archiver);
        self
    }

    /// Works through the scheduler's remaining ranges until done or until
    /// ctrl-c. Progress is saved every few ranges and always at the end.
    pub async fn run(&mut self, scheduler: &RangeScheduler) -> anyhow::Result<RunReport> {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        };
        self.run_until(scheduler, ctrl_c).await
    }

    /// Like [`Crawler::run`], stopping when `shutdown` completes. The range
    /// in flight at that moment is left unrecorded.
    pub async fn run_until(
        &mut self,
        scheduler: &RangeScheduler,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<RunReport> {
        let (progress, ranges) = scheduler.plan()?;
        let mut checkpointer = scheduler.checkpointer(progress, self.config.checkpoint_every);
        let mut report = RunReport::new(ranges.len());
        info!("Processing {} date ranges", ranges.len());

        tokio::pin!(shutdown);

        for (i, range) in ranges.iter().copied().enumerate() {
            info!("Progress: {}/{} - {}", i + 1, ranges.len(), range);
            let result = tokio::select! {
                result = self.process_with_retry(range) => Some(result),
                _ = &mut shutdown => None,
            };
            let Some(result) = result else {
                warn!("Interrupted while processing {}; it will be retried next run", range);
                report.interrupted = true;
                break;
            };

            match result {
                Ok(range_report) => {
                    report.ranges_completed += 1;
                    report.judgments_found += range_report.found;
                    report.reconcile += range_report.reconcile;
                    checkpointer.record_completed(range);
                }
                Err(e) => {
                    error!("Failed to process date range {}: {}", range, e);
                    report.ranges_failed += 1;
                    checkpointer.record_failed(range);
                }
            }

            if i + 1 < ranges.len() {
                let interrupted = tokio::select! {
                    _ = tokio::time::sleep(self.config.inter_range_delay()) => false,
                    _ = &mut shutdown => true,
                };
                if interrupted {
                    warn!("Interrupted between ranges");
                    report.interrupted = true;
                    break;
                }
            }
        }

        let saved = checkpointer.finish();
        self.shutdown().await;
        report.finished_at = Some(Utc::now());
        report.log_summary();
        saved?;
        Ok(report)
    }

    async fn process_with_retry(&mut self, range: DateRange) -> Result<RangeReport, CrawlError> {
        let policy = self.config.retry_policy();
        retry::with_backoff(policy, self, move |crawler| {
            crawler.process_range(range).boxed_local()
        })
        .await
    }

    /// Search, capture, extract, and reconcile one range.
    pub async fn process_range(&mut self, range: DateRange) -> Result<RangeReport, CrawlError> {
        info!("Processing date range: {}", range);
        self.capture.clear();
        self.session.take_network_events();

        self.search(&range).await?;
        let page = self.session.content().await?;

        self.capture.observe_all(self.session.take_network_events());
        let capture = self.capture.drain();

        let rows = self.extract(&capture, &page, &range).await;
        capture.log_analysis();
        if let Some(dir) = &self.config.debug_capture_dir {
            match capture.save_debug(dir, &range) {
                Ok(path) => info!("Network debug info saved to: {}", path.display()),
                Err(e) => error!("Failed to save network debug info: {:#}", e),
            }
        }

        if rows.is_empty() {
            info!("No judgments found for date range: {}", range);
            return Ok(RangeReport::default());
        }
        let stats = self.save(&rows, &range).await;
        info!(
            "Processed {} judgments for {}: {} saved, {} duplicates",
            rows.len(),
            range,
            stats.accepted,
            stats.duplicates
        );
        Ok(RangeReport {
            found: rows.len(),
            reconcile: stats,
        })
    }

    /// Loads the search page, fills the form, answers the CAPTCHA, and
    /// submits. Traffic from before the submission is discarded.
    async fn search(&mut self, range: &DateRange) -> Result<(), CrawlError> {
        let base_url = self.config.base_url.clone();
        self.session.navigate(&base_url).await?;

        let (from, to) = range.form_values();
        info!("Filling search form: {} to {}", from, to);
        self.session.fill("from", &from).await?;
        self.session.fill("to", &to).await?;

        let outcome = captcha::solve_with_attempts(
            self.solver.as_mut(),
            self.session.as_mut(),
            self.config.captcha_max_attempts,
        )
        .await?;
        match outcome {
            CaptchaOutcome::NotPresent => {}
            CaptchaOutcome::Solved(text) => {
                if !captcha::enter_text(self.session.as_mut(), &text).await {
                    return Err(CrawlError::Browser(BrowserError::MissingElement(
                        "captcha input".to_string(),
                    )));
                }
            }
            CaptchaOutcome::Exhausted { attempts } => {
                return Err(CrawlError::CaptchaExhausted { attempts });
            }
        }

        self.session.take_network_events();
        self.session.submit().await?;

        let page = self.session.content().await?;
        let current_url = self.session.current_url().unwrap_or_default();
        if captcha::submission_rejected(&page, &current_url, &base_url) {
            return Err(CrawlError::Transient("search submission was rejected".to_string()));
        }
        info!("Form submitted successfully");
        Ok(())
    }

    /// Captured traffic first, then the page itself, then replayed API calls.
    async fn extract(
        &self,
        capture: &Capture,
        page: &str,
        range: &DateRange,
    ) -> Vec<RawJudgmentFields> {
        if let Extraction::Found(rows) = self.pipeline.extract(&capture.responses) {
            info!("Found {} judgments in network responses", rows.len());
            return rows;
        }
        info!("No judgments found in network responses, trying the page content...");
        if let Extraction::Found(rows) = self.pipeline.extract_markup(page) {
            info!("Found {} judgments in the page", rows.len());
            return rows;
        }
        let Some(replayer) = &self.replayer else {
            return vec![];
        };
        if capture.endpoints.is_empty() {
            return vec![];
        }
        warn!("No judgment links found via the page for {}, replaying API calls", range);
        replayer.replay(&capture.endpoints, range, &self.pipeline).await
    }

    async fn save(&self, rows: &[RawJudgmentFields], range: &DateRange) -> ReconcileStats {
        let store = self.store.as_ref();
        let reconciler = if self.archiver.is_some() {
            Reconciler::pending(store)
        } else {
            Reconciler::new(store)
        };
        let (accepted, stats) = reconciler.reconcile_all(rows, range).await;
        if let Some(archiver) = &self.archiver {
            for record in &accepted {
                archiver.archive(store, record).await;
            }
        }
        stats
    }

    /// Closes the browser session and the store, logging any failure.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.session.close().await {
            warn!("Error closing browser session: {}", e);
        }
        self.store.close().await;
    }
}
