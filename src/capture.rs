use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

use crate::browser::{NetworkEvent, ObservedResponse};
use crate::date_range::DateRange;

/// URL fragments that mark traffic worth keeping.
pub const INTEREST_KEYWORDS: [&str; 5] = ["api", "ajax", "search", "judgment", "result"];

const TEXTUAL_CONTENT_TYPES: [&str; 4] = ["json", "html", "xml", "text"];

const JUDGMENT_INDICATORS: [&str; 6] = ["judgment", "case", "petitioner", "respondent", "diary", "pdf"];

pub fn is_interesting(url: &str) -> bool {
    let url = url.to_lowercase();
    INTEREST_KEYWORDS.iter().any(|k| url.contains(k))
}

fn is_textual(headers: &BTreeMap<String, String>) -> bool {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.to_lowercase())
        .is_some_and(|ct| TEXTUAL_CONTENT_TYPES.iter().any(|t| ct.contains(t)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedResponse {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything observed while one range was being searched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Capture {
    pub endpoints: Vec<String>,
    pub responses: Vec<CapturedResponse>,
}

impl Capture {
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty() && self.responses.is_empty()
    }

    pub fn log_analysis(&self) {
        info!("=== NETWORK TRAFFIC ANALYSIS ===");
        info!("Total API endpoints captured: {}", self.endpoints.len());
        info!("Total responses captured: {}", self.responses.len());
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            info!("  endpoint {}. {}", i + 1, endpoint);
        }
        for (i, response) in self.responses.iter().enumerate() {
            info!(
                "  response {}. {} {} ({} bytes)",
                i + 1,
                response.status,
                response.url,
                response.body.len()
            );
            let body = response.body.to_lowercase();
            let found: Vec<&str> = JUDGMENT_INDICATORS
                .iter()
                .copied()
                .filter(|ind| body.contains(ind))
                .collect();
            if !found.is_empty() {
                info!("    -> potential judgment data: {:?}", found);
            }
        }
        info!("=== END NETWORK ANALYSIS ===");
    }

    /// Writes the capture as `network_debug_<from>_<to>.json` under `dir`.
    pub fn save_debug(&self, dir: &Path, range: &DateRange) -> anyhow::Result<PathBuf> {
        #[derive(Serialize)]
        struct DebugArtifact<'a> {
            date_range: &'a DateRange,
            #[serde(flatten)]
            capture: &'a Capture,
            timestamp: DateTime<Utc>,
        }

        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(format!(
            "network_debug_{}_{}.json",
            range.start().format("%Y%m%d"),
            range.end().format("%Y%m%d")
        ));
        let artifact = DebugArtifact {
            date_range: range,
            capture: self,
            timestamp: Utc::now(),
        };
        fs::write(&path, serde_json::to_string_pretty(&artifact)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Network debug information saved to: {}", path.display());
        Ok(path)
    }
}

/// Passive listener over a browser session's network events.
///
/// The buffer is append-only until [`TrafficCapture::drain`] hands its
/// contents to the caller, which leaves it empty for the next range.
#[derive(Debug, Default)]
pub struct TrafficCapture {
    buffer: Capture,
}

impl TrafficCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Request { url, method } => self.on_request(&url, &method),
            NetworkEvent::Response(response) => self.on_response(response),
        }
    }

    pub fn observe_all(&mut self, events: impl IntoIterator<Item = NetworkEvent>) {
        events.into_iter().for_each(|event| self.observe(event));
    }

    pub fn on_request(&mut self, url: &str, method: &str) {
        if !is_interesting(url) {
            return;
        }
        info!("Captured request: {} {}", method, url);
        if !self.buffer.endpoints.iter().any(|e| e == url) {
            self.buffer.endpoints.push(url.to_string());
        }
    }

    pub fn on_response(&mut self, response: ObservedResponse) {
        if response.status != 200 || !is_interesting(&response.url) {
            return;
        }
        if !is_textual(&response.headers) {
            debug!("Skipping non-textual response from {}", response.url);
            return;
        }
        match response.body {
            Ok(bytes) if !bytes.is_empty() => {
                info!(
                    "Captured response body from {} ({} bytes)",
                    response.url,
                    bytes.len()
                );
                self.buffer.responses.push(CapturedResponse {
                    url: response.url,
                    status: response.status,
                    headers: response.headers,
                    body: String::from_utf8_lossy(&bytes).into_owned(),
                    timestamp: Utc::now(),
                });
            }
            Ok(_) => {}
            // Some response types cannot be read; skip and keep listening.
            Err(reason) => debug!("Unreadable body from {}: {}", response.url, reason),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer = Capture::default();
    }

    pub fn drain(&mut self) -> Capture {
        std::mem::take(&mut self.buffer)
    }
}
