//! Turning captured traffic into raw judgment field mappings.
//!
//! Each payload is offered to an ordered list of strategies; the first one
//! that reads anything wins for that payload, and results from every
//! payload are concatenated.

pub mod analytics;
pub mod fields;
pub mod json;
pub mod replay;
pub mod table;

use log::{debug, info};

use crate::capture::CapturedResponse;
pub use analytics::AnalyticsStrategy;
pub use fields::{Field, RawJudgmentFields};
pub use json::JsonStrategy;
pub use replay::ApiReplayer;
pub use table::TableStrategy;

/// One body to read, with the URL it came from.
#[derive(Debug, Clone, Copy)]
pub struct Payload<'a> {
    pub url: &'a str,
    pub body: &'a str,
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Zero or more judgments read from a single payload. Never fails;
    /// an unreadable payload just yields nothing.
    fn extract(&self, payload: &Payload<'_>) -> Vec<RawJudgmentFields>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Found(Vec<RawJudgmentFields>),
    NoData,
}

impl Extraction {
    fn from_rows(rows: Vec<RawJudgmentFields>) -> Self {
        if rows.is_empty() {
            Extraction::NoData
        } else {
            Extraction::Found(rows)
        }
    }

    pub fn into_rows(self) -> Vec<RawJudgmentFields> {
        match self {
            Extraction::Found(rows) => rows,
            Extraction::NoData => vec![],
        }
    }
}

pub struct ExtractionPipeline {
    strategies: Vec<Box<dyn Strategy>>,
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self::new(vec![
            Box::new(JsonStrategy),
            Box::new(TableStrategy),
            Box::new(AnalyticsStrategy),
        ])
    }
}

impl ExtractionPipeline {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Reads one payload with the first strategy that yields anything.
    pub fn extract_payload(&self, payload: &Payload<'_>) -> Vec<RawJudgmentFields> {
        for strategy in &self.strategies {
            let rows = strategy.extract(payload);
            if !rows.is_empty() {
                info!(
                    "{} read {} judgments from {}",
                    strategy.name(),
                    rows.len(),
                    payload.url
                );
                return rows;
            }
        }
        debug!("No strategy read anything from {}", payload.url);
        vec![]
    }

    pub fn extract(&self, responses: &[CapturedResponse]) -> Extraction {
        let rows = responses
            .iter()
            .flat_map(|response| {
                self.extract_payload(&Payload {
                    url: &response.url,
                    body: &response.body,
                })
            })
            .collect();
        Extraction::from_rows(rows)
    }

    /// Reads the live page with the same column rules as captured tables.
    pub fn extract_markup(&self, html: &str) -> Extraction {
        Extraction::from_rows(table::parse_markup(html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn captured(url: &str, body: &str) -> CapturedResponse {
        CapturedResponse {
            url: url.to_string(),
            status: 200,
            headers: BTreeMap::new(),
            body: body.to_string(),
            timestamp: Utc::now(),
        }
    }

    struct Fixed(&'static str, usize);

    impl Strategy for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn extract(&self, _: &Payload<'_>) -> Vec<RawJudgmentFields> {
            (0..self.1)
                .map(|i| {
                    let mut raw = RawJudgmentFields::default();
                    raw.set(Field::CaseNumber, format!("{}-{i}", self.0));
                    raw
                })
                .collect()
        }
    }

    #[test]
    fn first_productive_strategy_wins_per_payload() {
        let pipeline = ExtractionPipeline::new(vec![
            Box::new(Fixed("empty", 0)),
            Box::new(Fixed("first", 1)),
            Box::new(Fixed("second", 2)),
        ]);
        let rows = pipeline
            .extract(&[captured("a", ""), captured("b", "")])
            .into_rows();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.get(Field::CaseNumber) == Some("first-0")));
    }

    #[test]
    fn nothing_readable_is_no_data() {
        let pipeline = ExtractionPipeline::default();
        assert_eq!(
            pipeline.extract(&[captured("https://x.test/api", "{\"ok\":true}")]),
            Extraction::NoData
        );
        assert_eq!(pipeline.extract(&[]), Extraction::NoData);
        assert_eq!(
            pipeline.strategy_names(),
            vec!["json-envelope", "html-table", "analytics-parameter"]
        );
    }

    #[test]
    fn results_are_unioned_across_responses() {
        let json = r#"{"data":[{"case_no":"CA 1/2020"}]}"#;
        let html = "<table><tr><td>1</td><td>2/2020</td><td>CA 2/2020</td></tr></table>";
        let rows = ExtractionPipeline::default()
            .extract(&[
                captured("https://x.test/api/search", json),
                captured("https://x.test/judgment/result", html),
            ])
            .into_rows();
        let cases: Vec<_> = rows.iter().filter_map(|r| r.get(Field::CaseNumber)).collect();
        assert_eq!(cases, vec!["CA 1/2020", "CA 2/2020"]);
    }
}
