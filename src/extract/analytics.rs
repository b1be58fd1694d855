use log::info;
use url::Url;

use super::fields::RawJudgmentFields;
use super::{Payload, Strategy, table};
use crate::text::looks_like_table;

/// Bodies above this size are searched for inline table markup.
pub const LARGE_BODY: usize = 10_000;

/// Best-effort reader for beacon traffic that echoes the results table,
/// either URL-encoded in a query parameter or inline in a large body.
pub struct AnalyticsStrategy;

impl Strategy for AnalyticsStrategy {
    fn name(&self) -> &'static str {
        "analytics-parameter"
    }

    fn extract(&self, payload: &Payload<'_>) -> Vec<RawJudgmentFields> {
        let mut rows = vec![];
        if let Ok(url) = Url::parse(payload.url) {
            for (name, value) in url.query_pairs() {
                if looks_like_table(&value) {
                    info!("Found HTML table data in parameter: {}", name);
                    rows.extend(table::parse_markup(&value));
                }
            }
        }
        if payload.body.len() > LARGE_BODY && looks_like_table(payload.body) {
            info!("Found HTML table data in a {} byte body", payload.body.len());
            rows.extend(table::parse_markup(payload.body));
        }
        rows
    }
}
