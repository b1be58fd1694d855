use log::{debug, info, warn};
use url::Url;

use super::fields::RawJudgmentFields;
use super::{ExtractionPipeline, Payload};
use crate::date_range::DateRange;
use crate::requests::RequestClient;

/// Reissues recorded API calls with the range spelled several ways.
pub struct ApiReplayer {
    client: RequestClient,
}

/// Query parameters to try for one range, most likely first. The last
/// variant is empty: the endpoint exactly as it was recorded.
pub fn param_variants(range: &DateRange) -> Vec<Vec<(&'static str, String)>> {
    let (from, to) = range.form_values();
    let (iso_from, iso_to) = (range.start().to_string(), range.end().to_string());
    let named = vec![
        vec![("from_date", from.clone()), ("to_date", to.clone())],
        vec![("fromdate", from), ("todate", to)],
        vec![("start_date", iso_from), ("end_date", iso_to)],
    ];
    let combined = named.concat();
    named.into_iter().chain([combined, vec![]]).collect()
}

/// `endpoint` with `params` set, replacing any same-named parameters it
/// already carries and keeping the rest.
pub fn with_params(endpoint: &str, params: &[(&str, String)]) -> Option<Url> {
    let mut url = Url::parse(endpoint).ok()?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !params.iter().any(|(p, _)| p == name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() && params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .extend_pairs(params.iter().map(|(n, v)| (*n, v.as_str())));
    }
    Some(url)
}

impl ApiReplayer {
    pub fn new(client: RequestClient) -> Self {
        Self { client }
    }

    pub async fn replay(
        &self,
        endpoints: &[String],
        range: &DateRange,
        pipeline: &ExtractionPipeline,
    ) -> Vec<RawJudgmentFields> {
        let mut rows = vec![];
        for endpoint in endpoints {
            info!("Trying direct API call: {}", endpoint);
            if let Some(found) = self.replay_endpoint(endpoint, range, pipeline).await {
                rows.extend(found);
            }
        }
        rows
    }

    async fn replay_endpoint(
        &self,
        endpoint: &str,
        range: &DateRange,
        pipeline: &ExtractionPipeline,
    ) -> Option<Vec<RawJudgmentFields>> {
        for params in param_variants(range) {
            let Some(url) = with_params(endpoint, &params) else {
                debug!("Cannot replay unparseable endpoint {}", endpoint);
                return None;
            };
            let body = match self.client.fetch_text(url.as_str()).await {
                Ok(Some(body)) => body,
                Ok(None) => continue,
                Err(e) => {
                    warn!("API call to {} failed: {}", url, e);
                    continue;
                }
            };
            let rows = pipeline.extract_payload(&Payload {
                url: url.as_str(),
                body: &body,
            });
            if !rows.is_empty() {
                info!("Direct API call returned {} judgments via {}", rows.len(), url);
                return Some(rows);
            }
        }
        None
    }
}
