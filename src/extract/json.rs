use log::{debug, info};
use serde_json::{Map, Value};

use super::fields::{JSON_ALIASES, RawJudgmentFields, Target};
use super::{Payload, Strategy, table};

/// Keys under which an envelope may carry a rendered results fragment.
const RESULTS_HTML_KEYS: [&str; 3] = ["resultsHtml", "results_html", "html"];

/// Top-level keys that may hold a list of judgment objects.
const LIST_KEYS: [&str; 5] = ["data", "results", "judgments", "records", "items"];

/// Reads JSON envelopes: an embedded results fragment, or lists of items.
pub struct JsonStrategy;

impl Strategy for JsonStrategy {
    fn name(&self) -> &'static str {
        "json-envelope"
    }

    fn extract(&self, payload: &Payload<'_>) -> Vec<RawJudgmentFields> {
        match serde_json::from_str::<Value>(payload.body.trim_start()) {
            Ok(value) => parse_value(&value),
            Err(e) => {
                debug!("{} is not JSON: {}", payload.url, e);
                vec![]
            }
        }
    }
}

pub fn parse_value(value: &Value) -> Vec<RawJudgmentFields> {
    if let Some(fragment) = results_fragment(value) {
        info!("Found results HTML with {} characters", fragment.len());
        let rows = table::parse_markup(fragment);
        if !rows.is_empty() {
            return rows;
        }
    }
    match value {
        Value::Object(map) => LIST_KEYS
            .iter()
            .filter_map(|key| map.get(*key)?.as_array())
            .flatten()
            .filter_map(item_fields)
            .collect(),
        Value::Array(items) => items.iter().filter_map(item_fields).collect(),
        _ => vec![],
    }
}

fn results_fragment(value: &Value) -> Option<&str> {
    let containers = [Some(value), value.get("data")];
    containers.into_iter().flatten().find_map(|container| {
        RESULTS_HTML_KEYS
            .iter()
            .find_map(|key| container.get(*key)?.as_str())
            .filter(|html| !html.trim().is_empty())
    })
}

fn item_fields(item: &Value) -> Option<RawJudgmentFields> {
    let map = item.as_object()?;
    let mut raw = RawJudgmentFields::default();
    for (target, aliases) in JSON_ALIASES {
        match target {
            Target::Scalar(field) => {
                if let Some(text) = aliases.iter().find_map(|alias| scalar_text(map, alias)) {
                    raw.set(*field, text);
                }
            }
            Target::Link => {
                if let Some(links) = aliases.iter().map(|alias| link_texts(map, alias)).find(|l| !l.is_empty()) {
                    links.into_iter().for_each(|link| raw.push_link(link));
                }
            }
        }
    }
    raw.is_worth_keeping().then_some(raw)
}

fn scalar_text(map: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match map.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn link_texts(map: &Map<String, Value>, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::fields::Field;
    use serde_json::json;

    fn extract(body: &str) -> Vec<RawJudgmentFields> {
        JsonStrategy.extract(&Payload {
            url: "https://x.test/wp-admin/admin-ajax.php",
            body,
        })
    }

    #[test]
    fn maps_aliases_from_listed_items() {
        let body = json!({
            "results": [
                {"sno": 1, "diary_no": "12/2020", "caseNumber": "CA 3/2020",
                 "petitioner": "A vs B", "counsel": "X", "decided_on": "04-05-2020",
                 "pdf_links": ["a.pdf", "b.pdf"]},
                {"case": "", "id": 2},
                {"url": "https://x.test/c.pdf"}
            ],
            "total": 3
        })
        .to_string();
        let rows = extract(&body);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(Field::SerialNumber), Some("1"));
        assert_eq!(rows[0].get(Field::DiaryNumber), Some("12/2020"));
        assert_eq!(rows[0].get(Field::CaseNumber), Some("CA 3/2020"));
        assert_eq!(rows[0].get(Field::Parties), Some("A vs B"));
        assert_eq!(rows[0].get(Field::JudgmentDate), Some("04-05-2020"));
        assert_eq!(rows[0].links, vec!["a.pdf", "b.pdf"]);
        assert_eq!(rows[1].links, vec!["https://x.test/c.pdf"]);
        assert!(!rows[1].has_case_number());
    }

    #[test]
    fn first_alias_wins() {
        let body = json!([{"case": "first", "case_no": "second"}]).to_string();
        assert_eq!(extract(&body)[0].get(Field::CaseNumber), Some("first"));
    }

    #[test]
    fn embedded_fragment_goes_through_table_reader() {
        let html = "<table><tr><td>1</td><td>9/2021</td><td>CA 9/2021</td></tr></table>";
        let body = json!({"success": true, "data": {"resultsHtml": html}}).to_string();
        let rows = extract(&body);
        assert_eq!(rows, table::parse_markup(html));
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn non_json_yields_nothing() {
        assert!(extract("<html></html>").is_empty());
        assert!(extract("\"just a string\"").is_empty());
    }
}
