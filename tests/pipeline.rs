use std::collections::BTreeMap;

use chrono::Utc;
use judgment_scraper::capture::CapturedResponse;
use judgment_scraper::extract::fields::Field;
use judgment_scraper::extract::table;
use judgment_scraper::{Extraction, ExtractionPipeline};

const RESULTS_TABLE: &str = r#"
<table class="distTableContent">
  <thead>
    <tr><th>Serial Number</th><th>Diary Number</th><th>Case Number</th><th>Petitioner / Respondent</th>
        <th>Petitioner/Respondent Advocate</th><th>Bench</th><th>Judgment By</th><th>Judgment</th></tr>
  </thead>
  <tbody>
    <tr>
      <td>1</td><td>228/2011</td><td>C.A. No.-009098 - 2011</td>
      <td><div>A</div><div>VS</div><div>B</div></td>
      <td>Adv X</td><td>Bench Y</td><td>Judge Z</td>
      <td>
        <a target="_blank" href="https://api.sci.gov.in/supremecourt/2011/228/228_2011_Judgement_02-Jan-2024.pdf">02-01-2024(English)</a><br/>
        <a target="_blank" href="https://api.sci.gov.in/supremecourt/2011/228/228_2011_Judgement_02-Jan-2024_hindi.pdf">2024 INSC 1(Hindi)</a><br/>
        <a target="_blank" href="https://api.sci.gov.in/"></a>
      </td>
    </tr>
    <tr><td>2</td><td>Record not found</td></tr>
  </tbody>
</table>"#;

fn response(url: &str, content_type: &str, body: String) -> CapturedResponse {
    CapturedResponse {
        url: url.to_string(),
        status: 200,
        headers: BTreeMap::from([("content-type".to_string(), content_type.to_string())]),
        body,
        timestamp: Utc::now(),
    }
}

#[test]
fn scenario_row_keeps_every_link() {
    let rows = table::parse_markup(RESULTS_TABLE);
    assert_eq!(rows.len(), 1, "short row must not become a partial record");
    let row = &rows[0];
    assert_eq!(row.get(Field::SerialNumber), Some("1"));
    assert_eq!(row.get(Field::DiaryNumber), Some("228/2011"));
    assert_eq!(row.get(Field::CaseNumber), Some("C.A. No.-009098 - 2011"));
    assert_eq!(row.get(Field::JudgmentBy), Some("Judge Z"));
    assert_eq!(row.get(Field::JudgmentDate), Some("02-01-2024"));
    assert_eq!(row.links.len(), 2);
    assert!(row.links.iter().all(|l| l.ends_with(".pdf")));
}

#[test]
fn embedded_table_reads_like_the_table_itself() {
    let envelope = serde_json::json!({
        "success": true,
        "data": { "resultsHtml": RESULTS_TABLE }
    });
    let pipeline = ExtractionPipeline::default();
    let from_json = pipeline.extract(&[response(
        "https://www.sci.gov.in/wp-admin/admin-ajax.php",
        "application/json",
        envelope.to_string(),
    )]);
    let from_html = pipeline.extract(&[response(
        "https://www.sci.gov.in/judgment/results",
        "text/html",
        RESULTS_TABLE.to_string(),
    )]);
    assert_eq!(from_json, from_html);
    assert_eq!(from_json, Extraction::Found(table::parse_markup(RESULTS_TABLE)));
}

#[test]
fn each_response_is_read_independently() {
    let json_items = serde_json::json!({
        "judgments": [
            {"diary_no": "1/2020", "case_no": "W.P.(C) No. 1/2020", "judgment_date": "05-01-2020",
             "pdf": "https://x.test/1.pdf"}
        ]
    });
    let rows = ExtractionPipeline::default()
        .extract(&[
            response("https://www.sci.gov.in/api/search", "application/json", json_items.to_string()),
            response("https://www.sci.gov.in/judgment/results", "text/html", RESULTS_TABLE.to_string()),
            response("https://www.sci.gov.in/api/ping", "application/json", "{}".to_string()),
        ])
        .into_rows();
    let diaries: Vec<_> = rows.iter().filter_map(|r| r.get(Field::DiaryNumber)).collect();
    assert_eq!(diaries, vec!["1/2020", "228/2011"]);
}

#[test]
fn live_page_fallback_uses_the_same_columns() {
    let page = format!("<html><body><div id='cnrresults'>{RESULTS_TABLE}</div></body></html>");
    let pipeline = ExtractionPipeline::default();
    assert_eq!(pipeline.extract(&[]), Extraction::NoData);
    assert_eq!(
        pipeline.extract_markup(&page),
        Extraction::Found(table::parse_markup(RESULTS_TABLE))
    );
}
