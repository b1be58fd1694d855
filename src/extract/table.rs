use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::fields::{Field, RawJudgmentFields};
use super::{Payload, Strategy};
use crate::text::{extract_text, looks_like_table};

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static CONTAINER_TABLES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("#cnrresults table, .distTableContent table").expect("valid selector")
});
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("valid selector"));

static DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{2}-\d{2}-\d{4}").expect("valid regex"));
static ONCLICK_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"]([^'"]*\.pdf[^'"]*)['"]|window\.open\(['"]([^'"]*)['"]"#).expect("valid regex")
});

/// Reads the judgment listing table, one record per data row.
pub struct TableStrategy;

impl Strategy for TableStrategy {
    fn name(&self) -> &'static str {
        "html-table"
    }

    fn extract(&self, payload: &Payload<'_>) -> Vec<RawJudgmentFields> {
        if !looks_like_table(payload.body) {
            return vec![];
        }
        parse_markup(payload.body)
    }
}

/// Parses a whole page or a fragment. Fragments of bare `<tr>` rows are
/// read as if they sat inside a table.
pub fn parse_markup(markup: &str) -> Vec<RawJudgmentFields> {
    let rows = parse_document(&Html::parse_document(markup));
    if !rows.is_empty() || markup.to_lowercase().contains("<table") {
        return rows;
    }
    if looks_like_table(markup) {
        debug!("Re-reading bare table rows inside a synthetic table");
        return parse_document(&Html::parse_document(&format!("<table>{markup}</table>")));
    }
    rows
}

fn parse_document(document: &Html) -> Vec<RawJudgmentFields> {
    if let Some(table) = document.select(&TABLE).next() {
        let rows = parse_table(table);
        if !rows.is_empty() {
            return rows;
        }
    }
    // The first table can be page chrome; try the named result containers.
    document
        .select(&CONTAINER_TABLES)
        .map(parse_table)
        .find(|rows| !rows.is_empty())
        .unwrap_or_default()
}

fn parse_table(table: ElementRef) -> Vec<RawJudgmentFields> {
    let rows = table_rows(table);
    let skip = usize::from(rows.first().is_some_and(|row| is_header_row(*row)));
    rows.into_iter()
        .skip(skip)
        .enumerate()
        .filter_map(|(i, row)| {
            let cells = child_elements(row, "td");
            let parsed = row_fields(&cells);
            if parsed.is_none() {
                debug!("Row {}: skipped ({} cells)", i + 1, cells.len());
            }
            parsed
        })
        .collect()
}

/// Rows that belong to this table, not to tables nested in its cells.
fn table_rows(table: ElementRef) -> Vec<ElementRef> {
    let mut rows = vec![];
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "tbody" | "tfoot" => rows.extend(child_elements(child, "tr")),
            _ => {}
        }
    }
    rows
}

fn child_elements<'a>(parent: ElementRef<'a>, name: &str) -> Vec<ElementRef<'a>> {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == name)
        .collect()
}

/// A first row of `<th>` cells, or one whose diary and case columns carry
/// no digits and which holds no `dd-mm-yyyy` date, is the column header.
fn is_header_row(row: ElementRef) -> bool {
    if !child_elements(row, "th").is_empty() {
        return true;
    }
    let texts: Vec<String> = child_elements(row, "td").into_iter().map(extract_text).collect();
    let has_digits = |i: usize| {
        texts
            .get(i)
            .is_some_and(|text| text.chars().any(|c| c.is_ascii_digit()))
    };
    let carries_identity = has_digits(Field::DIARY_COLUMN) || has_digits(Field::CASE_COLUMN);
    !carries_identity && !texts.iter().any(|text| DATE.is_match(text))
}

/// Maps cells positionally onto the table columns. Rows with fewer than
/// three cells, or with neither a case number nor a document link, are
/// dropped.
pub fn row_fields(cells: &[ElementRef]) -> Option<RawJudgmentFields> {
    if cells.len() < 3 {
        return None;
    }
    let mut raw = RawJudgmentFields::default();
    for (i, (field, cell)) in Field::TABLE_COLUMNS.iter().zip(cells).enumerate() {
        if i != Field::JUDGMENT_CELL {
            raw.set(*field, extract_text(*cell));
        }
    }

    if let Some(cell) = cells.get(Field::JUDGMENT_CELL) {
        let text = extract_text(*cell);
        match DATE.find(&text) {
            Some(date) => raw.set(Field::JudgmentDate, date.as_str()),
            None => {
                if let Some(first_line) = cell.text().map(str::trim).find(|t| !t.is_empty()) {
                    raw.set(Field::JudgmentDate, first_line);
                }
            }
        }
        for link in document_links(*cell) {
            raw.push_link(link);
        }
    }

    if raw.links.is_empty() {
        if let Some(link) = cells.iter().flat_map(|cell| document_links(*cell)).next() {
            raw.push_link(link);
        }
    }

    raw.is_worth_keeping().then_some(raw)
}

/// Every document link in `cell`, in order, without repeats.
pub fn document_links(cell: ElementRef) -> Vec<String> {
    let mut links: Vec<String> = vec![];
    for anchor in cell.select(&ANCHOR) {
        if let Some(link) = anchor_document_link(anchor) {
            if !links.contains(&link) {
                links.push(link);
            }
        }
    }
    links
}

fn anchor_document_link(anchor: ElementRef) -> Option<String> {
    let href = anchor.value().attr("href").unwrap_or("").trim();
    if !href.is_empty() && !is_placeholder_href(href) && looks_like_document(href) {
        return Some(href.to_string());
    }

    let onclick = anchor.value().attr("onclick").unwrap_or("");
    let lower = onclick.to_lowercase();
    if lower.contains("pdf") || lower.contains("download") {
        let caps = ONCLICK_TARGET.captures(onclick)?;
        let target = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
        if !target.is_empty() {
            return Some(target.to_string());
        }
    }
    None
}

fn looks_like_document(href: &str) -> bool {
    let lower = href.to_lowercase();
    [".pdf", "download", "judgment", "judgement"]
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// `#`, `javascript:` handlers, and bare origins such as
/// `https://api.sci.gov.in/` point at no document.
fn is_placeholder_href(href: &str) -> bool {
    let lower = href.to_lowercase();
    if lower.starts_with('#') || lower.starts_with("javascript:") {
        return true;
    }
    match Url::parse(href) {
        Ok(url) => matches!(url.path(), "" | "/") && url.query().is_none(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JUDGMENT_CELL: &str = r#"
        <td>
          <a target="_blank" href="https://api.sci.gov.in/supremecourt/2011/228/228_2011_Judgement_02-Jan-2024.pdf">02-01-2024(English) <br></a><br/>
          <a target="_blank" href="https://api.sci.gov.in/supremecourt/2011/228/228_2011_Judgement_02-Jan-2024_hindi.pdf">2024 INSC 1(Hindi) <br></a><br/>
          <a target="_blank" href="https://api.sci.gov.in/"></a><br/>
        </td>"#;

    fn results_table(rows: &str) -> String {
        format!(
            "<table><thead><tr><th>S.No</th><th>Diary Number</th><th>Case Number</th></tr></thead>\
             <tbody>{rows}</tbody></table>"
        )
    }

    fn full_row() -> String {
        format!(
            r#"<tr data-diary-no="228/2011">
                <td>1</td><td>228/2011</td><td>C.A. No.-009098-009098 - 2013</td>
                <td class="petitioners"><div>KANWAR RAJ SINGH (D) TH:LRS .</div><div>VS</div><div>GEJO (D) TH:LRS .</div></td>
                <td><p class="respondents"><div>JASPREET GOGIA</div></p></td>
                <td>HON'BLE MR. JUSTICE ABHAY S. OKA<br> HON'BLE MR. JUSTICE UJJAL BHUYAN</td>
                <td>HON'BLE MR. JUSTICE ABHAY S. OKA</td>
                {JUDGMENT_CELL}
            </tr>"#
        )
    }

    #[test]
    fn reads_every_column_and_all_links() {
        let rows = parse_markup(&results_table(&full_row()));
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get(Field::SerialNumber), Some("1"));
        assert_eq!(row.get(Field::DiaryNumber), Some("228/2011"));
        assert_eq!(row.get(Field::CaseNumber), Some("C.A. No.-009098-009098 - 2013"));
        assert_eq!(
            row.get(Field::Parties),
            Some("KANWAR RAJ SINGH (D) TH:LRS . VS GEJO (D) TH:LRS .")
        );
        assert_eq!(row.get(Field::JudgmentBy), Some("HON'BLE MR. JUSTICE ABHAY S. OKA"));
        assert_eq!(row.get(Field::JudgmentDate), Some("02-01-2024"));
        assert_eq!(row.links.len(), 2);
        assert!(row.links[0].ends_with("02-Jan-2024.pdf"));
        assert!(row.links[1].ends_with("_hindi.pdf"));
    }

    #[test]
    fn short_rows_are_skipped() {
        let rows = parse_markup(&results_table(&format!(
            "<tr><td>1</td><td>228/2011</td></tr>{}",
            full_row()
        )));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(Field::SerialNumber), Some("1"));
    }

    #[test]
    fn header_row_written_with_td_is_skipped() {
        let markup = "<table><tr><td>Serial Number</td><td>Diary Number</td><td>Case Number</td></tr>\
                      <tr><td>4</td><td>11/2020</td><td>W.P.(C) No. 7/2020</td></tr></table>";
        let rows = parse_markup(markup);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(Field::CaseNumber), Some("W.P.(C) No. 7/2020"));
        assert!(rows[0].links.is_empty());
    }

    #[test]
    fn abbreviated_td_header_is_not_a_judgment() {
        let markup = "<table><tr><td>Sr.No.</td><td>Diary No.</td><td>Case No.</td><td>Petitioner / Respondent</td>\
                      <td>Advocate</td><td>Bench</td><td>Judge</td><td>Judgment Date</td></tr>\
                      <tr><td>1</td><td>228/2011</td><td>C.A. No.-009098</td><td>A vs B</td>\
                      <td>Adv X</td><td>Bench Y</td><td>Judge Z</td>\
                      <td>02-01-2024 <a href=\"/files/j1.pdf\">English</a></td></tr></table>";
        let rows = parse_markup(markup);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(Field::CaseNumber), Some("C.A. No.-009098"));
        assert_eq!(rows[0].get(Field::JudgmentDate), Some("02-01-2024"));
    }

    #[test]
    fn first_row_with_values_is_data() {
        let markup = "<table><tr><td>1</td><td>n/a</td><td>CA 9/2021</td></tr>\
                      <tr><td>2</td><td>10/2021</td><td>CA 10/2021</td></tr></table>";
        assert_eq!(parse_markup(markup).len(), 2);
    }

    #[test]
    fn rows_without_case_or_link_are_dropped() {
        let markup = "<table><tr><td>1</td><td>2/2020</td><td> </td><td>A vs B</td></tr></table>";
        assert!(parse_markup(markup).is_empty());
    }

    #[test]
    fn bare_rows_fragment_is_read() {
        let rows = parse_markup(&full_row());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].links.len(), 2);
    }

    #[test]
    fn falls_back_to_named_container() {
        let markup = format!(
            "<table><tr><td>menu</td></tr></table><div id=\"cnrresults\">{}</div>",
            results_table(&full_row())
        );
        let rows = parse_markup(&markup);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(Field::DiaryNumber), Some("228/2011"));
    }

    #[test]
    fn onclick_handlers_and_placeholders() {
        let markup = r##"<table><tr><td>1</td><td>5/2019</td><td>SLP 5/2019</td>
            <td></td><td></td><td></td><td></td>
            <td>15-03-2019
              <a href="#" onclick="window.open('/files/order_15.pdf')">view</a>
              <a href="javascript:void(0)" onclick="downloadFile('https://x.test/dl?id=9')">x</a>
              <a href="https://x.test/">home</a>
              <a href="/files/order_15.pdf">again</a>
            </td></tr></table>"##;
        let rows = parse_markup(markup);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(Field::JudgmentDate), Some("15-03-2019"));
        assert_eq!(rows[0].links, vec!["/files/order_15.pdf"]);
    }

    #[test]
    fn link_outside_judgment_cell_is_a_fallback() {
        let markup = r#"<table><tr><td>1</td><td>5/2019</td>
            <td><a href="/download/5_2019">SLP 5/2019</a></td></tr></table>"#;
        let rows = parse_markup(markup);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].links, vec!["/download/5_2019"]);
        assert_eq!(rows[0].get(Field::JudgmentDate), None);
    }

    #[test]
    fn date_falls_back_to_first_text_line() {
        let markup = "<table><tr><td>1</td><td>1/2001</td><td>CA 1/2001</td><td></td>\
                      <td></td><td></td><td></td><td>Reserved<br>pending</td></tr></table>";
        let rows = parse_markup(markup);
        assert_eq!(rows[0].get(Field::JudgmentDate), Some("Reserved"));
    }
}
