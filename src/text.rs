use scraper::{ElementRef, Html};

pub fn extract_text(node: ElementRef) -> String {
    collapse_whitespace(&node.text().collect::<Vec<_>>().join(" "))
}

/// Single-spaces every run of whitespace (including `&nbsp;`) and trims.
pub fn collapse_whitespace(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drops markup, decodes entities, and collapses whitespace.
pub fn strip_html(s: &str) -> String {
    if !s.contains('<') && !s.contains('&') {
        return collapse_whitespace(s);
    }
    let fragment = Html::parse_fragment(s);
    collapse_whitespace(&fragment.root_element().text().collect::<Vec<_>>().join(" "))
}

pub fn looks_like_table(s: &str) -> bool {
    let lower = s.to_lowercase();
    lower.contains("<table") || lower.contains("<tr")
}
