use std::collections::BTreeMap;

use serde::Serialize;

/// Scalar columns of a judgment listing, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    SerialNumber,
    DiaryNumber,
    CaseNumber,
    Parties,
    Advocate,
    Bench,
    JudgmentBy,
    JudgmentDate,
}

impl Field {
    /// Column position in the results table.
    pub const TABLE_COLUMNS: [Field; 8] = [
        Field::SerialNumber,
        Field::DiaryNumber,
        Field::CaseNumber,
        Field::Parties,
        Field::Advocate,
        Field::Bench,
        Field::JudgmentBy,
        Field::JudgmentDate,
    ];

    pub const DIARY_COLUMN: usize = 1;
    pub const CASE_COLUMN: usize = 2;

    /// Index of the column holding the judgment date and document links.
    pub const JUDGMENT_CELL: usize = 7;
}

/// Where a JSON key lands in [`RawJudgmentFields`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Scalar(Field),
    Link,
}

/// JSON key aliases, checked in order; the first non-empty alias wins.
pub const JSON_ALIASES: &[(Target, &[&str])] = &[
    (
        Target::Scalar(Field::SerialNumber),
        &["serial", "serial_no", "serial_number", "sno", "id", "index"],
    ),
    (
        Target::Scalar(Field::DiaryNumber),
        &["diary", "diary_no", "diary_number", "diaryNumber"],
    ),
    (
        Target::Scalar(Field::CaseNumber),
        &["case", "case_no", "case_number", "caseNumber"],
    ),
    (
        Target::Scalar(Field::Parties),
        &["parties", "petitioner_respondent", "case_title", "petitioner", "respondent"],
    ),
    (Target::Scalar(Field::Advocate), &["advocate", "lawyer", "counsel"]),
    (Target::Scalar(Field::Bench), &["bench", "coram"]),
    (
        Target::Scalar(Field::JudgmentBy),
        &["judgment_by", "judgmentBy", "judge"],
    ),
    (
        Target::Scalar(Field::JudgmentDate),
        &["date", "judgment_date", "judgmentDate", "decided_on"],
    ),
    (
        Target::Link,
        &["judgment_links", "pdf_links", "link", "url", "pdf", "download", "file_url"],
    ),
];

/// Whatever one extractor managed to read for one judgment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawJudgmentFields {
    pub scalars: BTreeMap<Field, String>,
    pub links: Vec<String>,
}

impl RawJudgmentFields {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.scalars.get(&field).map(String::as_str)
    }

    /// Stores trimmed, non-empty values only.
    pub fn set(&mut self, field: Field, value: impl AsRef<str>) {
        let value = value.as_ref().trim();
        if !value.is_empty() {
            self.scalars.insert(field, value.to_string());
        }
    }

    /// Appends a link unless it is blank or already present.
    pub fn push_link(&mut self, link: impl AsRef<str>) {
        let link = link.as_ref().trim();
        if !link.is_empty() && !self.links.iter().any(|l| l == link) {
            self.links.push(link.to_string());
        }
    }

    pub fn has_case_number(&self) -> bool {
        self.get(Field::CaseNumber).is_some()
    }

    /// Extractors keep a row only if it names a case or links a document.
    pub fn is_worth_keeping(&self) -> bool {
        self.has_case_number() || !self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_field_has_json_aliases() {
        for field in Field::TABLE_COLUMNS {
            assert!(
                JSON_ALIASES
                    .iter()
                    .any(|(target, _)| *target == Target::Scalar(field)),
                "{field:?} has no aliases"
            );
        }
    }

    #[test]
    fn blank_values_and_repeat_links_are_ignored() {
        let mut raw = RawJudgmentFields::default();
        raw.set(Field::CaseNumber, "   ");
        raw.push_link("a.pdf");
        raw.push_link(" a.pdf ");
        raw.push_link("");
        assert!(!raw.has_case_number());
        assert_eq!(raw.links, vec!["a.pdf"]);
        assert!(raw.is_worth_keeping());
    }
}
