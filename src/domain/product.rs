//! Product record and catalog column schema
//!
//! A product record is a flat mapping of column name to text value.
//! Catalog files carry many more columns than the curation workflow
//! touches, so records keep every field they are given.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column names used by the source catalog files
pub mod columns {
    pub const CODE: &str = "Kat. číslo";
    pub const NAME: &str = "Názov tovaru";
    pub const CATEGORY: &str = "Hlavna kategória";
    pub const SHORT_DESCRIPTION: &str = "Krátky popis";
    pub const LONG_DESCRIPTION: &str = "Dlhý popis";
    pub const SEO_TITLE: &str = "SEO titulka";
    pub const SEO_DESCRIPTION: &str = "SEO popis";
    pub const SEO_KEYWORDS: &str = "SEO kľúčové slová";
    pub const PROCESSED_FLAG: &str = "Spracovane AI";
    pub const PROCESSED_AT: &str = "AI_Processed_Date";

    /// Fields rewritten by the remote enrichment endpoint
    pub const ENRICHED_COLUMNS: [&str; 5] = [
        SHORT_DESCRIPTION,
        LONG_DESCRIPTION,
        SEO_TITLE,
        SEO_DESCRIPTION,
        SEO_KEYWORDS,
    ];

    /// Search-engine fields checked by the SEO preservation filter
    pub const SEO_COLUMNS: [&str; 3] = [SEO_TITLE, SEO_DESCRIPTION, SEO_KEYWORDS];

    /// Fields sent to the remote endpoint for each product
    pub const PAYLOAD_COLUMNS: [&str; 8] = [
        CODE,
        NAME,
        CATEGORY,
        SHORT_DESCRIPTION,
        LONG_DESCRIPTION,
        SEO_TITLE,
        SEO_DESCRIPTION,
        SEO_KEYWORDS,
    ];
}

/// Value written to the processed flag after a successful merge
pub const PROCESSED_TRUE: &str = "TRUE";

/// Timestamp layout for the processed-at column
pub const PROCESSED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Interpret a processed-flag cell.
///
/// Only missing, empty and false-like values mean "needs processing";
/// any other text counts as already processed.
pub fn is_processed_flag(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        Some(v) => !matches!(v.to_lowercase().as_str(), "false" | "0" | "no"),
    }
}

/// A single catalog product
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductRecord {
    fields: BTreeMap<String, String>,
}

impl ProductRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter used mostly by tests and fixtures
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Identity key: catalog code, falling back to name
    pub fn identity(&self) -> Option<String> {
        identity_from(self.get(columns::CODE), self.get(columns::NAME))
    }
}

impl FromIterator<(String, String)> for ProductRecord {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Resolve an identity from code and name cells
pub(crate) fn identity_from(code: Option<&str>, name: Option<&str>) -> Option<String> {
    [code, name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("TRUE"), true)]
    #[case(Some("true"), true)]
    #[case(Some(" 1 "), true)]
    #[case(Some("Yes"), true)]
    #[case(Some("x"), true)]
    #[case(Some("Áno"), true)]
    #[case(Some("1.0"), true)]
    #[case(Some("Processed"), true)]
    #[case(Some("False"), false)]
    #[case(Some(" no "), false)]
    #[case(Some("   "), false)]
    #[case(Some("FALSE"), false)]
    #[case(Some("0"), false)]
    #[case(Some(""), false)]
    #[case(None, false)]
    fn test_processed_flag_literals(#[case] value: Option<&str>, #[case] expected: bool) {
        assert_eq!(is_processed_flag(value), expected);
    }

    #[test]
    fn test_identity_prefers_code() {
        let record = ProductRecord::new()
            .with(columns::CODE, " AB-1 ")
            .with(columns::NAME, "Stolička");
        assert_eq!(record.identity().as_deref(), Some("AB-1"));
    }

    #[test]
    fn test_identity_falls_back_to_name() {
        let record = ProductRecord::new()
            .with(columns::CODE, "  ")
            .with(columns::NAME, "Stolička");
        assert_eq!(record.identity().as_deref(), Some("Stolička"));

        assert_eq!(ProductRecord::new().identity(), None);
    }

    #[test]
    fn test_record_serializes_as_plain_object() {
        let record = ProductRecord::new().with(columns::CODE, "A1");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"Kat. číslo":"A1"}"#);
    }
}
