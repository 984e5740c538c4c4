//! Catalog identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a catalog entry.
///
/// Ids that parse as signed integers compare numerically; all other ids
/// compare lexicographically and sort after every numeric id. The derived
/// ordering is what the ranker uses to break ties, so it must stay total.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CatalogId {
    Numeric(i64),
    Text(String),
}

impl CatalogId {
    /// Parses a raw table cell. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(value) => CatalogId::Numeric(value),
            Err(_) => CatalogId::Text(trimmed.to_owned()),
        }
    }

    /// Returns the id as a file-name-safe string (`/`, `\` and `:` become `_`).
    pub fn file_stem(&self) -> String {
        self.to_string().replace(['/', '\\', ':'], "_")
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogId::Numeric(value) => write!(f, "{value}"),
            CatalogId::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for CatalogId {
    fn from(value: i64) -> Self {
        CatalogId::Numeric(value)
    }
}

impl From<&str> for CatalogId {
    fn from(value: &str) -> Self {
        CatalogId::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::CatalogId;

    #[test]
    fn numeric_ids_order_numerically() {
        assert!(CatalogId::parse("9") < CatalogId::parse("10"));
        assert!(CatalogId::parse("-3") < CatalogId::parse("2"));
        assert_eq!(CatalogId::parse(" 42 "), CatalogId::Numeric(42));
    }

    #[test]
    fn text_ids_sort_after_numbers() {
        let text = CatalogId::parse("abc");
        assert!(CatalogId::Numeric(i64::MAX) < text);
        assert!(CatalogId::parse("abc") < CatalogId::parse("abd"));
    }

    #[test]
    fn file_stem_sanitizes_separators() {
        assert_eq!(CatalogId::parse("a/b:c\\d").file_stem(), "a_b_c_d");
        assert_eq!(CatalogId::from(7).file_stem(), "7");
    }
}
