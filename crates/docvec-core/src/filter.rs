//! Structured metadata filters.
//!
//! A [`Filter`] is a small expression tree over string-valued metadata
//! fields. It serializes to JSON (tagged by `op`) so it can travel to a
//! remote store, and each store either evaluates it in process
//! ([`Filter::matches`]) or translates it into its own query language.
//!
//! ```rust
//! use docvec_core::filter::Filter;
//!
//! let f: Filter = "filename~Berkshire".parse().unwrap();
//! assert_eq!(f, Filter::contains("filename", "Berkshire"));
//!
//! let json = serde_json::to_string(&f).unwrap();
//! assert_eq!(json, r#"{"op":"contains","field":"filename","value":"Berkshire"}"#);
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::RecordMetadata;

/// A predicate over [`RecordMetadata`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    /// Exact equality: `field == value`.
    Eq { field: String, value: String },
    /// Substring match: `field` contains `value`.
    Contains { field: String, value: String },
    /// Prefix match.
    StartsWith { field: String, value: String },
    /// `field` equals one of `values`.
    In { field: String, values: Vec<String> },
    /// All sub-filters match. An empty list matches everything.
    And { filters: Vec<Filter> },
    /// Any sub-filter matches. An empty list matches nothing.
    Or { filters: Vec<Filter> },
    Not { filter: Box<Filter> },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::StartsWith {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Evaluate against one record's metadata.
    ///
    /// A field the record does not have never matches a leaf condition.
    pub fn matches(&self, meta: &RecordMetadata) -> bool {
        match self {
            Filter::Eq { field, value } => meta.field(field).is_some_and(|v| v == value.as_str()),
            Filter::Contains { field, value } => {
                meta.field(field).is_some_and(|v| v.contains(value.as_str()))
            }
            Filter::StartsWith { field, value } => {
                meta.field(field).is_some_and(|v| v.starts_with(value.as_str()))
            }
            Filter::In { field, values } => meta
                .field(field)
                .is_some_and(|v| values.iter().any(|x| x == v.as_ref())),
            Filter::And { filters } => filters.iter().all(|f| f.matches(meta)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(meta)),
            Filter::Not { filter } => !filter.matches(meta),
        }
    }

    /// Reject field names that are not `[A-Za-z0-9_]+`.
    ///
    /// Stores splice field names into query paths, so every filter is
    /// validated before it reaches one.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Filter::Eq { field, .. }
            | Filter::Contains { field, .. }
            | Filter::StartsWith { field, .. }
            | Filter::In { field, .. } => {
                if is_valid_field(field) {
                    Ok(())
                } else {
                    Err(Error::Configuration(format!(
                        "invalid filter field name: '{}'",
                        field
                    )))
                }
            }
            Filter::And { filters } | Filter::Or { filters } => {
                filters.iter().try_for_each(Filter::validate)
            }
            Filter::Not { filter } => filter.validate(),
        }
    }
}

/// Whether `name` is usable as a metadata field in a filter.
pub fn is_valid_field(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses the CLI shorthand `field=value`, `field~value` (contains)
/// or `field^value` (starts with).
impl FromStr for Filter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pos = s.find(['=', '~', '^']).ok_or_else(|| {
            Error::Configuration(format!(
                "invalid filter '{}': expected field=value, field~value or field^value",
                s
            ))
        })?;
        let field = s[..pos].trim();
        let value = &s[pos + 1..];
        let filter = match &s[pos..pos + 1] {
            "=" => Filter::eq(field, value),
            "~" => Filter::contains(field, value),
            _ => Filter::starts_with(field, value),
        };
        filter.validate()?;
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn meta(filename: &str, seq: usize) -> RecordMetadata {
        let mut extra = BTreeMap::new();
        extra.insert("year".to_string(), "1999".to_string());
        RecordMetadata {
            source_id: format!("letters/{}", filename),
            filename: filename.to_string(),
            sequence_index: seq,
            char_offset: seq * 462,
            content: "Our float grew again.".to_string(),
            content_hash: "abc".to_string(),
            embedding_model: "test".to_string(),
            ingested_at: "2026-01-01T00:00:00Z".to_string(),
            extra,
        }
    }

    #[test]
    fn test_leaf_conditions() {
        let m = meta("Berkshire-1999.pdf", 3);
        assert!(Filter::contains("filename", "Berkshire").matches(&m));
        assert!(!Filter::contains("filename", "berkshire").matches(&m));
        assert!(Filter::eq("sequence_index", "3").matches(&m));
        assert!(Filter::starts_with("source_id", "letters/").matches(&m));
        assert!(Filter::eq("year", "1999").matches(&m));
        assert!(Filter::In {
            field: "year".into(),
            values: vec!["1998".into(), "1999".into()]
        }
        .matches(&m));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let m = meta("a.pdf", 0);
        assert!(!Filter::eq("author", "").matches(&m));
        assert!(Filter::Not {
            filter: Box::new(Filter::eq("author", "x"))
        }
        .matches(&m));
    }

    #[test]
    fn test_boolean_combinators() {
        let m = meta("Berkshire-2001.pdf", 0);
        let both = Filter::And {
            filters: vec![
                Filter::contains("filename", "Berkshire"),
                Filter::eq("year", "1999"),
            ],
        };
        assert!(both.matches(&m));
        assert!(Filter::And { filters: vec![] }.matches(&m));
        assert!(!Filter::Or { filters: vec![] }.matches(&m));
        let either = Filter::Or {
            filters: vec![Filter::eq("filename", "nope"), Filter::eq("year", "1999")],
        };
        assert!(either.matches(&m));
    }

    #[test]
    fn test_parse_shorthand() {
        assert_eq!(
            "filename=a.pdf".parse::<Filter>().unwrap(),
            Filter::eq("filename", "a.pdf")
        );
        assert_eq!(
            "source_id^letters/".parse::<Filter>().unwrap(),
            Filter::starts_with("source_id", "letters/")
        );
        // Only the first operator splits; the rest belongs to the value.
        assert_eq!(
            "content~a=b".parse::<Filter>().unwrap(),
            Filter::contains("content", "a=b")
        );
        assert!("no operator".parse::<Filter>().is_err());
        assert!("bad field=1".parse::<Filter>().is_err());
        assert!("=value".parse::<Filter>().is_err());
    }

    #[test]
    fn test_json_roundtrip_nested() {
        let f = Filter::Not {
            filter: Box::new(Filter::Or {
                filters: vec![Filter::eq("year", "1999")],
            }),
        };
        let json = serde_json::to_string(&f).unwrap();
        let back: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
        let parsed: Filter =
            serde_json::from_str(r#"{"op":"starts_with","field":"filename","value":"B"}"#).unwrap();
        assert_eq!(parsed, Filter::starts_with("filename", "B"));
    }

    #[test]
    fn test_validate_nested_field_names() {
        let f = Filter::And {
            filters: vec![Filter::eq("ok_field", "1"), Filter::eq("$.evil", "1")],
        };
        assert!(matches!(f.validate(), Err(Error::Configuration(_))));
    }
}
