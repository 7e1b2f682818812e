//! Input normalization: coercing heterogeneous batch inputs into an ordered
//! list of text items.
//!
//! Upstream components hand over anything from a full record set to a bare
//! string. Normalization never fails - shapes that carry no text simply
//! yield an empty batch. The only fault in this module is a JSON parse
//! failure in [`RawInput::from_json`], which aborts the batch before
//! dispatch (see [`VolleyError::Normalization`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VolleyError};

/// An ordered set of records, each holding an optional `text` field.
///
/// This is the minimal shape of the upstream record-set object; everything
/// beyond the `records` list is opaque to the normalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSet {
    pub records: Vec<Value>,
}

impl RecordSet {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }
}

/// A raw batch input value, before normalization.
#[derive(Debug, Clone)]
pub enum RawInput {
    /// A record-set object exposing an ordered `records` list.
    Records(RecordSet),
    /// Any other JSON value: a mapping with a `data` or `text` key, an
    /// array, or a scalar.
    Value(Value),
}

impl RawInput {
    /// Parse a raw JSON string into a batch input.
    ///
    /// # Errors
    ///
    /// Returns [`VolleyError::Normalization`] when the string is not valid
    /// JSON. This is the one normalization-level fault: it aborts the batch
    /// before any task is dispatched.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| VolleyError::Normalization(e.to_string()))?;
        Ok(RawInput::Value(value))
    }
}

impl From<Value> for RawInput {
    fn from(value: Value) -> Self {
        RawInput::Value(value)
    }
}

impl From<RecordSet> for RawInput {
    fn from(records: RecordSet) -> Self {
        RawInput::Records(records)
    }
}

impl From<&str> for RawInput {
    fn from(text: &str) -> Self {
        RawInput::Value(Value::String(text.to_string()))
    }
}

impl From<Vec<String>> for RawInput {
    fn from(items: Vec<String>) -> Self {
        RawInput::Value(Value::Array(
            items.into_iter().map(Value::String).collect(),
        ))
    }
}

/// String form of a JSON value: strings verbatim, everything else in its
/// compact serialized form.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Normalize a list of record entries into text items.
///
/// Keyed entries contribute their `text` field, bare strings are kept
/// verbatim, anything else is skipped. One rule for both the record-set and
/// the `data`-key shapes (the upstream implementations disagreed here; see
/// DESIGN.md).
fn collect_text_entries(entries: &[Value]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(fields) => fields.get("text").map(value_to_string),
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

/// Extract text values from a raw batch input.
///
/// Accepted shapes, in precedence order:
/// 1. A record set: each record's `text` field.
/// 2. A mapping with a `data` key holding a list: same rule as (1).
/// 3. A mapping with a `text` key holding a list: entries used verbatim.
/// 4. A list: every element's string form.
/// 5. Anything else: a single-element batch with the scalar's string form.
///
/// Output preserves input order. Never fails - shapes carrying no text
/// yield an empty batch, and records without a `text` field are skipped.
pub fn extract_text_values(input: &RawInput) -> Vec<String> {
    match input {
        RawInput::Records(record_set) => collect_text_entries(&record_set.records),
        RawInput::Value(value) => match value {
            Value::Object(fields) => {
                if let Some(Value::Array(entries)) = fields.get("data") {
                    collect_text_entries(entries)
                } else if let Some(Value::Array(entries)) = fields.get("text") {
                    entries.iter().map(value_to_string).collect()
                } else {
                    // A mapping with neither key carries no text items.
                    Vec::new()
                }
            }
            Value::Array(entries) => entries.iter().map(value_to_string).collect(),
            scalar => vec![value_to_string(scalar)],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_set_with_text_fields() {
        let input = RawInput::from(RecordSet::new(vec![
            json!({"text": "query1"}),
            json!({"text": "query2"}),
        ]));
        assert_eq!(extract_text_values(&input), vec!["query1", "query2"]);
    }

    #[test]
    fn test_record_set_skips_records_without_text() {
        let input = RawInput::from(RecordSet::new(vec![
            json!({"text": "a"}),
            json!({"id": 7}),
            json!({"text": "b"}),
        ]));
        assert_eq!(extract_text_values(&input), vec!["a", "b"]);
    }

    #[test]
    fn test_record_set_keeps_bare_strings() {
        // Unified policy: bare strings survive in both record-list shapes.
        let input = RawInput::from(RecordSet::new(vec![
            json!({"text": "a"}),
            json!("bare"),
        ]));
        assert_eq!(extract_text_values(&input), vec!["a", "bare"]);
    }

    #[test]
    fn test_mapping_with_data_key() {
        let input = RawInput::from(json!({"data": [{"text": "a"}, {"text": "b"}]}));
        assert_eq!(extract_text_values(&input), vec!["a", "b"]);
    }

    #[test]
    fn test_mapping_with_data_key_mixed_content() {
        let input = RawInput::from(json!({"data": [{"text": "a"}, "bare", {"id": 1}]}));
        assert_eq!(extract_text_values(&input), vec!["a", "bare"]);
    }

    #[test]
    fn test_mapping_with_text_key() {
        let input = RawInput::from(json!({"text": ["a", "b"]}));
        assert_eq!(extract_text_values(&input), vec!["a", "b"]);
    }

    #[test]
    fn test_data_key_takes_precedence_when_a_list() {
        let input = RawInput::from(json!({"data": [{"text": "a"}], "text": ["b"]}));
        assert_eq!(extract_text_values(&input), vec!["a"]);
    }

    #[test]
    fn test_non_list_data_key_falls_through_to_text() {
        let input = RawInput::from(json!({"data": 5, "text": ["a"]}));
        assert_eq!(extract_text_values(&input), vec!["a"]);
    }

    #[test]
    fn test_plain_list() {
        let input = RawInput::from(json!(["a", "b"]));
        assert_eq!(extract_text_values(&input), vec!["a", "b"]);
    }

    #[test]
    fn test_list_coerces_non_strings() {
        let input = RawInput::from(json!(["a", 42, true]));
        assert_eq!(extract_text_values(&input), vec!["a", "42", "true"]);
    }

    #[test]
    fn test_scalar_wraps_as_single_item() {
        let input = RawInput::from("a");
        assert_eq!(extract_text_values(&input), vec!["a"]);

        let input = RawInput::from(json!(3.5));
        assert_eq!(extract_text_values(&input), vec!["3.5"]);
    }

    #[test]
    fn test_empty_shapes_yield_empty_batches() {
        assert!(extract_text_values(&RawInput::from(json!({"data": []}))).is_empty());
        assert!(extract_text_values(&RawInput::from(json!({"text": []}))).is_empty());
        assert!(extract_text_values(&RawInput::from(json!([]))).is_empty());
        assert!(extract_text_values(&RawInput::from(RecordSet::default())).is_empty());
        assert!(extract_text_values(&RawInput::from(json!({"other": 1}))).is_empty());
    }

    #[test]
    fn test_from_json_parse_failure_is_normalization_fault() {
        let err = RawInput::from_json("{not json").unwrap_err();
        assert!(matches!(err, VolleyError::Normalization(_)));
    }

    #[test]
    fn test_from_json_round_trip() {
        let input = RawInput::from_json(r#"{"data":[{"text":"a"},{"text":"b"}]}"#).unwrap();
        assert_eq!(extract_text_values(&input), vec!["a", "b"]);
    }
}
