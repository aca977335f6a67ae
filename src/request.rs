//! Inference request parsing.
//!
//! A request is either one JSON object or an array of objects, each mapping
//! feature names to values. The identifier field is split off before the
//! record reaches the pipeline so it can never leak into the features.

use crate::error::ScoringError;
use crate::types::{FeatureValue, Record};
use serde_json::Value;

/// Integral ids below this magnitude are exact in an f64.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// One record of a request with its identifier removed from the features.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifiedRecord {
    pub id: Option<String>,
    pub features: Record,
}

/// Splits requests into identified records.
#[derive(Debug, Clone)]
pub struct RequestParser {
    id_column: String,
}

impl RequestParser {
    pub fn new(id_column: impl Into<String>) -> Self {
        Self {
            id_column: id_column.into(),
        }
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Parse a raw payload. Invalid JSON or a top level that is neither an
    /// object nor an array rejects the whole request; a bad element of an
    /// array only rejects that element.
    pub fn parse(&self, payload: &[u8]) -> Result<Vec<Result<IdentifiedRecord, ScoringError>>, ScoringError> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| ScoringError::MalformedRequest(e.to_string()))?;

        let items = match value {
            Value::Array(items) => items,
            obj @ Value::Object(_) => vec![obj],
            other => {
                return Err(ScoringError::MalformedRequest(format!(
                    "expected an object or an array of objects, got {}",
                    kind_of(&other)
                )))
            }
        };

        Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let features: Record = serde_json::from_value(item)
                    .map_err(|e| ScoringError::MalformedRequest(format!("record {i}: {e}")))?;
                Ok(self.identify(features))
            })
            .collect())
    }

    /// Remove the identifier field from a record.
    pub fn identify(&self, mut features: Record) -> IdentifiedRecord {
        let id = features.remove(&self.id_column).and_then(|v| match v {
            FeatureValue::Missing => None,
            FeatureValue::Number(x) if x.fract() == 0.0 && x.abs() < MAX_EXACT_INTEGER => Some(format!("{}", x as i64)),
            other => Some(other.category_key()),
        });
        IdentifiedRecord { id, features }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new("TransactionID")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(parser: &RequestParser, payload: &[u8]) -> Vec<IdentifiedRecord> {
        parser
            .parse(payload)
            .unwrap()
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_single_object() {
        let parser = RequestParser::default();
        let records = parse_all(
            &parser,
            br#"{"TransactionID": 2987000, "TransactionAmt": 68.5, "card4": "discover"}"#,
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_deref(), Some("2987000"));
        assert!(!records[0].features.contains_key("TransactionID"));
        assert_eq!(records[0].features["TransactionAmt"], FeatureValue::Number(68.5));
    }

    #[test]
    fn test_array_without_ids() {
        let parser = RequestParser::default();
        let records = parse_all(&parser, br#"[{"a": 1}, {"a": null}]"#);

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.id.is_none()));
        assert_eq!(records[1].features["a"], FeatureValue::Missing);
    }

    #[test]
    fn test_malformed_payloads() {
        let parser = RequestParser::default();
        assert!(matches!(parser.parse(b"not json"), Err(ScoringError::MalformedRequest(_))));
        assert!(matches!(parser.parse(b"42"), Err(ScoringError::MalformedRequest(_))));
    }

    #[test]
    fn test_bad_element_only_rejects_itself() {
        let parser = RequestParser::default();
        let outcomes = parser
            .parse(br#"[{"TransactionID": 1, "a": 1}, 3, {"TransactionID": 2, "a": 2}]"#)
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].as_ref().unwrap().id.as_deref(), Some("1"));
        assert!(matches!(&outcomes[1], Err(ScoringError::MalformedRequest(msg)) if msg.starts_with("record 1")));
        assert_eq!(outcomes[2].as_ref().unwrap().id.as_deref(), Some("2"));
    }

    #[test]
    fn test_nested_values_rejected() {
        let parser = RequestParser::default();
        let outcomes = parser.parse(br#"{"a": {"nested": 1}}"#).unwrap();
        assert!(outcomes[0].is_err());
    }

    #[test]
    fn test_large_integral_ids_stay_distinct() {
        let parser = RequestParser::default();
        let small = parser.identify(Record::from([("TransactionID".to_string(), FeatureValue::Number(2987000.0))]));
        let big = parser.identify(Record::from([("TransactionID".to_string(), FeatureValue::Number(1e19))]));
        let bigger = parser.identify(Record::from([("TransactionID".to_string(), FeatureValue::Number(2e19))]));

        assert_eq!(small.id.as_deref(), Some("2987000"));
        assert_ne!(big.id, bigger.id);
        assert_ne!(big.id.as_deref(), Some("9223372036854775807"));
    }
}
