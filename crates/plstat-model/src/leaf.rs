use serde::{Deserialize, Serialize};

use crate::scalar::Scalar;

/// The payload of a leaf: one scalar or a flat list of scalars.
///
/// Lists carry per-channel measurements (cube statistics); scalars carry
/// everything else. A `Value` never nests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl Value {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Scalar]> {
        match self {
            Self::List(l) => Some(l),
            Self::Scalar(_) => None,
        }
    }

    /// Numeric view of a scalar payload.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().and_then(Scalar::as_f64)
    }

    /// String view of a scalar payload.
    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    /// Number of elements: 1 for a scalar, list length otherwise.
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::List(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::List(l) if l.is_empty())
    }
}

/// The terminal node of a record: a value plus an optional unit.
///
/// A `LeafValue` is never a container of further leaves; the `value` field
/// is what distinguishes a leaf from a nested group when sampling keywords.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeafValue {
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl LeafValue {
    pub fn new(value: Value) -> Self {
        Self { value, unit: None }
    }

    pub fn with_unit(value: Value, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: Some(unit.into()),
        }
    }

    pub fn str(s: impl Into<String>) -> Self {
        Self::new(Value::Scalar(Scalar::Str(s.into())))
    }

    pub fn int(i: i64) -> Self {
        Self::new(Value::Scalar(Scalar::Int(i)))
    }

    pub fn float(f: f64) -> Self {
        Self::new(Value::Scalar(Scalar::Float(f)))
    }

    pub fn list(items: impl IntoIterator<Item = Scalar>) -> Self {
        Self::new(Value::List(items.into_iter().collect()))
    }

    /// String-list view, used for flag lists.
    pub fn str_list(items: impl IntoIterator<Item = String>) -> Self {
        Self::list(items.into_iter().map(Scalar::Str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_parses_from_stats_json() {
        let leaf: LeafValue = serde_json::from_str(r#"{"value": 0.123, "unit": "Jy"}"#).unwrap();
        assert_eq!(leaf.value.as_f64(), Some(0.123));
        assert_eq!(leaf.unit.as_deref(), Some("Jy"));
    }

    #[test]
    fn leaf_without_unit_omits_it() {
        let leaf = LeafValue::int(4);
        let json = serde_json::to_string(&leaf).unwrap();
        assert_eq!(json, r#"{"value":4}"#);
    }

    #[test]
    fn list_payload_roundtrip() {
        let leaf = LeafValue::list([Scalar::Float(0.001), Scalar::Float(0.002)]);
        let json = serde_json::to_string(&leaf).unwrap();
        let parsed: LeafValue = serde_json::from_str(&json).unwrap();
        assert_eq!(leaf, parsed);
        assert_eq!(parsed.value.len(), 2);
    }

    #[test]
    fn unknown_sibling_key_is_rejected() {
        // A mapping with extra keys next to `value` is a group, not a leaf.
        let res: Result<LeafValue, _> =
            serde_json::from_str(r#"{"value": 1, "sibling": 2}"#);
        assert!(res.is_err());
    }

    #[test]
    fn empty_list_is_empty() {
        let leaf = LeafValue::list([]);
        assert!(leaf.value.is_empty());
        assert!(!LeafValue::int(0).value.is_empty());
    }
}
