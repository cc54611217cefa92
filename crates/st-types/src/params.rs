//! Parameter values exchanged between the search strategy and the reviewer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A concrete parameter value produced by a search strategy.
///
/// Integers are tried before floats when deserializing, so a value written as
/// `Int(3)` reads back as `Int(3)` rather than `Float(3.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Json(v) => v.as_f64(),
        }
    }

    /// Convert into a plain JSON value for handing to the reviewer.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Value::from(*v),
            Self::Json(v) => v.clone(),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Json(serde_json::Value::String(v.to_string()))
    }
}

/// One flat parameter set as proposed by the search strategy.
///
/// Ordered so that routing, logging and serialization are deterministic.
pub type ParameterVector = BTreeMap<String, ParameterValue>;

/// Render a parameter vector as `key=value` pairs for log lines.
pub fn display_params(params: &ParameterVector) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_values_keep_their_variant() {
        let mut params = ParameterVector::new();
        params.insert("mdl_C".into(), ParameterValue::Float(2.0));
        params.insert("n_instances".into(), ParameterValue::Int(50));
        params.insert("mdl_kernel".into(), ParameterValue::from("rbf"));

        let json = serde_json::to_string(&params).unwrap();
        let back: ParameterVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn display_is_sorted_by_key() {
        let mut params = ParameterVector::new();
        params.insert("b".into(), ParameterValue::Int(2));
        params.insert("a".into(), ParameterValue::Float(0.5));
        assert_eq!(display_params(&params), "a=0.5 b=2");
    }

    #[test]
    fn numeric_view() {
        assert_eq!(ParameterValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(ParameterValue::from("x").as_f64(), None);
    }
}
