use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A single harvested mark. The portal mostly emits numbers, but absence codes
/// such as `"AB"` come through as text and are kept verbatim.
///
/// Whole numbers serialize as JSON integers (`12`, not `12.0`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MarkValue {
    Number(f64),
    Text(String),
}

impl MarkValue {
    /// Numeric reading of a token, or `None` when it is not a finite number.
    pub fn parse_numeric(raw: &str) -> Option<f64> {
        let t = raw.trim();
        if t.is_empty() {
            return None;
        }
        t.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Number when the text parses as one, text otherwise.
    pub fn from_text(raw: &str) -> MarkValue {
        match MarkValue::parse_numeric(raw) {
            Some(v) => MarkValue::Number(v),
            None => MarkValue::Text(raw.to_string()),
        }
    }

    /// Integer form of a whole number small enough to round-trip through f64.
    pub fn as_whole(&self) -> Option<i64> {
        match self {
            MarkValue::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MarkValue::Number(v) => Some(*v),
            MarkValue::Text(s) => MarkValue::parse_numeric(s),
        }
    }

    /// Numeric equality when both sides read as numbers, exact text otherwise.
    pub fn same_as(&self, other: &MarkValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.to_string() == other.to_string(),
            _ => false,
        }
    }
}

impl Serialize for MarkValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(n) = self.as_whole() {
            return serializer.serialize_i64(n);
        }
        match self {
            MarkValue::Number(v) => serializer.serialize_f64(*v),
            MarkValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl fmt::Display for MarkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(n) = self.as_whole() {
            return write!(f, "{}", n);
        }
        match self {
            MarkValue::Number(v) => write!(f, "{}", v),
            MarkValue::Text(s) => f.write_str(s),
        }
    }
}

/// Optional-value equality used by the diff: null only equals null.
pub fn same_optional(a: Option<&MarkValue>, b: Option<&MarkValue>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_as(b),
        (None, None) => true,
        _ => false,
    }
}

pub fn display_optional(v: Option<&MarkValue>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "null".to_string())
}
