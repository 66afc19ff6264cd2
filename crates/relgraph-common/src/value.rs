//! Scalar property coercion.
//!
//! Row values arriving from the source database, and properties flowing
//! into the graph store, come in arbitrary scalar and blob shapes. The
//! graph store only accepts scalars. `Property` is the single sum type
//! every boundary converts through.

use std::collections::BTreeMap;
use std::fmt;

/// Maximum string length before truncation.
pub const DEFAULT_STRING_CAP: usize = 10_000;

/// A coerced scalar graph property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Property {
    /// Stringifies the value the way relationship-endpoint key comparison
    /// requires: keys are compared as strings after byte-array-to-string
    /// normalization.
    pub fn as_key_string(&self) -> String {
        match self {
            Property::Null => String::new(),
            Property::Bool(b) => b.to_string(),
            Property::Int(i) => i.to_string(),
            Property::Float(f) => f.to_string(),
            Property::Str(s) => s.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Property::Null)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_key_string())
    }
}

impl From<bool> for Property {
    fn from(v: bool) -> Self {
        Property::Bool(v)
    }
}
impl From<i64> for Property {
    fn from(v: i64) -> Self {
        Property::Int(v)
    }
}
impl From<f64> for Property {
    fn from(v: f64) -> Self {
        Property::Float(v)
    }
}
impl From<String> for Property {
    fn from(v: String) -> Self {
        Property::Str(v)
    }
}
impl From<&str> for Property {
    fn from(v: &str) -> Self {
        Property::Str(v.to_string())
    }
}

/// An uncoerced value as it arrives from a row extraction or a rule input
/// map. `Map` and `Bytes` both require coercion before they can become a
/// `Property`; every other variant maps onto `Property` directly.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Map(BTreeMap<String, RawValue>),
    List(Vec<RawValue>),
}

/// Outcome of coercing a single `RawValue`, including whether truncation
/// happened (so callers can log a warning without re-deriving it).
pub struct Coerced {
    pub value: Property,
    pub truncated: bool,
}

/// Coerces a raw row/rule value into a `Property`: bytes become UTF-8
/// strings (lossily, if necessary), strings longer than
/// `cap` are truncated, maps/lists are serialized to JSON strings, and
/// everything else passes through as its matching scalar.
pub fn coerce(raw: &RawValue, cap: usize) -> Coerced {
    match raw {
        RawValue::Null => Coerced {
            value: Property::Null,
            truncated: false,
        },
        RawValue::Bool(b) => Coerced {
            value: Property::Bool(*b),
            truncated: false,
        },
        RawValue::Int(i) => Coerced {
            value: Property::Int(*i),
            truncated: false,
        },
        RawValue::Float(f) => Coerced {
            value: Property::Float(*f),
            truncated: false,
        },
        RawValue::Str(s) => truncate(s, cap),
        RawValue::Bytes(b) => {
            let s = String::from_utf8_lossy(b).into_owned();
            truncate(&s, cap)
        }
        RawValue::Map(_) | RawValue::List(_) => {
            let json = raw_to_json(raw);
            let s = serde_json::to_string(&json).unwrap_or_default();
            truncate(&s, cap)
        }
    }
}

fn truncate(s: &str, cap: usize) -> Coerced {
    if s.chars().count() > cap {
        let truncated: String = s.chars().take(cap).collect();
        Coerced {
            value: Property::Str(truncated),
            truncated: true,
        }
    } else {
        Coerced {
            value: Property::Str(s.to_string()),
            truncated: false,
        }
    }
}

fn raw_to_json(raw: &RawValue) -> serde_json::Value {
    match raw {
        RawValue::Null => serde_json::Value::Null,
        RawValue::Bool(b) => serde_json::Value::Bool(*b),
        RawValue::Int(i) => serde_json::Value::from(*i),
        RawValue::Float(f) => serde_json::json!(f),
        RawValue::Str(s) => serde_json::Value::String(s.clone()),
        RawValue::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
        RawValue::Map(m) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in m {
                obj.insert(k.clone(), raw_to_json(v));
            }
            serde_json::Value::Object(obj)
        }
        RawValue::List(l) => serde_json::Value::Array(l.iter().map(raw_to_json).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_become_utf8_string() {
        let raw = RawValue::Bytes(b"hello".to_vec());
        let c = coerce(&raw, DEFAULT_STRING_CAP);
        assert_eq!(c.value, Property::Str("hello".to_string()));
        assert!(!c.truncated);
    }

    #[test]
    fn long_string_is_truncated_with_flag() {
        let long = "a".repeat(20);
        let c = coerce(&RawValue::Str(long), 10);
        assert_eq!(c.value.as_key_string().len(), 10);
        assert!(c.truncated);
    }

    #[test]
    fn nested_map_serializes_to_json_string() {
        let mut m = BTreeMap::new();
        m.insert("k".to_string(), RawValue::Str("v".to_string()));
        let c = coerce(&RawValue::Map(m), DEFAULT_STRING_CAP);
        assert_eq!(c.value, Property::Str(r#"{"k":"v"}"#.to_string()));
    }

    #[test]
    fn mixed_int_map_bytes_coercion() {
        // mixed int/map/bytes coercion in one property set
        let id = coerce(&RawValue::Int(7), DEFAULT_STRING_CAP).value;
        assert_eq!(id.as_key_string(), "7");

        let mut payload_map = BTreeMap::new();
        payload_map.insert("k".to_string(), RawValue::Str("v".to_string()));
        let payload = coerce(&RawValue::Map(payload_map), DEFAULT_STRING_CAP).value;
        assert_eq!(payload, Property::Str(r#"{"k":"v"}"#.to_string()));

        let raw = coerce(&RawValue::Bytes(b"hello".to_vec()), DEFAULT_STRING_CAP).value;
        assert_eq!(raw, Property::Str("hello".to_string()));
    }

    #[test]
    fn key_string_normalizes_bool_and_numbers() {
        assert_eq!(Property::Bool(true).as_key_string(), "true");
        assert_eq!(Property::Int(42).as_key_string(), "42");
        assert_eq!(Property::Null.as_key_string(), "");
    }
}
