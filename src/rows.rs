//! Result rows and their JSON normalization
//!
//! Cells arrive typed. Anything strict JSON cannot carry faithfully is
//! replaced with its text form before the row leaves the gateway. The
//! coercion is lossy: a timestamp comes back as a string, not a timestamp.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use std::fmt;

/// A single typed cell
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact decimal kept as its literal text
    Numeric(String),
    String(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
    Array(Vec<FieldValue>),
    Record(Vec<(String, FieldValue)>),
}

impl FieldValue {
    /// Whether the value maps onto JSON without losing its type
    pub fn is_json_representable(&self) -> bool {
        match self {
            FieldValue::Null | FieldValue::Bool(_) | FieldValue::Int(_) | FieldValue::String(_) => {
                true
            }
            FieldValue::Float(f) => f.is_finite(),
            FieldValue::Array(items) => items.iter().all(FieldValue::is_json_representable),
            FieldValue::Record(fields) => fields.iter().all(|(_, v)| v.is_json_representable()),
            FieldValue::Numeric(_)
            | FieldValue::Timestamp(_)
            | FieldValue::Date(_)
            | FieldValue::Time(_)
            | FieldValue::DateTime(_)
            | FieldValue::Bytes(_) => false,
        }
    }

    /// Replace a non-representable value with its text form
    pub fn normalize(self) -> FieldValue {
        if self.is_json_representable() {
            self
        } else {
            FieldValue::String(self.to_string())
        }
    }

    /// Convert to JSON, coercing anything non-representable to text
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::Number((*i).into()),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(self.to_string())),
            FieldValue::Array(items) if self.is_json_representable() => {
                Value::Array(items.iter().map(FieldValue::to_json).collect())
            }
            FieldValue::Record(fields) if self.is_json_representable() => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
            _ => Value::String(self.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Numeric(s) | FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Timestamp(ts) => {
                write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            FieldValue::Bytes(bytes) => write!(f, "{}", BASE64.encode(bytes)),
            FieldValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            FieldValue::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// One result row: field names in schema order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub fields: Vec<(String, FieldValue)>,
}

impl Row {
    pub fn new(fields: Vec<(String, FieldValue)>) -> Self {
        Self { fields }
    }

    /// Look up a field by name
    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Coerce every non-representable value to text
    pub fn normalize(self) -> Row {
        Row {
            fields: self
                .fields
                .into_iter()
                .map(|(name, value)| (name, value.normalize()))
                .collect(),
        }
    }

    /// Convert to an order-preserving JSON object
    pub fn to_json(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }
}
