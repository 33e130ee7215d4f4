//! Extracted values and records

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// One extracted record, keyed by property id.
pub type Record = HashMap<String, Value>;

/// Result of evaluating a single schema property.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Integer(i64),
    List(Vec<String>),
    Record(Record),
    /// Flattened key/value pairs from a `property_array`
    Map(BTreeMap<String, String>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Convert into a plain JSON value
    pub fn into_json(self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Null => Json::Null,
            Value::Text(s) => Json::String(s),
            Value::Integer(i) => Json::from(i),
            Value::List(items) => Json::Array(items.into_iter().map(Json::String).collect()),
            Value::Record(r) => record_to_json(r),
            Value::Map(m) => Json::Object(
                m.into_iter()
                    .map(|(k, v)| (k, Json::String(v)))
                    .collect(),
            ),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Convert a record into a JSON object
pub fn record_to_json(record: Record) -> serde_json::Value {
    serde_json::Value::Object(
        record
            .into_iter()
            .map(|(k, v)| (k, v.into_json()))
            .collect(),
    )
}
