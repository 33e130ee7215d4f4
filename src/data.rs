//! Path-addressable views over fetched payloads
//!
//! Pagination strategies only ever ask a payload for "the value at this path",
//! which keeps them independent of the payload format.

use scraper::Html;
use serde_json::Value as Json;

use crate::extractors::{clean_text, parse_selector};

/// Value read from a [`Data`] payload
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Json(Json),
    Bytes(Vec<u8>),
    Text(String),
}

impl DataValue {
    pub fn as_json(&self) -> Option<&Json> {
        match self {
            DataValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_json(self) -> Json {
        match self {
            DataValue::Json(v) => v,
            DataValue::Bytes(b) => Json::String(String::from_utf8_lossy(&b).into_owned()),
            DataValue::Text(s) => Json::String(s),
        }
    }
}

/// A parsed page payload
pub trait Data {
    /// Value at `path`; the empty path addresses the whole payload
    fn get(&self, path: &str) -> Option<DataValue>;
}

/// Raw payload that answers every path with the original bytes
#[derive(Debug, Clone)]
pub struct EchoData {
    data: Vec<u8>,
}

impl EchoData {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl Data for EchoData {
    fn get(&self, _path: &str) -> Option<DataValue> {
        Some(DataValue::Bytes(self.data.clone()))
    }
}

/// JSON payload addressed with dotted paths such as `data.items.0.name`
#[derive(Debug, Clone)]
pub struct JsonData {
    root: Json,
}

impl JsonData {
    pub fn new(root: Json) -> Self {
        Self { root }
    }

    pub fn parse(data: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_slice(data)?))
    }
}

impl Data for JsonData {
    fn get(&self, path: &str) -> Option<DataValue> {
        lookup(&self.root, path)
            .filter(|v| !v.is_null())
            .cloned()
            .map(DataValue::Json)
    }
}

/// Follow a dotted path through objects and arrays
pub fn lookup<'a>(value: &'a Json, path: &str) -> Option<&'a Json> {
    if path.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Json::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => current.get(segment)?,
        };
    }
    Some(current)
}

/// HTML payload addressed with CSS selectors
#[derive(Debug)]
pub struct HtmlData {
    html: Html,
}

impl HtmlData {
    pub fn new(html: Html) -> Self {
        Self { html }
    }

    pub fn parse(data: &[u8]) -> Self {
        Self::new(Html::parse_document(&String::from_utf8_lossy(data)))
    }
}

impl Data for HtmlData {
    /// Cleaned text of the first node matching `path`
    fn get(&self, path: &str) -> Option<DataValue> {
        if path.is_empty() {
            let text = self.html.root_element().text().collect::<String>();
            return Some(DataValue::Text(clean_text(&text)));
        }

        let selector = match parse_selector(path) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(css = path, error = %e, "Unable to compile css path");
                return None;
            }
        };
        let element = self.html.select(&selector).next()?;
        Some(DataValue::Text(clean_text(
            &element.text().collect::<String>(),
        )))
    }
}
