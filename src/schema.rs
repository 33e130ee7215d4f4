//! Declarative extraction schema
//!
//! A schema is a tree of properties loaded from JSON. Each property names a
//! selector path relative to its parent node and a value type that decides how
//! the matched nodes are turned into a [`Value`](crate::Value).
//!
//! ```json
//! {
//!   "css": ["table tr"],
//!   "properties": [
//!     {"id": "company", "type": "string", "css": ["td:nth-of-type(1)"]},
//!     {"id": "link", "type": "string", "css": ["a", "href", "/item/(\\d+)"]}
//!   ]
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Value type of a schema property
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum PropertyType {
    Object,
    #[default]
    String,
    LongText,
    Image,
    Integer,
    Array,
    PropertyArray,
    UrlList,
    /// Resolved through the custom type registry
    Custom(String),
}

impl PropertyType {
    pub fn as_str(&self) -> &str {
        match self {
            PropertyType::Object => "object",
            PropertyType::String => "string",
            PropertyType::LongText => "longtext",
            PropertyType::Image => "imageurl",
            PropertyType::Integer => "integer",
            PropertyType::Array => "array",
            PropertyType::PropertyArray => "property_array",
            PropertyType::UrlList => "urllist",
            PropertyType::Custom(name) => name,
        }
    }
}

impl From<&str> for PropertyType {
    fn from(tag: &str) -> Self {
        match tag {
            "object" => PropertyType::Object,
            "string" | "" => PropertyType::String,
            "longtext" => PropertyType::LongText,
            "imageurl" | "image" => PropertyType::Image,
            "integer" => PropertyType::Integer,
            "array" => PropertyType::Array,
            "property_array" => PropertyType::PropertyArray,
            "urllist" => PropertyType::UrlList,
            other => PropertyType::Custom(other.to_string()),
        }
    }
}

impl Serialize for PropertyType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PropertyType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(PropertyType::from(tag.as_str()))
    }
}

/// One node of the schema tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    /// Key under which the value is stored in the parent record
    pub id: String,
    /// `[selector, attribute?, regex?]`
    pub css: Vec<String>,
    /// Path to the next list of urls for `urllist` schemas
    pub next: Vec<String>,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    #[serde(rename = "mergeWithParent")]
    pub merge_with_parent: bool,
    #[serde(rename = "key")]
    pub key_path: Vec<String>,
    #[serde(rename = "val")]
    pub val_path: Vec<String>,
    /// Maximum number of child urls visited by a `urllist` schema, 0 for no limit
    pub limit: usize,
    pub properties: Vec<Schema>,
}

impl Schema {
    /// Load a schema from JSON text
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// Load a schema, logging and returning `None` on malformed input
    pub fn parse(data: &str) -> Option<Self> {
        match Self::from_json(data) {
            Ok(schema) => Some(schema),
            Err(e) => {
                tracing::error!(error = %e, "Unable to load schema");
                None
            }
        }
    }

    /// Selector relative to the parent node; empty means the parent itself
    pub fn selector(&self) -> &str {
        self.css.first().map(String::as_str).unwrap_or("")
    }

    pub fn attribute(&self) -> Option<&str> {
        self.css.get(1).map(String::as_str)
    }

    pub fn pattern(&self) -> Option<&str> {
        self.css.get(2).map(String::as_str)
    }

    pub fn is_url_list(&self) -> bool {
        self.kind == PropertyType::UrlList
    }
}
