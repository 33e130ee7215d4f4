//! Schema evaluation
//!
//! [`Extractor::evaluate`] maps one schema property onto a parent node. The
//! property's selector is applied first; an empty selector reuses the parent.
//! Selector failures and missing nodes are logged and produce `Value::Null`
//! without affecting sibling properties.

use scraper::Html;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::registry::{self, TypeRegistry};
use super::resolver::{clean_text, resolve, resolve_own_text, strip_invalid};
use super::selection::{parse_selector, Selection};
use crate::schema::{PropertyType, Schema};
use crate::value::{Record, Value};

/// Evaluates schemas against parsed documents
#[derive(Debug, Clone)]
pub struct Extractor {
    registry: Arc<TypeRegistry>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(registry::global())
    }
}

impl Extractor {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// One record per node matching the schema's root selector
    pub fn records(&self, schema: &Schema, document: &Html) -> Vec<Record> {
        root_nodes(schema.selector(), document)
            .each()
            .map(|node| self.record(&schema.properties, &node))
            .collect()
    }

    /// Evaluate every property against `node`. Null values are kept.
    pub fn record(&self, properties: &[Schema], node: &Selection<'_>) -> Record {
        let mut record = Record::new();
        for property in properties {
            merge_property(&mut record, property, self.evaluate(property, node), true);
        }
        record
    }

    /// Like [`record`](Self::record) but leaves out properties that resolved to null
    pub fn nested_record(&self, properties: &[Schema], node: &Selection<'_>) -> Record {
        let mut record = Record::new();
        for property in properties {
            merge_property(&mut record, property, self.evaluate(property, node), false);
        }
        record
    }

    /// Evaluate a single property against its parent node
    pub fn evaluate(&self, schema: &Schema, parent: &Selection<'_>) -> Value {
        if parent.is_empty() {
            return Value::Null;
        }

        let Some(node) = property_node(schema, parent) else {
            return Value::Null;
        };

        match &schema.kind {
            PropertyType::Object => Value::Record(self.record(&schema.properties, &node)),
            PropertyType::String | PropertyType::Image => resolve(&schema.css, &node).into(),
            PropertyType::LongText => long_text(schema, &node).into(),
            PropertyType::Integer => resolve(&schema.css, &node)
                .and_then(|text| parse_integer(&text))
                .into(),
            PropertyType::Array => Value::List(array(schema, &node)),
            PropertyType::PropertyArray => Value::Map(property_array(schema, &node)),
            PropertyType::UrlList | PropertyType::Custom(_) => {
                match self.registry.get(schema.kind.as_str()) {
                    Some(custom) => custom.resolve(schema, &node),
                    None => resolve(&schema.css, &node).into(),
                }
            }
        }
    }
}

/// Nodes matched by a top-level selector; an empty selector yields the root element
pub fn root_nodes<'a>(selector: &str, document: &'a Html) -> Selection<'a> {
    if selector.is_empty() {
        return Selection::root(document);
    }
    match parse_selector(selector) {
        Ok(selector) => Selection::select(document, &selector),
        Err(e) => {
            tracing::error!(css = selector, error = %e, "Unable to compile css path");
            Selection::default()
        }
    }
}

fn property_node<'a>(schema: &Schema, parent: &Selection<'a>) -> Option<Selection<'a>> {
    let css = schema.selector();
    if css.is_empty() {
        return Some(parent.clone());
    }

    let selector = match parse_selector(css) {
        Ok(selector) => selector,
        Err(e) => {
            tracing::error!(id = %schema.id, css, error = %e, "Unable to compile css path");
            return None;
        }
    };

    let node = parent.find(&selector);
    if node.is_empty() {
        tracing::warn!(id = %schema.id, css, "Unable to find property in document");
        return None;
    }
    Some(node)
}

fn merge_property(record: &mut Record, property: &Schema, value: Value, keep_null: bool) {
    match value {
        Value::Record(fields) if property.merge_with_parent => record.extend(fields),
        Value::Null if !keep_null => {}
        value => {
            record.insert(property.id.clone(), value);
        }
    }
}

/// Text or attribute without the capture step. Text keeps its line structure.
fn long_text(schema: &Schema, node: &Selection<'_>) -> Option<String> {
    match schema.attribute().filter(|name| !name.is_empty()) {
        Some(name) => node.attr(name).map(clean_text),
        None => Some(strip_invalid(&node.text()).trim().to_string()),
    }
}

/// Parse extracted text as an integer; anything else is absent
pub fn parse_integer(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

fn array(schema: &Schema, node: &Selection<'_>) -> Vec<String> {
    match schema.attribute().filter(|name| !name.is_empty()) {
        Some(name) => node
            .iter()
            .filter_map(|el| el.value().attr(name))
            .map(clean_text)
            .collect(),
        None => node.each().map(|item| clean_text(&item.text())).collect(),
    }
}

fn property_array(schema: &Schema, node: &Selection<'_>) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();

    for item in node.each() {
        let key = match schema.key_path.first().map(String::as_str) {
            None | Some("") => resolve_own_text(&schema.key_path, &item),
            Some(css) => sub_node(css, &item).and_then(|n| resolve(&schema.key_path, &n)),
        };
        let Some(key) = key.map(|k| normalize_key(&k)).filter(|k| !k.is_empty()) else {
            continue;
        };

        let value = match schema.val_path.first().map(String::as_str) {
            None | Some("") => resolve(&schema.val_path, &item),
            Some(css) => sub_node(css, &item).and_then(|n| resolve(&schema.val_path, &n)),
        };
        let Some(value) = value else {
            continue;
        };
        if value.is_empty() || value.eq_ignore_ascii_case("nil") {
            continue;
        }

        props.insert(key, value);
    }

    props
}

fn sub_node<'a>(css: &str, item: &Selection<'a>) -> Option<Selection<'a>> {
    match parse_selector(css) {
        Ok(selector) => Some(item.find(&selector).first()).filter(|n| !n.is_empty()),
        Err(e) => {
            tracing::error!(css, error = %e, "Unable to compile css path");
            None
        }
    }
}

/// Lower-case a label and fold `,` `.` `:` and spaces into a key
pub fn normalize_key(label: &str) -> String {
    let folded: String = label
        .chars()
        .filter(|c| *c != ',' && *c != '.')
        .map(|c| if c == ':' || c == ' ' { '_' } else { c })
        .collect();
    folded.trim_matches('_').to_lowercase()
}
