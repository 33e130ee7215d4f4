//! Next-url templates
//!
//! Handlebars templates rendered with `url` (the last url) and `data` (the
//! parsed payload) in scope. Helpers:
//!
//! - `param url "p"` reads a query parameter, empty when absent
//! - `add a b` adds numbers or numeric strings; anything else counts as 0
//! - `set_params url "k" v ...` sets or replaces query parameters
//!
//! ```text
//! {{set_params url "p" (add (param url "p") 1)}}
//! ```
//!
//! An empty rendering means there is no next page.

use handlebars::{handlebars_helper, no_escape, Handlebars};
use serde_json::{json, Value as Json};
use url::Url;

use crate::data::{Data, DataValue};
use crate::error::{Result, ScrapeError};

const TEMPLATE_NAME: &str = "next_url";

handlebars_helper!(param: |url: str, key: str| query_param(url, key).unwrap_or_default());
handlebars_helper!(add: |a: Json, b: Json| to_int(a) + to_int(b));
handlebars_helper!(set_params: |*args| set_query(&args));

/// Compiled next-url template
pub struct NextUrlTemplate {
    registry: Handlebars<'static>,
}

impl NextUrlTemplate {
    pub fn new(template: &str) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(no_escape);
        registry.register_helper("param", Box::new(param));
        registry.register_helper("add", Box::new(add));
        registry.register_helper("set_params", Box::new(set_params));
        registry
            .register_template_string(TEMPLATE_NAME, template)
            .map_err(|e| ScrapeError::Template(e.to_string()))?;
        Ok(Self { registry })
    }

    /// Render the next url, or `NoNextUrl` when the template renders empty
    pub fn render(&self, last_url: &Url, data: &dyn Data) -> Result<String> {
        let context = json!({
            "url": last_url.as_str(),
            "data": data.get("").map(DataValue::into_json).unwrap_or(Json::Null),
        });
        let rendered = self
            .registry
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| ScrapeError::Template(e.to_string()))?;

        let next = rendered.trim();
        if next.is_empty() {
            return Err(ScrapeError::NoNextUrl);
        }
        Ok(next.to_string())
    }
}

impl std::fmt::Debug for NextUrlTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextUrlTemplate").finish_non_exhaustive()
    }
}

fn query_param(url: &str, key: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn to_int(value: &Json) -> i64 {
    match value {
        Json::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Json::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn to_param(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}

/// `args[0]` is the url, followed by key/value pairs
fn set_query(args: &[&Json]) -> String {
    let Some(base) = args.first().map(|v| to_param(v)) else {
        return String::new();
    };
    let mut url = match Url::parse(&base) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(url = %base, error = %e, "set_params called with an invalid url");
            return base;
        }
    };

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    for pair in args[1..].chunks(2) {
        let key = to_param(pair[0]);
        let value = pair.get(1).map(|v| to_param(v)).unwrap_or_default();

        let mut found = false;
        pairs.retain_mut(|(k, v)| {
            if *k != key {
                return true;
            }
            if found {
                return false;
            }
            found = true;
            *v = value.clone();
            true
        });
        if !found {
            pairs.push((key, value));
        }
    }

    url.query_pairs_mut().clear().extend_pairs(pairs.iter());
    url.to_string()
}
