//! Selector path resolution
//!
//! A selector path is `[selector, attribute?, regex?]`. The selector has already
//! been applied by the caller; this module reads the text or attribute of the
//! resulting nodes, cleans it and applies the optional capture pattern. Patterns
//! see whitespace collapsed to single spaces.

use regex::Regex;

use super::selection::Selection;

/// Resolve `path` against `node`.
///
/// Returns `None` when the named attribute is missing. An empty attribute
/// name reads the node text, so `["h1", "", "(\\d+)"]` captures from text.
pub fn resolve(path: &[String], node: &Selection<'_>) -> Option<String> {
    resolve_with(path, || node.text(), |name| node.attr(name).map(String::from))
}

/// Like [`resolve`] but reads the first node's own text, ignoring child elements
pub fn resolve_own_text(path: &[String], node: &Selection<'_>) -> Option<String> {
    resolve_with(path, || node.own_text(), |name| node.attr(name).map(String::from))
}

fn resolve_with(
    path: &[String],
    text: impl FnOnce() -> String,
    attr: impl FnOnce(&str) -> Option<String>,
) -> Option<String> {
    let raw = match path.get(1).filter(|name| !name.is_empty()) {
        Some(name) => attr(name)?,
        None => text(),
    };

    let cleaned = clean_text(&raw);
    match path.get(2).filter(|pattern| !pattern.is_empty()) {
        Some(pattern) => Some(clean_text(&capture(pattern, &cleaned))),
        None => Some(cleaned),
    }
}

/// First capture group of `pattern` in `value`, or `value` unchanged
pub fn capture(pattern: &str, value: &str) -> String {
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(pattern, error = %e, "Invalid capture pattern");
            return value.to_string();
        }
    };

    re.captures(value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| value.to_string())
}

/// Collapse whitespace runs to single spaces, trim, and drop invalid characters
pub fn clean_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for word in strip_invalid(value).split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Remove replacement characters and non-whitespace control characters
pub fn strip_invalid(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER && !(c.is_control() && !c.is_whitespace()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Example \n\t Domain  "), "Example Domain");
        assert_eq!(clean_text("bad\u{FFFD}char\u{0007}s"), "badchars");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_clean_text_idempotent() {
        for input in ["  a  b  ", "x\u{FFFD}\ny", "single", "\t\t", "é  ü\r\nß"] {
            let once = clean_text(input);
            assert_eq!(clean_text(&once), once);
        }
    }

    #[test]
    fn test_resolve_text_attr_and_regex() {
        let html = r#"
        <div>
            <a class="item" href="/item/42?ref=home">  The
                Answer </a>
        </div>
        "#;
        let document = Html::parse_document(html);
        let node = Selection::select(&document, &Selector::parse("a.item").unwrap());

        assert_eq!(resolve(&path(&["a.item"]), &node), Some("The Answer".to_string()));
        assert_eq!(
            resolve(&path(&["a.item", "href"]), &node),
            Some("/item/42?ref=home".to_string())
        );
        assert_eq!(
            resolve(&path(&["a.item", "href", r"/item/(\d+)"]), &node),
            Some("42".to_string())
        );
        // no match keeps the attribute value
        assert_eq!(
            resolve(&path(&["a.item", "href", r"/product/(\d+)"]), &node),
            Some("/item/42?ref=home".to_string())
        );
        assert_eq!(resolve(&path(&["a.item", "title"]), &node), None);
        assert_eq!(
            resolve(&path(&["a.item", "", r"The (\w+)"]), &node),
            Some("Answer".to_string())
        );
    }

    #[test]
    fn test_pattern_sees_collapsed_text() {
        let document = Html::parse_document("<span>Price:\n    42</span>");
        let node = Selection::select(&document, &Selector::parse("span").unwrap());
        assert_eq!(
            resolve(&path(&["span", "", r"Price: (\d+)"]), &node),
            Some("42".to_string())
        );
        assert_eq!(
            resolve(&path(&["span", "", r"(\s+\d+)"]), &node),
            Some("42".to_string())
        );
    }

    #[test]
    fn test_invalid_pattern_keeps_value() {
        assert_eq!(capture("(unclosed", "value"), "value");
    }
}
