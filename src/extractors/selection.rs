//! Node sets over a parsed document
//!
//! Uses the scraper crate to select elements by CSS selectors. A [`Selection`]
//! keeps every matched element so a property can read the first node
//! (attributes) or all of them (text, arrays).

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

/// Ordered set of elements without duplicates
#[derive(Debug, Clone, Default)]
pub struct Selection<'a> {
    nodes: Vec<ElementRef<'a>>,
}

impl<'a> Selection<'a> {
    pub fn new(nodes: Vec<ElementRef<'a>>) -> Self {
        let mut seen = HashSet::new();
        let nodes = nodes.into_iter().filter(|el| seen.insert(el.id())).collect();
        Self { nodes }
    }

    /// Elements of `document` matching `selector`
    pub fn select(document: &'a Html, selector: &Selector) -> Self {
        Self::new(document.select(selector).collect())
    }

    /// Selection holding the document's root element
    pub fn root(document: &'a Html) -> Self {
        Self {
            nodes: vec![document.root_element()],
        }
    }

    /// Descendants of every node matching `selector`
    pub fn find(&self, selector: &Selector) -> Selection<'a> {
        Self::new(
            self.nodes
                .iter()
                .flat_map(|el| el.select(selector))
                .collect(),
        )
    }

    pub fn first(&self) -> Selection<'a> {
        Self {
            nodes: self.nodes.first().copied().into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ElementRef<'a>> + '_ {
        self.nodes.iter().copied()
    }

    /// Each node as a single-element selection
    pub fn each(&self) -> impl Iterator<Item = Selection<'a>> + '_ {
        self.nodes.iter().map(|el| Selection::from(*el))
    }

    /// Combined text of every node
    pub fn text(&self) -> String {
        self.nodes
            .iter()
            .flat_map(|el| el.text())
            .collect::<String>()
    }

    /// Attribute of the first node
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.nodes.first().and_then(|el| el.value().attr(name))
    }

    /// Text of the first node with its child elements removed
    pub fn own_text(&self) -> String {
        let mut out = String::new();
        if let Some(el) = self.nodes.first() {
            for child in el.children() {
                if let Some(text) = child.value().as_text() {
                    out.push_str(text);
                }
            }
        }
        out
    }
}

impl<'a> From<ElementRef<'a>> for Selection<'a> {
    fn from(el: ElementRef<'a>) -> Self {
        Self { nodes: vec![el] }
    }
}

/// Parse a CSS selector, keeping the parser's message on failure
pub fn parse_selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| e.to_string())
}
