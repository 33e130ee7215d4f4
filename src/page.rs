//! HTML page scraper
//!
//! [`Scraper`] is the per-url unit of work driven by the stream runner.
//! [`PageScraper`] implements it for HTML pages described by a [`Schema`].

use scraper::Html;
use std::sync::Arc;

use crate::client::Client;
use crate::error::{Result, ScrapeError};
use crate::extractors::Extractor;
use crate::schema::Schema;
use crate::value::record_to_json;

/// One extracted row
pub type Row = serde_json::Value;

/// Fetch a url and turn the payload into rows
pub trait Scraper: Send + Sync {
    fn scrape_url(&self, url: &str) -> Result<Vec<u8>>;

    fn get_next_url(&self, last_url: &str, data: &[u8]) -> Result<String>;

    fn get_rows(&self, data: &[u8]) -> Result<Vec<Row>>;

    fn parse_row(&self, row: Row) -> Result<Row>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// How a url is requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub method: Method,
    /// Form values sent with a POST
    pub params: Vec<(String, String)>,
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            params: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            method: Method::Post,
            params,
        }
    }
}

type RequestGetter = Box<dyn Fn(&str) -> PageRequest + Send + Sync>;

/// Scrapes rows out of HTML pages
pub struct PageScraper {
    client: Arc<dyn Client>,
    schema: Schema,
    extractor: Extractor,
    request_getter: RequestGetter,
}

impl PageScraper {
    pub fn new(client: Arc<dyn Client>, schema: Schema) -> Self {
        Self {
            client,
            schema,
            extractor: Extractor::default(),
            request_getter: Box::new(|url: &str| PageRequest::get(url)),
        }
    }

    /// Map a url to the request that fetches it, e.g. to POST a search form
    pub fn request_getter<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> PageRequest + Send + Sync + 'static,
    {
        self.request_getter = Box::new(f);
        self
    }

    pub fn extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }
}

impl std::fmt::Debug for PageScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageScraper")
            .field("schema", &self.schema.id)
            .finish_non_exhaustive()
    }
}

impl Scraper for PageScraper {
    fn scrape_url(&self, url: &str) -> Result<Vec<u8>> {
        let request = (self.request_getter)(url);
        let data = match request.method {
            Method::Get => self.client.get_bytes(&request.url)?,
            Method::Post => self.client.post_bytes(&request.url, &request.params)?,
        };
        Ok(data)
    }

    fn get_next_url(&self, _last_url: &str, _data: &[u8]) -> Result<String> {
        Err(ScrapeError::NotImplemented("PageScraper::get_next_url"))
    }

    fn get_rows(&self, data: &[u8]) -> Result<Vec<Row>> {
        let html = Html::parse_document(&String::from_utf8_lossy(data));
        Ok(self
            .extractor
            .records(&self.schema, &html)
            .into_iter()
            .map(record_to_json)
            .collect())
    }

    fn parse_row(&self, _row: Row) -> Result<Row> {
        Err(ScrapeError::NotImplemented("PageScraper::parse_row"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticClient;
    use serde_json::json;

    const LISTING: &str = r#"
        <html><body>
            <ul class="results">
                <li><a href="/p/1">First</a><span class="price">10</span></li>
                <li><a href="/p/2">Second</a><span class="price">n/a</span></li>
            </ul>
        </body></html>
    "#;

    fn schema() -> Schema {
        Schema::from_json(
            r#"{
                "css": ["ul.results li"],
                "properties": [
                    {"id": "name", "css": ["a"]},
                    {"id": "link", "css": ["a", "href"]},
                    {"id": "price", "css": [".price"], "type": "integer"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_rows() {
        let client = Arc::new(StaticClient::new());
        let scraper = PageScraper::new(client, schema());

        let rows = scraper.get_rows(LISTING.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], json!({"name": "First", "link": "/p/1", "price": 10}));
        assert_eq!(rows[1]["price"], json!(null));
    }

    #[test]
    fn test_scrape_url_get() {
        let client = Arc::new(StaticClient::new().page("http://example.com/list", LISTING));
        let scraper = PageScraper::new(client.clone(), schema());

        let data = scraper.scrape_url("http://example.com/list").unwrap();
        assert_eq!(data, LISTING.as_bytes());
        assert_eq!(client.requests(), vec!["GET http://example.com/list"]);
    }

    #[test]
    fn test_scrape_url_post() {
        let client = Arc::new(StaticClient::new().page("http://example.com/search", LISTING));
        let scraper = PageScraper::new(client.clone(), schema()).request_getter(|url| {
            PageRequest::post(
                "http://example.com/search",
                vec![("q".to_string(), url.to_string())],
            )
        });

        scraper.scrape_url("shoes").unwrap();
        assert_eq!(client.requests(), vec!["POST http://example.com/search"]);
    }

    #[test]
    fn test_not_implemented() {
        let scraper = PageScraper::new(Arc::new(StaticClient::new()), schema());
        assert!(matches!(
            scraper.get_next_url("http://example.com", b""),
            Err(ScrapeError::NotImplemented(_))
        ));
        assert!(matches!(
            scraper.parse_row(json!({})),
            Err(ScrapeError::NotImplemented(_))
        ));
    }
}
