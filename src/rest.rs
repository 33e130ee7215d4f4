//! REST paginator
//!
//! [`RestScraper`] walks a paginated API one page at a time:
//! fetch -> parse into [`Data`] -> rows -> next url. Each step is a pluggable
//! strategy. The defaults answer `NoRows` / `NoNextUrl` so an unconfigured
//! scraper ends cleanly instead of failing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

use crate::client::Client;
use crate::data::{Data, DataValue, EchoData, JsonData};
use crate::error::{Result, ScrapeError};
use crate::page::{Row, Scraper};
use crate::template::NextUrlTemplate;

type ParseDataFn = Box<dyn Fn(&[u8]) -> Result<Box<dyn Data>> + Send + Sync>;
type NextUrlFn = Box<dyn Fn(&Url, &dyn Data) -> Result<String> + Send + Sync>;
type RowCountFn = Box<dyn Fn(&dyn Data) -> Result<usize> + Send + Sync>;
type RowsFn = Box<dyn Fn(&dyn Data) -> Result<Vec<Row>> + Send + Sync>;
type ParseRowFn = Box<dyn Fn(Row) -> Result<Row> + Send + Sync>;

/// Paginated API scraper built from strategies
pub struct RestScraper {
    client: Arc<dyn Client>,
    parse_data: ParseDataFn,
    next_url: NextUrlFn,
    row_count: RowCountFn,
    rows: RowsFn,
    parse_row: ParseRowFn,
    page_limit: usize,
    scraped_count: AtomicUsize,
}

impl RestScraper {
    pub fn new(client: Arc<dyn Client>) -> Self {
        Self {
            client,
            parse_data: Box::new(echo_data),
            next_url: Box::new(no_next_url),
            row_count: Box::new(no_row_count),
            rows: Box::new(no_rows),
            parse_row: Box::new(no_row),
            page_limit: 0,
            scraped_count: AtomicUsize::new(0),
        }
    }

    /// JSON API scraper: rows and total are read from fixed paths and the next
    /// url comes from a [`NextUrlTemplate`]
    pub fn json(
        client: Arc<dyn Client>,
        next_url_template: &str,
        row_count_path: &str,
        rows_path: &str,
    ) -> Result<Self> {
        let template = NextUrlTemplate::new(next_url_template)?;
        let row_count_path = row_count_path.to_string();
        let rows_path = rows_path.to_string();

        Ok(Self::new(client)
            .with_parse_data(|data| Ok(Box::new(JsonData::parse(data)?) as Box<dyn Data>))
            .with_next_url(move |last, data| template.render(last, data))
            .with_row_count(move |data| {
                match data.get(&row_count_path).and_then(|v| v.as_json().and_then(|j| j.as_f64())) {
                    Some(total) if total >= 0.0 => Ok(total as usize),
                    _ => Err(ScrapeError::NoData),
                }
            })
            .with_rows(move |data| match data.get(&rows_path) {
                Some(DataValue::Json(serde_json::Value::Array(rows))) => Ok(rows),
                _ => Err(ScrapeError::NoData),
            })
            .with_parse_row(Ok))
    }

    pub fn with_parse_data<F>(mut self, f: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Box<dyn Data>> + Send + Sync + 'static,
    {
        self.parse_data = Box::new(f);
        self
    }

    pub fn with_next_url<F>(mut self, f: F) -> Self
    where
        F: Fn(&Url, &dyn Data) -> Result<String> + Send + Sync + 'static,
    {
        self.next_url = Box::new(f);
        self
    }

    pub fn with_row_count<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Data) -> Result<usize> + Send + Sync + 'static,
    {
        self.row_count = Box::new(f);
        self
    }

    pub fn with_rows<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Data) -> Result<Vec<Row>> + Send + Sync + 'static,
    {
        self.rows = Box::new(f);
        self
    }

    pub fn with_parse_row<F>(mut self, f: F) -> Self
    where
        F: Fn(Row) -> Result<Row> + Send + Sync + 'static,
    {
        self.parse_row = Box::new(f);
        self
    }

    /// Stop crawling after `limit` pages; 0 means no limit
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    /// Fetch one page. An empty body is `NoData`, not an empty page.
    pub fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let data = self.client.get_bytes(url.as_str())?;
        if data.is_empty() {
            return Err(ScrapeError::NoData);
        }
        self.scraped_count.fetch_add(1, Ordering::Relaxed);
        Ok(data)
    }

    pub fn parse_data(&self, data: &[u8]) -> Result<Box<dyn Data>> {
        (self.parse_data)(data)
    }

    pub fn next_url(&self, last_url: &Url, data: &dyn Data) -> Result<String> {
        (self.next_url)(last_url, data)
    }

    pub fn rows(&self, data: &dyn Data) -> Result<Vec<Row>> {
        (self.rows)(data)
    }

    pub fn row(&self, row: Row) -> Result<Row> {
        (self.parse_row)(row)
    }

    pub fn total(&self, data: &dyn Data) -> Result<usize> {
        (self.row_count)(data)
    }

    /// Pages fetched successfully so far
    pub fn scraped_count(&self) -> usize {
        self.scraped_count.load(Ordering::Relaxed)
    }

    /// Walk pages starting at `start` until the result set is exhausted
    pub fn crawl(&self, start: Url) -> Pages<'_> {
        Pages {
            scraper: self,
            next: Some(start),
            fetched: 0,
            pending: None,
        }
    }

    fn page(&self, url: &Url) -> Result<(Vec<Row>, Result<String>)> {
        let bytes = self.fetch(url)?;
        let data = self.parse_data(&bytes)?;
        let rows = self
            .rows(data.as_ref())?
            .into_iter()
            .map(|row| self.row(row))
            .collect::<Result<Vec<_>>>()?;
        let next = self.next_url(url, data.as_ref());
        Ok((rows, next))
    }
}

fn echo_data(data: &[u8]) -> Result<Box<dyn Data>> {
    Ok(Box::new(EchoData::new(data)))
}

fn no_next_url(_: &Url, _: &dyn Data) -> Result<String> {
    Err(ScrapeError::NoNextUrl)
}

fn no_row_count(_: &dyn Data) -> Result<usize> {
    Err(ScrapeError::NoRows)
}

fn no_rows(_: &dyn Data) -> Result<Vec<Row>> {
    Err(ScrapeError::NoRows)
}

fn no_row(_: Row) -> Result<Row> {
    Err(ScrapeError::NoRows)
}

impl std::fmt::Debug for RestScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestScraper")
            .field("page_limit", &self.page_limit)
            .field("scraped_count", &self.scraped_count())
            .finish_non_exhaustive()
    }
}

/// Rows of one fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct RestPage {
    pub url: Url,
    pub rows: Vec<Row>,
}

/// Iterator over the pages of a crawl
///
/// Ends on `NoNextUrl`, `NoRows` or `NoData`, or when the page limit is hit.
/// Any other error is yielded once and ends the crawl.
pub struct Pages<'a> {
    scraper: &'a RestScraper,
    next: Option<Url>,
    fetched: usize,
    pending: Option<ScrapeError>,
}

impl Iterator for Pages<'_> {
    type Item = Result<RestPage>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            self.next = None;
            return Some(Err(err));
        }

        let limit = self.scraper.page_limit;
        if limit > 0 && self.fetched >= limit {
            tracing::info!(pages = self.fetched, "Page limit reached");
            return None;
        }

        let url = self.next.take()?;
        let (rows, next) = match self.scraper.page(&url) {
            Ok(page) => page,
            Err(e) if e.is_exhausted() => {
                tracing::debug!(url = %url, reason = %e, "Result set exhausted");
                return None;
            }
            Err(e) => return Some(Err(e)),
        };
        self.fetched += 1;
        tracing::debug!(url = %url, rows = rows.len(), "Scraped page");

        match next.and_then(|next| {
            url.join(&next).map_err(|source| ScrapeError::InvalidUrl { url: next, source })
        }) {
            Ok(next) => self.next = Some(next),
            Err(e) if e.is_exhausted() => {}
            Err(e) => self.pending = Some(e),
        }

        Some(Ok(RestPage { url, rows }))
    }
}

impl Scraper for RestScraper {
    fn scrape_url(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = Url::parse(url).map_err(|source| ScrapeError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        self.fetch(&parsed)
    }

    fn get_next_url(&self, last_url: &str, data: &[u8]) -> Result<String> {
        let last = Url::parse(last_url).map_err(|source| ScrapeError::InvalidUrl {
            url: last_url.to_string(),
            source,
        })?;
        let data = self.parse_data(data)?;
        self.next_url(&last, data.as_ref())
    }

    fn get_rows(&self, data: &[u8]) -> Result<Vec<Row>> {
        let data = self.parse_data(data)?;
        self.rows(data.as_ref())
    }

    fn parse_row(&self, row: Row) -> Result<Row> {
        self.row(row)
    }
}
