//! Scrape jobs
//!
//! A [`Job`] fetches one document and streams the records its [`Schema`]
//! describes. In document mode every node matching the root selector becomes
//! a record. When the root schema is a `urllist`, every match is instead a
//! link to a child page, and the child-level schemas are evaluated against
//! each fetched child.
//!
//! Extraction runs on a producer thread and records are delivered through a
//! bounded channel that closes when traversal ends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use crate::client::{Client, Document};
use crate::error::{Result, ScrapeError};
use crate::extractors::{resolve, root_nodes, Extractor, TypeRegistry};
use crate::schema::Schema;
use crate::value::Record;

const CHANNEL_CAPACITY: usize = 16;

/// Early-stop predicate, called with the running record index
pub type StopOn = Arc<dyn Fn(usize, &Record) -> bool + Send + Sync>;

/// Counters shared by every run of a job
#[derive(Debug, Default)]
pub struct JobStats {
    total_items: AtomicUsize,
}

impl JobStats {
    /// Records emitted so far
    pub fn total_items(&self) -> usize {
        self.total_items.load(Ordering::Relaxed)
    }
}

struct UniqueIp {
    check_url: String,
    rotate: Box<dyn Fn() + Send + Sync>,
}

pub struct Job {
    name: String,
    url: String,
    schema: Option<Arc<Schema>>,
    client: Arc<dyn Client>,
    extractor: Extractor,
    stop_on: Option<StopOn>,
    stats: Arc<JobStats>,
    unique_ip: Option<UniqueIp>,
    last_ip: Mutex<Option<String>>,
    child_delay: Option<Duration>,
}

impl Job {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        schema: Option<Schema>,
        client: Arc<dyn Client>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            schema: schema.map(Arc::new),
            client,
            extractor: Extractor::default(),
            stop_on: None,
            stats: Arc::new(JobStats::default()),
            unique_ip: None,
            last_ip: Mutex::new(None),
            child_delay: None,
        }
    }

    /// Stop traversal, without emitting, at the first record for which `f` is true
    pub fn stop_on<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, &Record) -> bool + Send + Sync + 'static,
    {
        self.stop_on = Some(Arc::new(f));
        self
    }

    /// Resolve custom property types from `registry` instead of the global one
    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.extractor = Extractor::new(registry);
        self
    }

    /// Before each run, look up the exit address at `check_url` and call
    /// `rotate` when it has not changed since the previous run. Only applies
    /// when the client goes through a SOCKS proxy.
    pub fn unique_ip<F>(mut self, check_url: impl Into<String>, rotate: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.unique_ip = Some(UniqueIp {
            check_url: check_url.into(),
            rotate: Box::new(rotate),
        });
        self
    }

    /// Pause between child page requests in list mode
    pub fn child_delay(mut self, delay: Duration) -> Self {
        self.child_delay = Some(delay);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &JobStats {
        &self.stats
    }

    /// Start a run and return the record stream.
    ///
    /// Fails before any work with `NoSchema`, and with the client error when
    /// the top-level document cannot be fetched. Failures after that only end
    /// the stream early.
    pub fn scrape_stream(&self) -> Result<mpsc::Receiver<Record>> {
        let schema = self.schema.clone().ok_or(ScrapeError::NoSchema)?;
        let url = Url::parse(&self.url).map_err(|source| ScrapeError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;

        self.check_ip();

        let body = self.client.get(url.as_str()).map_err(|e| {
            tracing::warn!(job = %self.name, url = %url, error = %e, "Could not retrieve url");
            e
        })?;
        tracing::debug!(job = %self.name, url = %url, bytes = body.len(), "Retrieved document");

        let traversal = Traversal {
            job: self.name.clone(),
            schema,
            client: self.client.clone(),
            extractor: self.extractor.clone(),
            stop_on: self.stop_on.clone(),
            stats: self.stats.clone(),
            child_delay: self.child_delay,
        };

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        std::thread::spawn(move || {
            let document = Document::parse(url, &body);
            traversal.run(&document, &tx);
        });
        Ok(rx)
    }

    /// Run to completion and collect every record.
    ///
    /// Blocks the current thread, so it must not be called from async code.
    pub fn scrape(&self) -> Result<Vec<Record>> {
        let mut rx = self.scrape_stream()?;
        let mut records = Vec::new();
        while let Some(record) = rx.blocking_recv() {
            records.push(record);
        }
        Ok(records)
    }

    fn check_ip(&self) {
        let Some(unique_ip) = &self.unique_ip else {
            return;
        };

        let ip = match self.client.get(&unique_ip.check_url) {
            Ok(body) => body.trim().to_string(),
            Err(e) => {
                tracing::info!(job = %self.name, error = %e, "Unable to retrieve exit address");
                return;
            }
        };

        let Ok(mut last_ip) = self.last_ip.lock() else {
            return;
        };
        if self.client.socks_enabled() && last_ip.as_deref() == Some(ip.as_str()) {
            tracing::info!(job = %self.name, ip = %ip, "Exit address unchanged, rotating");
            (unique_ip.rotate)();
        }
        tracing::debug!(job = %self.name, ip = %ip, "Using exit address");
        *last_ip = Some(ip);
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// State moved onto the producer thread
struct Traversal {
    job: String,
    schema: Arc<Schema>,
    client: Arc<dyn Client>,
    extractor: Extractor,
    stop_on: Option<StopOn>,
    stats: Arc<JobStats>,
    child_delay: Option<Duration>,
}

impl Traversal {
    fn run(&self, document: &Document, tx: &mpsc::Sender<Record>) {
        let mut index = 0;
        if self.schema.is_url_list() {
            self.child_pages(document, &mut index, tx);
        } else {
            for node in root_nodes(self.schema.selector(), &document.html).each() {
                let record = self.extractor.record(&self.schema.properties, &node);
                if !self.emit(&mut index, record, tx) {
                    break;
                }
            }
        }
        tracing::info!(job = %self.job, records = index, "Traversal finished");
    }

    fn child_pages(&self, document: &Document, index: &mut usize, tx: &mpsc::Sender<Record>) {
        let limit = self.schema.limit;
        tracing::info!(job = %self.job, url = %document.url, "Retrieving list of urls to scrape");

        let links = root_nodes(self.schema.selector(), &document.html);
        for (i, node) in links.each().enumerate() {
            let count = i + 1;

            let Some(href) = resolve(&self.schema.css, &node) else {
                tracing::warn!(job = %self.job, css = ?self.schema.css, "Child url css path failed");
                return;
            };
            // RFC 3986 reference resolution: "items/1" is relative to the list
            // page's directory, "/items/1" to the host root
            let url = match document.url.join(&href) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(job = %self.job, href = %href, error = %e, "Invalid child url");
                    return;
                }
            };

            if count > 1 {
                if let Some(delay) = self.child_delay {
                    std::thread::sleep(delay);
                }
            }

            match self.client.get_document(url.as_str()) {
                Ok(child) => {
                    tracing::debug!(job = %self.job, url = %url, "Parsing child page");
                    if !self.child_records(&child, index, tx) {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(job = %self.job, url = %url, error = %e, "Could not retrieve child url");
                }
            }

            if limit > 0 && count >= limit {
                tracing::info!(job = %self.job, count, limit, "Child url limit reached");
                return;
            }
        }
    }

    fn child_records(
        &self,
        child: &Document,
        index: &mut usize,
        tx: &mpsc::Sender<Record>,
    ) -> bool {
        for property in &self.schema.properties {
            for node in root_nodes(property.selector(), &child.html).each() {
                let record = self.extractor.nested_record(&property.properties, &node);
                if !self.emit(index, record, tx) {
                    return false;
                }
            }
        }
        true
    }

    /// Send one record; false ends the traversal
    fn emit(&self, index: &mut usize, record: Record, tx: &mpsc::Sender<Record>) -> bool {
        if let Some(stop_on) = &self.stop_on {
            if stop_on(*index, &record) {
                tracing::debug!(job = %self.job, index = *index, "Stop condition met");
                return false;
            }
        }
        if tx.blocking_send(record).is_err() {
            tracing::debug!(job = %self.job, "Record stream closed by consumer");
            return false;
        }
        *index += 1;
        self.stats.total_items.fetch_add(1, Ordering::Relaxed);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticClient;
    use crate::value::Value;
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    const TABLE: &str = r#"
        <html><body>
            <h1>Example Domain</h1>
            <table>
                <tr class="row"><td class="name">alpha</td><td class="qty">1</td></tr>
                <tr class="row"><td class="name">beta</td><td class="qty">2</td></tr>
                <tr class="row"><td class="name">gamma</td><td class="qty">3</td></tr>
            </table>
        </body></html>
    "#;

    const LIST: &str = r#"
        <html><body>
            <a class="item" href="/items/1">one</a>
            <a class="item" href="/items/2">two</a>
            <a class="item" href="http://example.com/items/3">three</a>
        </body></html>
    "#;

    fn item(name: &str, price: &str) -> String {
        format!(
            r#"<html><body><div class="product"><h2>{name}</h2><div class="meta"><span class="price">{price}</span></div></div></body></html>"#
        )
    }

    fn table_schema() -> Schema {
        Schema::from_json(
            r#"{"css": ["tr.row"], "properties": [
                {"id": "name", "css": [".name"]},
                {"id": "qty", "css": [".qty"], "type": "integer"}
            ]}"#,
        )
        .unwrap()
    }

    fn list_schema(limit: usize) -> Schema {
        Schema::from_json(&format!(
            r#"{{"css": ["a.item", "href"], "type": "urllist", "limit": {limit}, "properties": [
                {{"id": "product", "css": [".product"], "properties": [
                    {{"id": "name", "css": ["h2"]}},
                    {{"id": "missing", "css": [".nothing"]}},
                    {{"id": "meta", "css": [".meta"], "type": "object", "mergeWithParent": true,
                      "properties": [{{"id": "price", "css": [".price"], "type": "integer"}}]}}
                ]}}
            ]}}"#
        ))
        .unwrap()
    }

    fn list_client() -> Arc<StaticClient> {
        Arc::new(
            StaticClient::new()
                .page("http://example.com/list", LIST)
                .page("http://example.com/items/1", item("one", "10"))
                .page("http://example.com/items/2", item("two", "20"))
                .page("http://example.com/items/3", item("three", "30")),
        )
    }

    fn name(record: &Record) -> Option<&str> {
        record.get("name").and_then(Value::as_str)
    }

    #[test]
    fn test_no_schema() {
        let job = Job::new(
            "none",
            "http://example.com",
            None,
            Arc::new(StaticClient::new()),
        );
        assert!(matches!(job.scrape_stream(), Err(ScrapeError::NoSchema)));
    }

    #[test]
    fn test_top_level_fetch_error() {
        let job = Job::new(
            "missing",
            "http://example.com/missing",
            Some(table_schema()),
            Arc::new(StaticClient::new()),
        );
        let err = job.scrape().unwrap_err();
        assert!(matches!(err, ScrapeError::Client(ref e) if e.status() == Some(404)));
    }

    #[test]
    fn test_title_scenario() {
        let client = Arc::new(StaticClient::new().page("http://example.com", TABLE));
        let schema =
            Schema::from_json(r#"{"css":["body"],"properties":[{"id":"title","css":["h1"]}]}"#)
                .unwrap();
        let records = Job::new("title", "http://example.com", Some(schema), client)
            .scrape()
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), 1);
        assert_eq!(records[0]["title"].as_str(), Some("Example Domain"));
    }

    #[test]
    fn test_document_mode() {
        let client = Arc::new(StaticClient::new().page("http://example.com/table", TABLE));
        let job = Job::new(
            "table",
            "http://example.com/table",
            Some(table_schema()),
            client,
        );

        let records = job.scrape().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(name(&records[1]), Some("beta"));
        assert_eq!(records[2]["qty"].as_i64(), Some(3));
        assert_eq!(job.stats().total_items(), 3);

        job.scrape().unwrap();
        assert_eq!(job.stats().total_items(), 6);
    }

    #[test]
    fn test_stop_on_skips_record() {
        let client = Arc::new(StaticClient::new().page("http://example.com/table", TABLE));
        let job = Job::new(
            "table",
            "http://example.com/table",
            Some(table_schema()),
            client,
        )
        .stop_on(|_, record| name(record) == Some("beta"));

        let records = job.scrape().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(name(&records[0]), Some("alpha"));
    }

    #[test]
    fn test_list_mode() {
        let job = Job::new(
            "list",
            "http://example.com/list",
            Some(list_schema(0)),
            list_client(),
        );

        let records = job.scrape().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(name(&records[0]), Some("one"));
        assert_eq!(records[2]["price"].as_i64(), Some(30));
        // null values are left out and merged objects are spliced in
        assert!(!records[0].contains_key("missing"));
        assert!(!records[0].contains_key("meta"));
    }

    #[test]
    fn test_list_limit() {
        let client = list_client();
        let job = Job::new(
            "list",
            "http://example.com/list",
            Some(list_schema(2)),
            client.clone(),
        );

        let records = job.scrape().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            client.requests(),
            vec![
                "GET http://example.com/list",
                "GET http://example.com/items/1",
                "GET http://example.com/items/2",
            ]
        );
    }

    #[test]
    fn test_list_child_failure_is_skipped() {
        let client = Arc::new(
            StaticClient::new()
                .page("http://example.com/list", LIST)
                .page("http://example.com/items/1", item("one", "10"))
                .page("http://example.com/items/3", item("three", "30")),
        );
        let job = Job::new(
            "list",
            "http://example.com/list",
            Some(list_schema(0)),
            client,
        );

        let records = job.scrape().unwrap();
        let names: Vec<_> = records.iter().filter_map(name).collect();
        assert_eq!(names, vec!["one", "three"]);
    }

    #[test]
    fn test_list_stop_uses_running_index() {
        let job = Job::new(
            "list",
            "http://example.com/list",
            Some(list_schema(0)),
            list_client(),
        )
        .stop_on(|index, _| index == 2);

        let records = job.scrape().unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_child_urls_resolve_against_list_page() {
        let list = r#"<html><body>
            <a class="item" href="items/1">one</a>
            <a class="item" href="/items/2">two</a>
        </body></html>"#;
        let client = Arc::new(
            StaticClient::new()
                .page("http://example.com/shop/list", list)
                .page("http://example.com/shop/items/1", item("one", "10"))
                .page("http://example.com/items/2", item("two", "20")),
        );
        let job = Job::new(
            "relative",
            "http://example.com/shop/list",
            Some(list_schema(0)),
            client.clone(),
        );

        let records = job.scrape().unwrap();
        let names: Vec<_> = records.iter().filter_map(name).collect();
        assert_eq!(names, vec!["one", "two"]);
        assert_eq!(
            client.requests(),
            vec![
                "GET http://example.com/shop/list",
                "GET http://example.com/shop/items/1",
                "GET http://example.com/items/2",
            ]
        );
    }

    #[test]
    fn test_child_delay_only_between_children() {
        let delay = Duration::from_millis(60);

        let job = Job::new(
            "list",
            "http://example.com/list",
            Some(list_schema(0)),
            list_client(),
        )
        .child_delay(delay);
        let started = Instant::now();
        assert_eq!(job.scrape().unwrap().len(), 3);
        assert!(started.elapsed() >= delay * 2);

        let single = Job::new(
            "single",
            "http://example.com/list",
            Some(list_schema(1)),
            list_client(),
        )
        .child_delay(Duration::from_secs(5));
        let started = Instant::now();
        assert_eq!(single.scrape().unwrap().len(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_unique_ip_rotates_on_repeat() {
        let client = Arc::new(
            StaticClient::new()
                .socks(true)
                .page("http://ip.test", "10.0.0.1\n")
                .page("http://example.com/table", TABLE),
        );
        let rotated = Arc::new(AtomicBool::new(false));
        let flag = rotated.clone();
        let job = Job::new(
            "ip",
            "http://example.com/table",
            Some(table_schema()),
            client,
        )
        .unique_ip("http://ip.test", move || flag.store(true, Ordering::SeqCst));

        job.scrape().unwrap();
        assert!(!rotated.load(Ordering::SeqCst));
        job.scrape().unwrap();
        assert!(rotated.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unique_ip_needs_socks() {
        let client = Arc::new(
            StaticClient::new()
                .page("http://ip.test", "10.0.0.1")
                .page("http://example.com/table", TABLE),
        );
        let rotated = Arc::new(AtomicBool::new(false));
        let flag = rotated.clone();
        let job = Job::new(
            "ip",
            "http://example.com/table",
            Some(table_schema()),
            client,
        )
        .unique_ip("http://ip.test", move || flag.store(true, Ordering::SeqCst));

        job.scrape().unwrap();
        job.scrape().unwrap();
        assert!(!rotated.load(Ordering::SeqCst));
    }
}
