//! Worker pool over a [`Scraper`]
//!
//! Urls go into a shared queue drained by a fixed number of tokio tasks. Each
//! result (rows or error) is handed to one subscriber of that url. A result
//! nobody subscribed to within `publish_timeout` is dropped.

use futures::future::join_all;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::Result;
use crate::page::{Row, Scraper};

pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

type Outcome = Result<Vec<Row>>;

/// One less than the number of CPUs, at least one
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

#[derive(Default)]
struct Subscribers {
    waiting: Mutex<HashMap<String, VecDeque<oneshot::Sender<Outcome>>>>,
    added: Notify,
}

impl Subscribers {
    fn add(&self, url: String) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        let mut waiting = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
        waiting.retain(|_, queue| {
            queue.retain(|tx| !tx.is_closed());
            !queue.is_empty()
        });
        waiting.entry(url).or_default().push_back(tx);
        drop(waiting);

        self.added.notify_waiters();
        rx
    }

    /// Next subscriber of `url` that is still listening
    fn take(&self, url: &str) -> Option<oneshot::Sender<Outcome>> {
        let mut waiting = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = waiting.get_mut(url)?;
        let mut found = None;
        while let Some(tx) = queue.pop_front() {
            if !tx.is_closed() {
                found = Some(tx);
                break;
            }
        }
        if queue.is_empty() {
            waiting.remove(url);
        }
        found
    }

    #[cfg(test)]
    fn waiting_urls(&self) -> Vec<String> {
        let waiting = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
        let mut urls: Vec<String> = waiting.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Deliver `outcome` to the first live subscriber of `url`, waiting up to
    /// `timeout` for one to show up
    async fn publish(&self, url: &str, mut outcome: Outcome, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            let added = self.added.notified();
            tokio::pin!(added);
            added.as_mut().enable();

            while let Some(tx) = self.take(url) {
                match tx.send(outcome) {
                    Ok(()) => return,
                    Err(back) => outcome = back,
                }
            }

            if tokio::time::timeout_at(deadline, added).await.is_err() {
                tracing::debug!(url, "No subscriber, dropping result");
                return;
            }
        }
    }
}

/// Fixed-size pool of scraping tasks
pub struct StreamRunner {
    input: Option<mpsc::Sender<String>>,
    subscribers: Arc<Subscribers>,
    workers: Vec<JoinHandle<()>>,
}

impl StreamRunner {
    /// Start `workers` tasks on the current tokio runtime
    pub fn new(scraper: Arc<dyn Scraper>, workers: usize) -> Self {
        Self::with_publish_timeout(scraper, workers, DEFAULT_PUBLISH_TIMEOUT)
    }

    pub fn with_publish_timeout(
        scraper: Arc<dyn Scraper>,
        workers: usize,
        publish_timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<String>(workers.max(1));
        let queue = Arc::new(tokio::sync::Mutex::new(rx));
        let subscribers = Arc::new(Subscribers::default());

        let workers = (1..=workers.max(1))
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    scraper.clone(),
                    queue.clone(),
                    subscribers.clone(),
                    publish_timeout,
                ))
            })
            .collect();

        Self {
            input: Some(tx),
            subscribers,
            workers,
        }
    }

    /// Queue a url; false once the runner is closed
    pub async fn add(&self, url: impl Into<String>) -> bool {
        match &self.input {
            Some(input) => input.send(url.into()).await.is_ok(),
            None => false,
        }
    }

    /// Receive the next result published for `url`
    pub fn subscribe(&self, url: impl Into<String>) -> oneshot::Receiver<Result<Vec<Row>>> {
        self.subscribers.add(url.into())
    }

    /// Stop accepting urls and wait for queued ones to finish
    pub async fn close(&mut self) {
        self.input = None;
        for joined in join_all(self.workers.drain(..)).await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Stream worker failed");
            }
        }
    }
}

impl std::fmt::Debug for StreamRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRunner")
            .field("workers", &self.workers.len())
            .field("closed", &self.input.is_none())
            .finish()
    }
}

async fn worker(
    id: usize,
    scraper: Arc<dyn Scraper>,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    subscribers: Arc<Subscribers>,
    publish_timeout: Duration,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(url) = next else {
            break;
        };

        let task_scraper = scraper.clone();
        let task_url = url.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let data = task_scraper.scrape_url(&task_url)?;
            task_scraper.get_rows(&data)
        })
        .await;

        match outcome {
            Ok(outcome) => {
                if let Err(e) = &outcome {
                    tracing::debug!(worker = id, url = %url, error = %e, "Scrape failed");
                }
                subscribers.publish(&url, outcome, publish_timeout).await;
            }
            Err(e) => tracing::error!(worker = id, url = %url, error = %e, "Scrape task panicked"),
        }
    }
    tracing::debug!(worker = id, "Stream worker stopped");
}
