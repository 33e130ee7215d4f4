//! In-memory client for tests

use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

use crate::client::Client;
use crate::error::ClientError;

/// Serves canned pages; unknown urls answer 404
#[derive(Debug, Default)]
pub struct StaticClient {
    pages: HashMap<String, Vec<u8>>,
    socks: bool,
    requests: Mutex<Vec<String>>,
}

impl StaticClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(normalize(url), body.into());
        self
    }

    pub fn socks(mut self, enabled: bool) -> Self {
        self.socks = enabled;
        self
    }

    /// `METHOD url` for every request served so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn serve(&self, method: &str, url: &str) -> Result<Vec<u8>, ClientError> {
        self.requests.lock().unwrap().push(format!("{} {}", method, url));
        self.pages
            .get(&normalize(url))
            .cloned()
            .ok_or_else(|| ClientError::Http {
                url: url.to_string(),
                status: 404,
                body: "not found".to_string(),
            })
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl Client for StaticClient {
    fn get(&self, url: &str) -> Result<String, ClientError> {
        let bytes = self.get_bytes(url)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        self.serve("GET", url)
    }

    fn post(&self, url: &str, form: &[(String, String)]) -> Result<String, ClientError> {
        let bytes = self.post_bytes(url, form)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn post_bytes(&self, url: &str, _form: &[(String, String)]) -> Result<Vec<u8>, ClientError> {
        self.serve("POST", url)
    }

    fn socks_enabled(&self) -> bool {
        self.socks
    }
}
