//! HTTP collaborator
//!
//! The scraper only needs a handful of blocking operations, captured by the
//! [`Client`] trait. [`HttpClient`] implements them on top of a `ureq` agent
//! with an optional SOCKS5 proxy, a cookie jar and a retry budget for
//! connection failures. Non-200 responses are never retried.

use scraper::Html;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ureq::http::Response;
use ureq::Body;
use url::Url;

use crate::error::ClientError;

const BODY_SNIPPET_LEN: usize = 256;

/// Fetch operations the scraper depends on
pub trait Client: Send + Sync {
    fn get(&self, url: &str) -> Result<String, ClientError>;

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ClientError>;

    fn post(&self, url: &str, form: &[(String, String)]) -> Result<String, ClientError>;

    fn post_bytes(&self, url: &str, form: &[(String, String)]) -> Result<Vec<u8>, ClientError>;

    /// Whether requests go through a SOCKS proxy
    fn socks_enabled(&self) -> bool;

    /// Fetch and parse an HTML document
    fn get_document(&self, url: &str) -> Result<Document, ClientError> {
        let parsed = Url::parse(url).map_err(|source| ClientError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let body = self.get(url)?;
        Ok(Document::parse(parsed, &body))
    }
}

/// A parsed page together with the URL it was fetched from
#[derive(Debug)]
pub struct Document {
    pub url: Url,
    pub html: Html,
}

impl Document {
    pub fn parse(url: Url, body: &str) -> Self {
        Self {
            url,
            html: Html::parse_document(body),
        }
    }
}

/// Settings for [`HttpClient`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` of a SOCKS5 proxy
    pub socks5_proxy: Option<String>,
    pub user_agent: String,
    pub dial_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Extra attempts after a connection failure
    pub retry: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socks5_proxy: None,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/39.0.2171.27 Safari/537.36".to_string(),
            dial_timeout_secs: 10,
            read_timeout_secs: 10,
            retry: 3,
        }
    }
}

/// Blocking client backed by ureq
#[derive(Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    retry: u32,
    socks_enabled: bool,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let proxy = match &config.socks5_proxy {
            Some(addr) => {
                let uri = if addr.contains("://") {
                    addr.clone()
                } else {
                    format!("socks5://{}", addr)
                };
                let proxy = ureq::Proxy::new(&uri).map_err(|e| ClientError::Proxy {
                    proxy: addr.clone(),
                    reason: e.to_string(),
                })?;
                Some(proxy)
            }
            None => None,
        };
        let socks_enabled = proxy.is_some();

        Ok(Self {
            agent: build_agent(&config, proxy),
            retry: config.retry,
            socks_enabled,
        })
    }

    fn with_retry<F>(&self, url: &str, send: F) -> Result<Vec<u8>, ClientError>
    where
        F: Fn() -> Result<Response<Body>, ureq::Error>,
    {
        let mut retry = self.retry;
        loop {
            match send() {
                Ok(resp) => return read_response(url, resp),
                Err(e) if retry > 0 && is_connection_error(&e) => {
                    tracing::debug!(url, error = %e, retries_left = retry, "Request failed, retrying");
                    retry -= 1;
                }
                Err(e) => {
                    return Err(ClientError::Transport {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        let config = ClientConfig::default();
        Self {
            agent: build_agent(&config, None),
            retry: config.retry,
            socks_enabled: false,
        }
    }
}

fn build_agent(config: &ClientConfig, proxy: Option<ureq::Proxy>) -> ureq::Agent {
    ureq::Agent::new_with_config(
        ureq::Agent::config_builder()
            .timeout_connect(Some(Duration::from_secs(config.dial_timeout_secs)))
            .timeout_recv_response(Some(Duration::from_secs(config.read_timeout_secs)))
            .user_agent(config.user_agent.as_str())
            .http_status_as_error(false)
            .proxy(proxy)
            .build(),
    )
}

/// Failures worth another attempt; request and protocol errors are final
fn is_connection_error(e: &ureq::Error) -> bool {
    matches!(
        e,
        ureq::Error::Io(_)
            | ureq::Error::Timeout(_)
            | ureq::Error::HostNotFound
            | ureq::Error::ConnectionFailed
            | ureq::Error::ConnectProxyFailed(_)
    )
}

fn read_response(url: &str, resp: Response<Body>) -> Result<Vec<u8>, ClientError> {
    let status = resp.status().as_u16();
    let body = resp
        .into_body()
        .read_to_vec()
        .map_err(|e| ClientError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if status != 200 {
        let body = String::from_utf8_lossy(&body)
            .chars()
            .take(BODY_SNIPPET_LEN)
            .collect();
        return Err(ClientError::Http {
            url: url.to_string(),
            status,
            body,
        });
    }
    Ok(body)
}

fn encode_form(form: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form.iter())
        .finish()
}

impl Client for HttpClient {
    fn get(&self, url: &str) -> Result<String, ClientError> {
        let bytes = self.get_bytes(url)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        self.with_retry(url, || self.agent.get(url).call())
    }

    fn post(&self, url: &str, form: &[(String, String)]) -> Result<String, ClientError> {
        let bytes = self.post_bytes(url, form)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn post_bytes(&self, url: &str, form: &[(String, String)]) -> Result<Vec<u8>, ClientError> {
        let body = encode_form(form);
        self.with_retry(url, || {
            self.agent
                .post(url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .send(body.as_str())
        })
    }

    fn socks_enabled(&self) -> bool {
        self.socks_enabled
    }
}
