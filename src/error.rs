//! Typed errors for the scraper.
//!
//! Data-shape conditions (`NoNextUrl`, `NoRows`, `NoData`) are expected and end
//! pagination cleanly; everything else is a real failure.

use thiserror::Error;

/// Errors raised by the HTTP collaborator.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Server answered with something other than 200
    #[error("unable to retrieve {url}: HTTP {status} {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },

    /// Connection-level failure after the retry budget was spent
    #[error("transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    /// SOCKS proxy address could not be used
    #[error("invalid proxy {proxy}: {reason}")]
    Proxy { proxy: String, reason: String },

    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl ClientError {
    /// HTTP status code, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors raised by jobs, page scrapers and the REST paginator.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("schema is not available")]
    NoSchema,

    #[error("no next url")]
    NoNextUrl,

    #[error("no rows")]
    NoRows,

    #[error("no data")]
    NoData,

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("template error: {0}")]
    Template(String),

    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScrapeError {
    /// True for the advisory conditions that mark the end of a result set.
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            ScrapeError::NoNextUrl | ScrapeError::NoRows | ScrapeError::NoData
        )
    }
}

/// Errors raised by the custom type registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("cannot register type {name}: registry is sealed after first lookup")]
    Sealed { name: String },
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
