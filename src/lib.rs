//! Schema-driven web scraping
//!
//! Declarative JSON schemas describe what to pull out of HTML pages:
//! - `extractors`: schema interpreter, selector path resolution, custom types
//! - `job`: single-document and list-traversal jobs streaming records
//! - `rest`: paginated API scraping with pluggable strategies
//! - `stream`: worker pool fanning urls out over a [`Scraper`]
//! - `client`: the blocking HTTP collaborator

pub mod client;
pub mod data;
pub mod error;
pub mod extractors;
pub mod job;
pub mod page;
pub mod rest;
pub mod schema;
pub mod stream;
pub mod template;
pub mod value;

#[cfg(test)]
mod testing;

pub use client::{Client, ClientConfig, Document, HttpClient};
pub use data::{Data, DataValue, EchoData, HtmlData, JsonData};
pub use error::{ClientError, RegistryError, Result, ScrapeError};
pub use extractors::{register_type, Extractor, Selection, TypeRegistry, TypeResolver};
pub use job::{Job, JobStats};
pub use page::{Method, PageRequest, PageScraper, Row, Scraper};
pub use rest::{Pages, RestPage, RestScraper};
pub use schema::{PropertyType, Schema};
pub use stream::StreamRunner;
pub use template::NextUrlTemplate;
pub use value::{Record, Value};
