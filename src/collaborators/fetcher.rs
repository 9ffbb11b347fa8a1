//! `ContentFetcher` — retrieves a URL's content so the content-extraction
//! stage can scrape identifiers out of it without the core knowing
//! anything about HTTP, headless rendering, or PDF parsing.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Identifier, IdentifierKind};
use crate::errors::{RawError, RawErrorKind};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("could not parse content: {0}")]
    Parsing(String),
}

impl From<&FetchError> for RawError {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::Http { status, message } => {
                RawError::new(RawErrorKind::Http, message.clone()).with_status(*status)
            }
            FetchError::Network(message) => RawError::new(RawErrorKind::Network, message.clone()),
            FetchError::Parsing(message) => RawError::new(RawErrorKind::Parsing, message.clone()),
        }
    }
}

/// Fetched content plus whatever identifiers a cheap scan could pull out
/// of it (meta tags, DOI-shaped substrings) before the LLM stage is asked
/// to do deeper extraction.
#[derive(Debug, Clone, Default)]
pub struct FetchedContent {
    pub text: String,
    pub is_pdf: bool,
    pub scraped_identifiers: Vec<Identifier>,
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError>;
}
