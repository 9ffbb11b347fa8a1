//! `LlmExtractor` — the metadata-extraction collaborator. Stateless per
//! call: no conversation state is kept between extraction attempts.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ExtractedMetadata;
use crate::errors::{RawError, RawErrorKind};

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("rate limited")]
    RateLimited,
    #[error("the provider returned an unusable response: {0}")]
    InvalidResponse(String),
    #[error("network error: {0}")]
    Network(String),
}

impl From<&LlmError> for RawError {
    fn from(err: &LlmError) -> Self {
        match err {
            LlmError::Http { status, message } => {
                RawError::new(RawErrorKind::Http, message.clone()).with_status(*status)
            }
            LlmError::RateLimited => RawError::new(RawErrorKind::Http, "rate limited").with_status(429),
            LlmError::InvalidResponse(message) => RawError::new(RawErrorKind::Parsing, message.clone()),
            LlmError::Network(message) => RawError::new(RawErrorKind::Network, message.clone()),
        }
    }
}

#[async_trait]
pub trait LlmExtractor: Send + Sync {
    /// Extract bibliographic metadata from fetched page content. A single
    /// call, no streaming — the cascade only needs the final structured
    /// result.
    async fn extract(&self, content: &str) -> Result<ExtractedMetadata, LlmError>;
}
