//! `ZoteroClient` — the local Zotero library collaborator. Shaped after
//! the connector-API contract in the retrieved pack's `ZoteroClient`
//! trait (`fetch_items`/item-CRUD over a library), narrowed to the
//! lookup/create/validate operations the cascade actually needs.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CitationValidation, ExtractedMetadata, IdentifierKind, ItemKey};
use crate::errors::{RawError, RawErrorKind};

#[derive(Debug, Error)]
pub enum ZoteroError {
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("zotero api error: {0}")]
    Api(String),
}

impl From<&ZoteroError> for RawError {
    fn from(err: &ZoteroError) -> Self {
        match err {
            ZoteroError::Http { status, message } => {
                RawError::new(RawErrorKind::Http, message.clone()).with_status(*status)
            }
            ZoteroError::Network(message) => RawError::new(RawErrorKind::Network, message.clone()),
            ZoteroError::Api(message) => RawError::new(RawErrorKind::Zotero, message.clone()),
        }
    }
}

/// Outcome of an identifier or URL lookup against the local library.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum ZoteroLookupOutcome {
    /// Exactly one candidate item; safe to link automatically.
    Found(ItemKey),
    /// More than one candidate item already in the library. The
    /// orchestrator treats this the same as `NotFound` and cascades to
    /// content-based disambiguation rather than exposing a second,
    /// item-key-shaped selection flow alongside the identifier one.
    Ambiguous(Vec<ItemKey>),
    /// No candidate at all.
    NotFound,
}

#[async_trait]
pub trait ZoteroClient: Send + Sync {
    async fn process_identifier(
        &self,
        kind: IdentifierKind,
        value: &str,
    ) -> Result<ZoteroLookupOutcome, ZoteroError>;

    async fn process_url(&self, url: &str) -> Result<ZoteroLookupOutcome, ZoteroError>;

    async fn create_item(&self, metadata: &ExtractedMetadata) -> Result<ItemKey, ZoteroError>;

    async fn update_item(&self, key: &ItemKey, metadata: &ExtractedMetadata) -> Result<(), ZoteroError>;

    async fn get_item(&self, key: &ItemKey) -> Result<Option<ExtractedMetadata>, ZoteroError>;

    /// Delete an item. Deleting an item that no longer exists is treated
    /// as success by callers (`LinkManager::delete_item_and_unlink`), not
    /// surfaced as an error here.
    async fn delete_item(&self, key: &ItemKey) -> Result<(), ZoteroError>;

    async fn validate_citation(&self, key: &ItemKey) -> Result<CitationValidation, ZoteroError>;
}
