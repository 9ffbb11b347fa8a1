//! `Store` — the persistence collaborator. Owns no policy; it is a plain
//! CRUD boundary the `StateManager` actor calls through after a transition
//! has already been validated.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{LinkId, ProcessingStatus, Url, UrlId, ZoteroItemLink};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("url not found: {0}")]
    UrlNotFound(UrlId),

    #[error("link not found: {0}")]
    LinkNotFound(LinkId),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Narrows a `list_urls` call. `None` fields mean "don't filter on this".
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    pub status: Option<ProcessingStatus>,
    pub startable_only: bool,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_url(&self, id: UrlId) -> Result<Option<Url>, StoreError>;
    async fn put_url(&self, url: Url) -> Result<(), StoreError>;
    async fn list_urls(&self, filter: &UrlFilter) -> Result<Vec<Url>, StoreError>;

    async fn get_link(&self, id: LinkId) -> Result<Option<ZoteroItemLink>, StoreError>;
    async fn put_link(&self, link: ZoteroItemLink) -> Result<(), StoreError>;
    async fn delete_link(&self, id: LinkId) -> Result<(), StoreError>;
    async fn links_for_url(&self, url_id: UrlId) -> Result<Vec<ZoteroItemLink>, StoreError>;
    async fn links_for_item(&self, item_key: crate::domain::ItemKey) -> Result<Vec<ZoteroItemLink>, StoreError>;
}
