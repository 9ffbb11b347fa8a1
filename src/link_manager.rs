//! `LinkManager` — owns the URL-to-Zotero-item relationship and the one
//! safety-critical rule attached to it: an item may only be deleted when
//! Theodore created it, the user hasn't touched it since, and no other
//! URL still points at it.

use std::sync::Arc;
use tracing::{info, warn};

use crate::collaborators::{Store, StoreError, ZoteroClient, ZoteroError};
use crate::domain::{ItemKey, UrlId, ZoteroItemLink};
use crate::guards::can_delete_zotero_item;
use crate::state::StateManager;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("guard refused: {0}")]
    GuardRefused(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Zotero(#[from] ZoteroError),
}

pub struct LinkManager {
    store: Arc<dyn Store>,
    zotero: Arc<dyn ZoteroClient>,
    state: StateManager,
}

impl LinkManager {
    pub fn new(store: Arc<dyn Store>, zotero: Arc<dyn ZoteroClient>, state: StateManager) -> Self {
        Self { store, zotero, state }
    }

    /// Record a new link and bring `linkedItemCount` up to date on the URL
    /// side. The item side has no local count to maintain — link counts
    /// are always derived by querying the store.
    pub async fn record(&self, url_id: UrlId, item_key: ItemKey, created_by_theodore: bool) -> Result<ZoteroItemLink, LinkError> {
        let link = ZoteroItemLink::new(url_id.clone(), item_key, created_by_theodore);
        self.store.put_link(link.clone()).await?;
        self.refresh_linked_item_count(url_id).await?;
        info!(url_id = %link.url_id, item_key = %link.item_key, "recorded zotero link");
        Ok(link)
    }

    /// Remove a link row without touching Zotero itself.
    pub async fn unlink(&self, url_id: UrlId) -> Result<(), LinkError> {
        for link in self.store.links_for_url(url_id.clone()).await? {
            self.store.delete_link(link.id.clone()).await?;
        }
        self.refresh_linked_item_count(url_id).await?;
        Ok(())
    }

    /// Delete the backing Zotero item, then unlink. Only callable when the
    /// safety guard approves every link that references this item. A
    /// `not_found` delete failure is treated as success-equivalent — the
    /// item is already gone, so the unlink still proceeds. Any other
    /// failure aborts, leaving both the link and the item intact.
    pub async fn delete_item_and_unlink(&self, url_id: UrlId, item_key: ItemKey) -> Result<(), LinkError> {
        let links = self.store.links_for_item(item_key.clone()).await?;
        let Some(link) = links.iter().find(|l| l.url_id == url_id) else {
            return Err(LinkError::GuardRefused("url has no link to this item".into()));
        };
        let verdict = can_delete_zotero_item(link, &links);
        if !verdict.allowed {
            return Err(LinkError::GuardRefused(verdict.reason.unwrap_or_default()));
        }

        match self.zotero.delete_item(&item_key).await {
            Ok(()) => {}
            Err(ZoteroError::Http { status: 404, .. }) => {
                warn!(item_key = %item_key, "item already absent from zotero, proceeding with unlink");
            }
            Err(ZoteroError::Api(message)) if message.to_lowercase().contains("not found") => {
                warn!(item_key = %item_key, "item already absent from zotero, proceeding with unlink");
            }
            Err(other) => return Err(LinkError::Zotero(other)),
        }

        self.store.delete_link(link.id.clone()).await?;
        self.refresh_linked_item_count(url_id).await?;
        Ok(())
    }

    /// Flag a link as having been edited outside Theodore's control,
    /// blocking future deletion via [`LinkManager::delete_item_and_unlink`].
    pub async fn mark_user_modified(&self, item_key: ItemKey) -> Result<(), LinkError> {
        for link in self.store.links_for_item(item_key).await? {
            let mut link = link;
            link.mark_user_modified();
            self.store.put_link(link).await?;
        }
        Ok(())
    }

    async fn refresh_linked_item_count(&self, url_id: UrlId) -> Result<(), LinkError> {
        let count = self.store.links_for_url(url_id.clone()).await?.len() as u32;
        self.state
            .set_linked_item_count(url_id, count)
            .await
            .map_err(|e| LinkError::GuardRefused(e.to_string()))?;
        Ok(())
    }
}
