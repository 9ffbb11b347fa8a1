//! `ZoteroItemLink` — the safety-critical relationship between a URL and
//! a Zotero library item.

use serde::{Deserialize, Serialize};

use super::id::{now_ms, ItemKey, LinkId, UrlId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoteroItemLink {
    pub id: LinkId,
    pub url_id: UrlId,
    pub item_key: ItemKey,
    /// Provenance: was this item created by us, and is it therefore safe
    /// to delete when unreferenced?
    pub created_by_theodore: bool,
    /// Set when an out-of-band detector observes the item changed outside
    /// our control.
    pub user_modified_in_zotero: bool,
    pub linked_at: i64,
}

impl ZoteroItemLink {
    pub fn new(url_id: UrlId, item_key: ItemKey, created_by_theodore: bool) -> Self {
        Self {
            id: LinkId::generate(),
            url_id,
            item_key,
            created_by_theodore,
            user_modified_in_zotero: false,
            linked_at: now_ms(),
        }
    }

    pub fn mark_user_modified(&mut self) {
        self.user_modified_in_zotero = true;
    }
}
