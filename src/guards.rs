//! State guards — pure predicates over `(&Url, &[ZoteroItemLink])`. No
//! I/O, no `async`, no `Result`: a guard can only disallow, never fail.

use crate::domain::{ProcessingStatus, Url, UserIntent, ZoteroItemLink};

/// The outcome of a single guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardResult {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl GuardResult {
    pub fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

/// An action the orchestrator or UI may offer for a URL, ranked roughly
/// by how directly it advances processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StartProcessing,
    Retry,
    SelectIdentifier,
    ApproveMetadata,
    RejectMetadata,
    EditCitation,
    Unlink,
    DeleteItem,
    Reset,
    SetIntent,
    Archive,
    Ignore,
}

/// Can a fresh cascade be started for this URL?
pub fn can_start_processing(url: &Url) -> GuardResult {
    if url.user_intent == UserIntent::Ignore || url.user_intent == UserIntent::Archive {
        return GuardResult::deny("user intent excludes automatic processing");
    }
    if url.processing_status.is_startable() {
        GuardResult::allow()
    } else {
        GuardResult::deny(format!("status {} is not startable", url.processing_status))
    }
}

/// Can the URL be retried in place (only meaningful while a stage is
/// actively running and deciding whether to retry after a retryable
/// failure)?
pub fn can_retry(url: &Url) -> GuardResult {
    if url.processing_status.is_transient() {
        GuardResult::allow()
    } else {
        GuardResult::deny("url is not mid-cascade")
    }
}

/// Can the user select one of several ambiguous identifiers?
pub fn can_select_identifier(url: &Url) -> GuardResult {
    if url.processing_status == ProcessingStatus::AwaitingSelection {
        GuardResult::allow()
    } else {
        GuardResult::deny("url is not awaiting a selection")
    }
}

/// Can the user approve pending extracted metadata?
pub fn can_approve_metadata(url: &Url) -> GuardResult {
    if url.processing_status == ProcessingStatus::AwaitingMetadata {
        GuardResult::allow()
    } else {
        GuardResult::deny("url is not awaiting metadata approval")
    }
}

/// Can the user reject pending extracted metadata?
pub fn can_reject_metadata(url: &Url) -> GuardResult {
    can_approve_metadata(url)
}

/// Can the linked citation be edited? Only once it's actually stored.
pub fn can_edit_citation(url: &Url) -> GuardResult {
    if url.processing_status.is_stored_family() {
        GuardResult::allow()
    } else {
        GuardResult::deny("url has no stored citation to edit")
    }
}

/// Can the URL be unlinked from its current Zotero item(s)?
pub fn can_unlink(url: &Url) -> GuardResult {
    if url.linked_item_count > 0 {
        GuardResult::allow()
    } else {
        GuardResult::deny("url has no linked items")
    }
}

/// The single safety-critical guard: a Zotero item may only be deleted
/// by us if we created it, the user hasn't edited it since, and no other
/// URL still links to the same `itemKey`. Anything else risks destroying
/// a library item the user cares about. `links` is every link row that
/// references `link.item_key`, `link` included.
pub fn can_delete_zotero_item(link: &ZoteroItemLink, links: &[ZoteroItemLink]) -> GuardResult {
    if !link.created_by_theodore {
        return GuardResult::deny("item was not created by this tool");
    }
    if link.user_modified_in_zotero {
        return GuardResult::deny("item was modified by the user since it was linked");
    }
    if links.iter().any(|l| l.item_key == link.item_key && l.url_id != link.url_id) {
        return GuardResult::deny("shared");
    }
    GuardResult::allow()
}

/// Can the URL be reset back to `not_started`? The universal escape
/// hatch — always allowed regardless of current status, including a
/// stuck `processing_*` stage or `not_started` itself (a no-op there).
pub fn can_reset(_url: &Url) -> GuardResult {
    GuardResult::allow()
}

/// Can the user's intent be changed right now? Always true except while
/// a stage is actively in flight, to avoid racing the cascade.
pub fn can_set_intent(url: &Url) -> GuardResult {
    if url.processing_status.is_transient() {
        GuardResult::deny("cannot change intent while a stage is in flight")
    } else {
        GuardResult::allow()
    }
}

/// Can the URL be archived?
pub fn can_archive(url: &Url) -> GuardResult {
    if url.processing_status == ProcessingStatus::Archived {
        GuardResult::deny("url is already archived")
    } else {
        GuardResult::allow()
    }
}

/// Can the URL be ignored?
pub fn can_ignore(url: &Url) -> GuardResult {
    if url.processing_status.is_transient() {
        GuardResult::deny("cannot ignore while a stage is in flight")
    } else {
        GuardResult::allow()
    }
}

/// Can the user manually create a Zotero item for this URL (the
/// exhausted-cascade fallback)?
pub fn can_manual_create(url: &Url) -> GuardResult {
    if url.processing_status == ProcessingStatus::Exhausted {
        GuardResult::allow()
    } else {
        GuardResult::deny("manual creation is only offered once the cascade is exhausted")
    }
}

/// Can the LLM extraction stage run, given configuration and content
/// already fetched?
pub fn can_use_llm(llm_enabled: bool, has_content: bool) -> GuardResult {
    if !llm_enabled {
        GuardResult::deny("no LLM provider configured")
    } else if !has_content {
        GuardResult::deny("no content available to extract from")
    } else {
        GuardResult::allow()
    }
}

/// Fold every guard into the list of actions currently available for a
/// URL and its links, ranked roughly by how directly each advances
/// processing.
pub fn available_actions(url: &Url, links: &[ZoteroItemLink]) -> Vec<Action> {
    let mut actions = Vec::new();

    if can_start_processing(url).allowed {
        actions.push(Action::StartProcessing);
    }
    if can_retry(url).allowed {
        actions.push(Action::Retry);
    }
    if can_select_identifier(url).allowed {
        actions.push(Action::SelectIdentifier);
    }
    if can_approve_metadata(url).allowed {
        actions.push(Action::ApproveMetadata);
    }
    if can_reject_metadata(url).allowed {
        actions.push(Action::RejectMetadata);
    }
    if can_edit_citation(url).allowed {
        actions.push(Action::EditCitation);
    }
    if can_unlink(url).allowed {
        actions.push(Action::Unlink);
    }
    if links.iter().any(|l| can_delete_zotero_item(l, links).allowed) {
        actions.push(Action::DeleteItem);
    }
    if can_reset(url).allowed {
        actions.push(Action::Reset);
    }
    if can_set_intent(url).allowed {
        actions.push(Action::SetIntent);
    }
    if can_archive(url).allowed {
        actions.push(Action::Archive);
    }
    if can_ignore(url).allowed {
        actions.push(Action::Ignore);
    }

    actions
}
