//! URL-to-citation processing core: an orchestrated, auto-cascading
//! pipeline that turns a raw web URL into a bibliographic record stored
//! in a local Zotero library.
//!
//! The crate is organized around four layers: [`domain`] (plain records
//! and the closed status enum), [`state`] (the single writer of
//! processing status), [`orchestrator`] (the stage-to-stage cascade) and
//! [`batch`] (bounded-concurrency fan-out over many URLs). [`guards`]
//! sits underneath all of them as the pure predicate layer the UI and
//! orchestrator both consult before attempting an action.

pub mod batch;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod errors;
pub mod guards;
pub mod link_manager;
pub mod orchestrator;
pub mod state;

pub use batch::{BatchError, BatchOptions, BatchProcessor, BatchSession, BatchSnapshot, BatchStatus, BatchUrlResult};
pub use collaborators::{ContentFetcher, FetchError, FetchedContent, LlmError, LlmExtractor, Store, StoreError, UrlFilter, ZoteroClient, ZoteroError, ZoteroLookupOutcome};
pub use config::{CoreConfig, LlmProvider};
pub use domain::{
    now_ms, CitationValidation, ExtractedMetadata, Identifier, IdentifierKind, ItemKey, LinkId, ProcessingAttempt,
    ProcessingCapability, ProcessingStatus, SessionId, Stage, TransitionRecord, Url, UrlId, UserIntent, ZoteroItemLink,
};
pub use errors::{backoff_delay, classify, ErrorCategory, ProcessingError, ProcessingFailure, RawError, RawErrorKind};
pub use guards::{
    available_actions, can_approve_metadata, can_archive, can_delete_zotero_item, can_edit_citation, can_ignore,
    can_manual_create, can_reject_metadata, can_reset, can_retry, can_select_identifier, can_set_intent,
    can_start_processing, can_unlink, can_use_llm, Action, GuardResult,
};
pub use link_manager::{LinkError, LinkManager};
pub use orchestrator::{score_metadata, ProcessingOrchestrator, ProcessingOutcome, ProcessingResult, AUTO_APPROVE_THRESHOLD};
pub use state::{check_transition, is_legal_transition, validate_transition_graph, StateError, StateHooks, StateManager, TransitionError};

/// Run the startup checks every binary embedding this core should
/// perform before serving traffic: the transition graph must be
/// internally consistent, or state transitions could silently wedge.
pub fn validate_startup_invariants() -> Result<(), String> {
    validate_transition_graph()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_invariants_hold() {
        assert!(validate_startup_invariants().is_ok());
    }
}
