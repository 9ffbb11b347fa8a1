//! `Url` — the record the whole core revolves around.

use serde::{Deserialize, Serialize};

use super::attempt::{ProcessingAttempt, Stage};
use super::id::{now_ms, UrlId};
use super::status::{ProcessingStatus, UserIntent};

/// The URL entity owned by the core.
///
/// `processingAttempts`, `processingHistory` and `lastProcessingMethod`
/// are kept consistent by [`Url::append_attempt`] — the only way callers
/// should mutate history, so the invariant `processingAttempts =
/// count(history where stage not in {transition, manual})` can never
/// drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Url {
    pub id: UrlId,
    pub url: String,
    pub processing_status: ProcessingStatus,
    pub user_intent: UserIntent,
    pub processing_attempts: u32,
    pub processing_history: Vec<ProcessingAttempt>,
    pub last_processing_method: Option<String>,
    pub linked_item_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Url {
    /// Create a new URL in `not_started`, as the ingestion collaborator
    /// does.
    pub fn new(url: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: UrlId::generate(),
            url: url.into(),
            processing_status: ProcessingStatus::NotStarted,
            user_intent: UserIntent::Auto,
            processing_attempts: 0,
            processing_history: Vec::new(),
            last_processing_method: None,
            linked_item_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Construct with a specific id, for tests and fixture loading.
    pub fn with_id(id: UrlId, url: impl Into<String>) -> Self {
        let mut record = Self::new(url);
        record.id = id;
        record
    }

    /// Append an entry to `processingHistory`, maintaining
    /// `processingAttempts` and `lastProcessingMethod` together so they
    /// can never diverge from the history that produced them.
    pub fn append_attempt(&mut self, attempt: ProcessingAttempt) {
        if attempt.stage.counts_toward_attempts() {
            self.processing_attempts += 1;
            self.last_processing_method = Some(attempt.method.clone());
        }
        self.processing_history.push(attempt);
        self.updated_at = now_ms();
    }

    /// Zero attempt bookkeeping, used by `reset`. History itself is left
    /// untouched here — callers decide whether to truncate via
    /// [`Url::truncate_history`].
    pub fn clear_attempt_counters(&mut self) {
        self.processing_attempts = 0;
        self.last_processing_method = None;
        self.updated_at = now_ms();
    }

    /// Drop all history, used only when `reset(preserveHistory=false)`.
    pub fn truncate_history(&mut self) {
        self.processing_history.clear();
    }

    pub fn set_status(&mut self, status: ProcessingStatus) {
        self.processing_status = status;
        self.updated_at = now_ms();
    }

    pub fn set_intent(&mut self, intent: UserIntent) {
        self.user_intent = intent;
        self.updated_at = now_ms();
    }

    pub fn set_linked_item_count(&mut self, count: u32) {
        self.linked_item_count = count;
        self.updated_at = now_ms();
    }

    /// The last attempt of the given stage, most recent first — used by
    /// `exhausted`'s "carries the last error category and message"
    /// requirement.
    pub fn last_attempt_for_stage(&self, stage: Stage) -> Option<&ProcessingAttempt> {
        self.processing_history.iter().rev().find(|a| a.stage == stage)
    }

    /// Whether "stored-family implies at least one link" currently holds.
    /// Exposed for tests and debug assertions; the orchestrator never
    /// relies on this to make decisions, only to check itself.
    pub fn satisfies_link_invariant(&self) -> bool {
        if self.processing_status.is_stored_family() {
            self.linked_item_count >= 1
        } else {
            true
        }
    }

    /// Whether "`not_started` implies zero attempts and no last method"
    /// currently holds.
    pub fn satisfies_not_started_invariant(&self) -> bool {
        if self.processing_status == ProcessingStatus::NotStarted {
            self.processing_attempts == 0 && self.last_processing_method.is_none()
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_url_satisfies_invariants() {
        let url = Url::new("https://example.com/paper");
        assert_eq!(url.processing_status, ProcessingStatus::NotStarted);
        assert_eq!(url.processing_attempts, 0);
        assert!(url.last_processing_method.is_none());
        assert!(url.satisfies_not_started_invariant());
        assert!(url.satisfies_link_invariant());
    }

    #[test]
    fn append_attempt_increments_counter_for_stage_results_only() {
        let mut url = Url::new("https://example.com");
        url.append_attempt(ProcessingAttempt::stage_result(Stage::ZoteroIdentifier, "doi", true));
        assert_eq!(url.processing_attempts, 1);
        assert_eq!(url.last_processing_method.as_deref(), Some("doi"));

        url.append_attempt(ProcessingAttempt::transition("start", ProcessingStatus::NotStarted, ProcessingStatus::ProcessingZotero));
        assert_eq!(url.processing_attempts, 1, "transition entries must not bump the counter");
        assert_eq!(url.last_processing_method.as_deref(), Some("doi"), "transition entries must not overwrite the last method");
    }

    #[test]
    fn clear_attempt_counters_restores_not_started_invariant() {
        let mut url = Url::new("https://example.com");
        url.append_attempt(ProcessingAttempt::stage_result(Stage::ContentExtraction, "meta-tag", false));
        url.set_status(ProcessingStatus::ProcessingContent);
        url.clear_attempt_counters();
        url.set_status(ProcessingStatus::NotStarted);
        assert!(url.satisfies_not_started_invariant());
    }

    #[test]
    fn stored_without_link_violates_invariant() {
        let mut url = Url::new("https://example.com");
        url.set_status(ProcessingStatus::Stored);
        assert!(!url.satisfies_link_invariant());
        url.set_linked_item_count(1);
        assert!(url.satisfies_link_invariant());
    }
}
