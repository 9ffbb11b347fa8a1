//! `ProcessingOrchestrator` — the cascade. Stage-to-stage hand-off: each
//! stage either resolves the URL, hands off to the next stage, or stops
//! at a status the user must act on. Retry-in-place for transient
//! failures uses exponential backoff bounded by each error category's own
//! retry budget, scoped per stage rather than per whole cascade.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::collaborators::{ContentFetcher, FetchedContent, LlmExtractor, Store, ZoteroClient, ZoteroLookupOutcome};
use crate::config::{CoreConfig, LlmProvider};
use crate::domain::{ExtractedMetadata, Identifier, IdentifierKind, ItemKey, ProcessingAttempt, ProcessingStatus, Stage, Url, UrlId, UserIntent};
use crate::errors::{backoff_delay, classify, ErrorCategory, ProcessingFailure, RawError};
use crate::guards::{can_manual_create, can_use_llm};
use crate::link_manager::LinkManager;
use crate::state::StateManager;

/// How far `process()` got and, for terminal outcomes, what it settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// `userIntent` excluded this URL from automatic processing.
    Skipped,
    /// A fresh cascade was rejected because the URL isn't in a startable status.
    Refused,
    /// The cascade reached a stored status without user input.
    Done,
    /// The cascade stopped at a status the user must act on.
    PendingUser,
    /// Every stage failed or the cascade reached `exhausted`.
    Failed,
    /// Another task is already processing this URL.
    AlreadyInFlight,
}

#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub outcome: ProcessingOutcome,
    pub final_status: Option<ProcessingStatus>,
    pub item_key: Option<ItemKey>,
    pub stages_attempted: Vec<Stage>,
    pub error: Option<ProcessingFailure>,
}

impl ProcessingResult {
    fn skipped() -> Self {
        Self { outcome: ProcessingOutcome::Skipped, final_status: None, item_key: None, stages_attempted: Vec::new(), error: None }
    }

    fn refused(status: ProcessingStatus) -> Self {
        Self { outcome: ProcessingOutcome::Refused, final_status: Some(status), item_key: None, stages_attempted: Vec::new(), error: None }
    }

    fn already_in_flight() -> Self {
        Self { outcome: ProcessingOutcome::AlreadyInFlight, final_status: None, item_key: None, stages_attempted: Vec::new(), error: None }
    }

    fn done(status: ProcessingStatus, item_key: ItemKey, stages_attempted: Vec<Stage>) -> Self {
        Self { outcome: ProcessingOutcome::Done, final_status: Some(status), item_key: Some(item_key), stages_attempted, error: None }
    }

    fn pending_user(status: ProcessingStatus, stages_attempted: Vec<Stage>) -> Self {
        Self { outcome: ProcessingOutcome::PendingUser, final_status: Some(status), item_key: None, stages_attempted, error: None }
    }

    fn failed(error: ProcessingFailure, stages_attempted: Vec<Stage>) -> Self {
        Self { outcome: ProcessingOutcome::Failed, final_status: Some(ProcessingStatus::Exhausted), item_key: None, stages_attempted, error: Some(error) }
    }
}

/// Run `make_attempt` up to the failure category's retry budget, sleeping
/// `backoff_delay` between attempts. Returns the classified failure once
/// the budget is exhausted; a non-retryable category fails on the first
/// attempt.
async fn retry_stage<T, E, F, Fut>(mut make_attempt: F) -> Result<T, (ErrorCategory, String)>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    for<'a> RawError: From<&'a E>,
{
    let mut attempt_num: u32 = 1;
    loop {
        match make_attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let raw = RawError::from(&err);
                let category = classify(&raw);
                let message = raw.message.clone();
                if category.is_retryable() && attempt_num < category.max_attempts() {
                    let delay = backoff_delay(category, attempt_num);
                    debug!(%category, attempt_num, delay_ms = delay.as_millis() as u64, "retrying stage after transient failure");
                    tokio::time::sleep(delay).await;
                    attempt_num += 1;
                    continue;
                }
                return Err((category, message));
            }
        }
    }
}

/// Weights for the required-field quality score: title 20, authors 20,
/// year 15, identifier 10, venue 10, abstract 10, with the remaining 15
/// points split across doi presence and multi-author completeness.
pub fn score_metadata(metadata: &ExtractedMetadata) -> u8 {
    let mut score: u32 = 0;
    if metadata.title.as_deref().is_some_and(|t| !t.trim().is_empty()) {
        score += 20;
    }
    if !metadata.authors.is_empty() {
        score += 20;
    }
    if metadata.year.is_some() {
        score += 15;
    }
    if !metadata.identifiers.is_empty() || metadata.doi.is_some() {
        score += 10;
    }
    if metadata.venue.is_some() {
        score += 10;
    }
    if metadata.abstract_text.is_some() {
        score += 10;
    }
    if metadata.doi.is_some() {
        score += 5;
    }
    if metadata.authors.len() > 1 {
        score += 10;
    }
    score.min(100) as u8
}

/// A score at or above this auto-promotes `awaiting_metadata` straight to
/// a stored status instead of waiting on user approval.
pub const AUTO_APPROVE_THRESHOLD: u8 = 80;

/// Picks the highest-priority identifier out of a scraped set, per
/// `identifierPriority` in configuration.
fn pick_best_identifier(identifiers: &[Identifier], priority: &[IdentifierKind]) -> Option<Identifier> {
    priority
        .iter()
        .find_map(|kind| identifiers.iter().find(|i| i.kind == *kind))
        .cloned()
        .or_else(|| identifiers.first().cloned())
}

enum StageOutcome {
    Linked(ItemKey),
    Cascade,
    NonCascading(ProcessingFailure),
}

pub struct ProcessingOrchestrator {
    state: StateManager,
    links: LinkManager,
    zotero: Arc<dyn ZoteroClient>,
    fetcher: Arc<dyn ContentFetcher>,
    llm: Arc<dyn LlmExtractor>,
    config: CoreConfig,
    in_flight: Mutex<HashSet<UrlId>>,
}

impl ProcessingOrchestrator {
    pub fn new(
        state: StateManager,
        store: Arc<dyn Store>,
        zotero: Arc<dyn ZoteroClient>,
        fetcher: Arc<dyn ContentFetcher>,
        llm: Arc<dyn LlmExtractor>,
        config: CoreConfig,
    ) -> Self {
        let links = LinkManager::new(store, zotero.clone(), state.clone());
        Self { state, links, zotero, fetcher, llm, config, in_flight: Mutex::new(HashSet::new()) }
    }

    /// Run the full cascade for a single URL. At most one call per
    /// `UrlId` is allowed to be in flight at once; a concurrent second
    /// call is refused immediately rather than queued.
    pub async fn process(&self, url_id: UrlId) -> ProcessingResult {
        if !self.in_flight.lock().unwrap().insert(url_id.clone()) {
            warn!(url_id = %url_id, "process: refusing concurrent cascade for url already in flight");
            return ProcessingResult::already_in_flight();
        }
        let result = self.run_cascade(url_id.clone()).await;
        self.in_flight.lock().unwrap().remove(&url_id);
        result
    }

    async fn run_cascade(&self, url_id: UrlId) -> ProcessingResult {
        let url = match self.state.get_url_required(url_id.clone()).await {
            Ok(url) => url,
            Err(e) => return ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Unknown, e.to_string()), Vec::new()),
        };

        if url.user_intent == UserIntent::Ignore || url.user_intent == UserIntent::Archive {
            return ProcessingResult::skipped();
        }
        if !url.processing_status.is_startable() {
            return ProcessingResult::refused(url.processing_status);
        }

        let mut stages = Vec::new();
        let current = url.processing_status;

        // Stage 1: Zotero-direct.
        if self.transition(&url_id, current, ProcessingStatus::ProcessingZotero, "start").await.is_err() {
            return ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Unknown, "failed to enter processing_zotero"), stages);
        }
        stages.push(Stage::ZoteroUrl);

        match self.run_zotero_stage(&url_id, &url.url, None).await {
            StageOutcome::Linked(item_key) => return self.finish_via_zotero_link(&url_id, item_key, ProcessingStatus::ProcessingZotero, stages).await,
            StageOutcome::NonCascading(failure) => {
                let _ = self.transition(&url_id, ProcessingStatus::ProcessingZotero, ProcessingStatus::Exhausted, "zotero-non-cascading").await;
                return ProcessingResult::failed(failure, stages);
            }
            StageOutcome::Cascade => {}
        }

        // Stage 2: content-based identifier scraping.
        if self.transition(&url_id, ProcessingStatus::ProcessingZotero, ProcessingStatus::ProcessingContent, "cascade-to-content").await.is_err() {
            return ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Unknown, "failed to enter processing_content"), stages);
        }
        stages.push(Stage::ContentExtraction);

        let content = match self.run_content_stage(&url_id, &url.url).await {
            Ok(content) => content,
            Err(failure) => {
                let _ = self.transition(&url_id, ProcessingStatus::ProcessingContent, ProcessingStatus::Exhausted, "content-exhausted").await;
                return ProcessingResult::failed(failure, stages);
            }
        };

        let mut ordered = content.scraped_identifiers.clone();
        ordered.sort_by_key(|i| self.config.identifier_priority.iter().position(|k| *k == i.kind).unwrap_or(usize::MAX));

        if ordered.len() >= 2 {
            let _ = self.transition(&url_id, ProcessingStatus::ProcessingContent, ProcessingStatus::AwaitingSelection, "ambiguous-identifiers").await;
            return ProcessingResult::pending_user(ProcessingStatus::AwaitingSelection, stages);
        }

        if let Some(identifier) = pick_best_identifier(&ordered, &self.config.identifier_priority) {
            return self.promote_to_zotero(&url_id, &url.url, identifier, stages).await;
        }

        // Stage 3: LLM metadata extraction.
        let has_content = content.is_pdf || !content.text.trim().is_empty();
        let llm_enabled = self.config.llm_provider != LlmProvider::Disabled;
        if !can_use_llm(llm_enabled, has_content).allowed {
            let _ = self.transition(&url_id, ProcessingStatus::ProcessingContent, ProcessingStatus::Exhausted, "no-llm-available").await;
            return ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Permanent, "no llm provider configured or no content to extract from"), stages);
        }

        if self.transition(&url_id, ProcessingStatus::ProcessingContent, ProcessingStatus::ProcessingLlm, "cascade-to-llm").await.is_err() {
            return ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Unknown, "failed to enter processing_llm"), stages);
        }
        stages.push(Stage::Llm);

        match self.run_llm_stage(&url_id, &content.text).await {
            Ok(metadata) => self.settle_metadata(&url_id, ProcessingStatus::ProcessingLlm, metadata, stages).await,
            Err(failure) => {
                let _ = self.transition(&url_id, ProcessingStatus::ProcessingLlm, ProcessingStatus::Exhausted, "llm-exhausted").await;
                ProcessingResult::failed(failure, stages)
            }
        }
    }

    /// Stage 2 found exactly one identifier: re-enter stage 1 with it
    /// promoted, per the "same success/fail handling" re-entry rule. A
    /// lookup that still comes up empty falls back to content's own
    /// continuation (the LLM stage), not a special-cased failure.
    async fn promote_to_zotero(&self, url_id: &UrlId, url: &str, identifier: Identifier, mut stages: Vec<Stage>) -> ProcessingResult {
        if self.transition(url_id, ProcessingStatus::ProcessingContent, ProcessingStatus::ProcessingZotero, "promote-identifier").await.is_err() {
            return ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Unknown, "failed to re-enter processing_zotero"), stages);
        }
        stages.push(Stage::ZoteroIdentifier);

        match self.run_zotero_stage(url_id, url, Some(identifier)).await {
            StageOutcome::Linked(item_key) => self.finish_via_zotero_link(url_id, item_key, ProcessingStatus::ProcessingZotero, stages).await,
            StageOutcome::NonCascading(failure) => {
                let _ = self.transition(url_id, ProcessingStatus::ProcessingZotero, ProcessingStatus::Exhausted, "zotero-non-cascading").await;
                ProcessingResult::failed(failure, stages)
            }
            StageOutcome::Cascade => {
                if self.transition(url_id, ProcessingStatus::ProcessingZotero, ProcessingStatus::Exhausted, "promoted-lookup-empty").await.is_err() {
                    return ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Unknown, "failed to enter exhausted"), stages);
                }
                ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Permanent, "promoted identifier did not resolve to any item"), stages)
            }
        }
    }

    async fn finish_via_zotero_link(&self, url_id: &UrlId, item_key: ItemKey, from: ProcessingStatus, stages: Vec<Stage>) -> ProcessingResult {
        let validation = match self.zotero.validate_citation(&item_key).await {
            Ok(v) => v,
            Err(e) => return ProcessingResult::failed(ProcessingFailure::from_raw(&RawError::from(&e)), stages),
        };
        if let Err(e) = self.links.record(url_id.clone(), item_key.clone(), true).await {
            return ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Unknown, e.to_string()), stages);
        }

        let final_status = if validation.has_required_fields { ProcessingStatus::Stored } else { ProcessingStatus::StoredIncomplete };
        if self.transition(url_id, from, final_status, "linked").await.is_err() {
            return ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Unknown, "failed to record final status"), stages);
        }
        ProcessingResult::done(final_status, item_key, stages)
    }

    /// Common tail of the content and LLM metadata paths: enter
    /// `awaiting_metadata`, then immediately promote to a stored status
    /// if the quality score clears the auto-approve threshold.
    async fn settle_metadata(&self, url_id: &UrlId, from: ProcessingStatus, metadata: ExtractedMetadata, mut stages: Vec<Stage>) -> ProcessingResult {
        if self.transition(url_id, from, ProcessingStatus::AwaitingMetadata, "metadata-extracted").await.is_err() {
            return ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Unknown, "failed to enter awaiting_metadata"), stages);
        }

        let score = score_metadata(&metadata);
        if score < AUTO_APPROVE_THRESHOLD {
            return ProcessingResult::pending_user(ProcessingStatus::AwaitingMetadata, stages);
        }

        let item_key = match self.zotero.create_item(&metadata).await {
            Ok(key) => key,
            Err(e) => {
                let _ = self.transition(url_id, ProcessingStatus::AwaitingMetadata, ProcessingStatus::Exhausted, "create-item-failed").await;
                return ProcessingResult::failed(ProcessingFailure::from_raw(&RawError::from(&e)), stages);
            }
        };
        stages.push(Stage::Llm);
        self.finish_via_zotero_link(url_id, item_key, ProcessingStatus::AwaitingMetadata, stages).await
    }

    /// Run the Zotero lookup (direct-by-url or promoted/selected-by-identifier)
    /// and record its `zotero_url`/`zotero_identifier` stage result — success
    /// with the resolved item key, or failure with the classified error —
    /// before returning. Every call site gets this for free, including
    /// re-entries (`promote_to_zotero`, `select_identifier`), so a promoted
    /// identifier always counts as a fresh attempt.
    async fn run_zotero_stage(&self, url_id: &UrlId, url: &str, override_identifier: Option<Identifier>) -> StageOutcome {
        let (stage, method) = match &override_identifier {
            Some(identifier) => (Stage::ZoteroIdentifier, identifier.kind.to_string().to_lowercase()),
            None => (Stage::ZoteroUrl, "url".to_string()),
        };

        let zotero = self.zotero.clone();
        let lookup = match override_identifier {
            Some(identifier) => {
                retry_stage(move || {
                    let zotero = zotero.clone();
                    let identifier = identifier.clone();
                    async move { zotero.process_identifier(identifier.kind, &identifier.value).await }
                })
                .await
            }
            None => {
                let url = url.to_string();
                retry_stage(move || {
                    let zotero = zotero.clone();
                    let url = url.clone();
                    async move { zotero.process_url(&url).await }
                })
                .await
            }
        };

        let outcome = match lookup {
            Ok(ZoteroLookupOutcome::Found(key)) => StageOutcome::Linked(key),
            Ok(ZoteroLookupOutcome::Ambiguous(_)) | Ok(ZoteroLookupOutcome::NotFound) => StageOutcome::Cascade,
            Err((category, message)) => {
                if category.cascades() {
                    StageOutcome::Cascade
                } else {
                    StageOutcome::NonCascading(ProcessingFailure::new(category, message))
                }
            }
        };

        let attempt = match &outcome {
            StageOutcome::Linked(key) => ProcessingAttempt::stage_result(stage, method, true).with_item_key(key.clone()),
            StageOutcome::Cascade => ProcessingAttempt::stage_result(stage, method, false),
            StageOutcome::NonCascading(failure) => {
                ProcessingAttempt::stage_result(stage, method, false).with_error(failure.category, failure.message.clone())
            }
        };
        let _ = self.state.record_attempt(url_id.clone(), attempt).await;

        outcome
    }

    async fn run_content_stage(&self, url_id: &UrlId, url: &str) -> Result<FetchedContent, ProcessingFailure> {
        let fetcher = self.fetcher.clone();
        let url = url.to_string();
        let result = retry_stage(move || {
            let fetcher = fetcher.clone();
            let url = url.clone();
            async move { fetcher.fetch(&url).await }
        })
        .await;

        let attempt = match &result {
            Ok(_) => ProcessingAttempt::stage_result(Stage::ContentExtraction, "fetch", true),
            Err((category, message)) => ProcessingAttempt::stage_result(Stage::ContentExtraction, "fetch", false).with_error(*category, message.clone()),
        };
        let _ = self.state.record_attempt(url_id.clone(), attempt).await;

        result.map_err(|(category, message)| ProcessingFailure::new(category, message))
    }

    async fn run_llm_stage(&self, url_id: &UrlId, content: &str) -> Result<ExtractedMetadata, ProcessingFailure> {
        let method = format!("{:?}", self.config.llm_provider).to_lowercase();
        let llm = self.llm.clone();
        let content = content.to_string();
        let result = retry_stage(move || {
            let llm = llm.clone();
            let content = content.clone();
            async move { llm.extract(&content).await }
        })
        .await;

        let attempt = match &result {
            Ok(_) => ProcessingAttempt::stage_result(Stage::Llm, method, true),
            Err((category, message)) => ProcessingAttempt::stage_result(Stage::Llm, method, false).with_error(*category, message.clone()),
        };
        let _ = self.state.record_attempt(url_id.clone(), attempt).await;

        result.map_err(|(category, message)| ProcessingFailure::new(category, message))
    }

    async fn transition(&self, url_id: &UrlId, from: ProcessingStatus, to: ProcessingStatus, method: &str) -> Result<Url, ()> {
        self.state.transition(url_id.clone(), from, to, method).await.map_err(|e| {
            warn!(url_id = %url_id, %from, %to, error = %e, "transition: rejected");
        })
    }

    /// `manualCreate(urlId, payload)` — the exhausted-cascade fallback.
    /// Always allowed except from a `stored*` status.
    pub async fn manual_create(&self, url_id: UrlId, payload: ExtractedMetadata) -> Result<ItemKey, ProcessingFailure> {
        let url = self
            .state
            .get_url_required(url_id.clone())
            .await
            .map_err(|e| ProcessingFailure::new(ErrorCategory::Unknown, e.to_string()))?;

        if !can_manual_create(&url).allowed {
            return Err(ProcessingFailure::new(ErrorCategory::Validation, "manual creation is not available from this status"));
        }

        let item_key = self
            .zotero
            .create_item(&payload)
            .await
            .map_err(|e| ProcessingFailure::from_raw(&RawError::from(&e)))?;

        self.links
            .record(url_id.clone(), item_key.clone(), true)
            .await
            .map_err(|e| ProcessingFailure::new(ErrorCategory::Unknown, e.to_string()))?;

        self.state
            .transition(url_id, ProcessingStatus::Exhausted, ProcessingStatus::StoredCustom, "manual-create")
            .await
            .map_err(|e| ProcessingFailure::new(ErrorCategory::Unknown, e.to_string()))?;

        Ok(item_key)
    }

    /// `reset(urlId, preserveHistory)` — the universal escape hatch for a
    /// stuck `processing_*` status. Never touches Zotero links.
    pub async fn reset(&self, url_id: UrlId, preserve_history: bool) -> Result<Url, ProcessingFailure> {
        self.state
            .reset(url_id, preserve_history)
            .await
            .map_err(|e| ProcessingFailure::new(ErrorCategory::Unknown, e.to_string()))
    }

    /// User picks one of several ambiguous identifiers from
    /// `awaiting_selection`; re-enters the cascade at stage 1 with that
    /// identifier. Treated as a fresh attempt — `processingAttempts`
    /// increments for the promoted Zotero call like any other stage
    /// result.
    pub async fn select_identifier(&self, url_id: UrlId, identifier: Identifier) -> ProcessingResult {
        if self
            .transition(&url_id, ProcessingStatus::AwaitingSelection, ProcessingStatus::ProcessingZotero, "select-identifier")
            .await
            .is_err()
        {
            return ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Unknown, "failed to re-enter processing_zotero"), Vec::new());
        }

        let url = match self.state.get_url_required(url_id.clone()).await {
            Ok(url) => url,
            Err(e) => return ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Unknown, e.to_string()), Vec::new()),
        };

        match self.run_zotero_stage(&url_id, &url.url, Some(identifier)).await {
            StageOutcome::Linked(item_key) => self.finish_via_zotero_link(&url_id, item_key, ProcessingStatus::ProcessingZotero, vec![Stage::ZoteroIdentifier]).await,
            StageOutcome::NonCascading(failure) => {
                let _ = self.transition(&url_id, ProcessingStatus::ProcessingZotero, ProcessingStatus::Exhausted, "selected-identifier-failed").await;
                ProcessingResult::failed(failure, vec![Stage::ZoteroIdentifier])
            }
            StageOutcome::Cascade => {
                let _ = self.transition(&url_id, ProcessingStatus::ProcessingZotero, ProcessingStatus::Exhausted, "selected-identifier-not-found").await;
                ProcessingResult::failed(ProcessingFailure::new(ErrorCategory::Permanent, "selected identifier did not resolve to any item"), vec![Stage::ZoteroIdentifier])
            }
        }
    }

    /// `approveMetadata(urlId)` — from `awaiting_metadata`, create the
    /// Zotero item from the pending extraction result the caller approved.
    pub async fn approve_metadata(&self, url_id: UrlId, metadata: ExtractedMetadata) -> ProcessingResult {
        let item_key = match self.zotero.create_item(&metadata).await {
            Ok(key) => key,
            Err(e) => return ProcessingResult::failed(ProcessingFailure::from_raw(&RawError::from(&e)), Vec::new()),
        };
        self.finish_via_zotero_link(&url_id, item_key, ProcessingStatus::AwaitingMetadata, vec![Stage::Llm]).await
    }

    /// `rejectMetadata(urlId)` — discard the pending extraction and return
    /// the URL to `not_started` for a retry.
    pub async fn reject_metadata(&self, url_id: UrlId) -> Result<Url, ProcessingFailure> {
        self.state
            .transition(url_id, ProcessingStatus::AwaitingMetadata, ProcessingStatus::NotStarted, "reject-metadata")
            .await
            .map_err(|e| ProcessingFailure::new(ErrorCategory::Unknown, e.to_string()))
    }

    /// Run once at process start, before any `process()` calls are
    /// accepted: any URL left in a `processing_*` status is the mark of an
    /// orchestrator that crashed mid-stage, since only this orchestrator
    /// ever writes those statuses. Each is transitioned back to
    /// `not_started` so a subsequent cascade starts clean.
    pub async fn sweep_orphans(&self) -> Result<usize, ProcessingFailure> {
        use crate::collaborators::UrlFilter;

        let mut swept = 0;
        for status in [ProcessingStatus::ProcessingZotero, ProcessingStatus::ProcessingContent, ProcessingStatus::ProcessingLlm] {
            let filter = UrlFilter { status: Some(status), startable_only: false };
            let orphaned = self
                .state
                .list_urls(filter)
                .await
                .map_err(|e| ProcessingFailure::new(ErrorCategory::Unknown, e.to_string()))?;

            for url in orphaned {
                warn!(url_id = %url.id, status = %status, "sweep_orphans: found url stuck mid-stage, resetting");
                if let Err(e) = self.state.reset(url.id.clone(), true).await {
                    warn!(url_id = %url.id, error = %e, "sweep_orphans: failed to reset orphaned url");
                    continue;
                }
                swept += 1;
            }
        }

        if swept > 0 {
            info!(swept, "sweep_orphans: reset orphaned urls left mid-stage by a prior crash");
        } else {
            debug!("sweep_orphans: no orphaned urls found");
        }
        Ok(swept)
    }
}
