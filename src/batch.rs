//! `BatchProcessor` — runs the cascade over many URLs with bounded
//! concurrency and a pollable session record. `start()` returns the
//! session id before any URL is processed; a `tokio::spawn`'d loop does
//! the actual work, gated by a `Semaphore` for concurrency and an
//! `AtomicBool` pair for pause/cancel. Cancellation is soft: in-flight
//! cascades run to the end of their current stage, they are never
//! aborted mid-stage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::domain::{now_ms, ItemKey, ProcessingStatus, SessionId, UrlId};
use crate::errors::ProcessingFailure;
use crate::orchestrator::{ProcessingOrchestrator, ProcessingOutcome};
use crate::state::StateManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Running,
    Paused,
    Cancelled,
    Completed,
}

/// Options for `BatchProcessor::start`. `concurrency: None` falls back to
/// `CoreConfig::concurrency`.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub concurrency: Option<u32>,
    pub respect_intent: bool,
}

impl BatchOptions {
    pub fn new() -> Self {
        Self { concurrency: None, respect_intent: true }
    }
}

/// One URL's outcome, recorded in completion order (not submission order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUrlResult {
    pub url_id: UrlId,
    pub final_status: Option<ProcessingStatus>,
    pub item_key: Option<ItemKey>,
    pub error: Option<ProcessingFailure>,
    pub ts: i64,
}

/// The in-memory session record. `current_index`, `completed`, `failed`
/// and `skipped` store *input indices* so a caller can reconstruct
/// ordering against the frozen `url_ids` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSession {
    pub id: SessionId,
    pub url_ids: Vec<UrlId>,
    pub current_index: usize,
    pub completed: Vec<usize>,
    pub failed: Vec<usize>,
    pub skipped: Vec<usize>,
    pub results: Vec<BatchUrlResult>,
    pub status: BatchStatus,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

impl BatchSession {
    fn new(id: SessionId, url_ids: Vec<UrlId>) -> Self {
        Self {
            id,
            url_ids,
            current_index: 0,
            completed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            results: Vec::new(),
            status: BatchStatus::Running,
            started_at: now_ms(),
            finished_at: None,
        }
    }
}

/// A cheap, copy-on-read snapshot of a session, shaped for 500ms polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub status: BatchStatus,
    pub current_index: usize,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub last_result: Option<BatchUrlResult>,
}

impl From<&BatchSession> for BatchSnapshot {
    fn from(session: &BatchSession) -> Self {
        Self {
            status: session.status,
            current_index: session.current_index,
            total: session.url_ids.len(),
            completed: session.completed.len(),
            failed: session.failed.len(),
            skipped: session.skipped.len(),
            last_result: session.results.last().cloned(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch must include at least one url")]
    EmptyBatch,
    #[error("no such batch session: {0}")]
    NotFound(SessionId),
    #[error("session {0} is not running")]
    NotRunning(SessionId),
    #[error("session {0} is not paused")]
    NotPaused(SessionId),
    #[error("session {0} has already finished")]
    AlreadyFinished(SessionId),
}

/// The pause/cancel gate plus the concurrency limiter for one session.
/// Kept out of `BatchSession` because it isn't part of the polled record.
struct SessionControl {
    paused: AtomicBool,
    cancelled: AtomicBool,
    semaphore: Arc<Semaphore>,
}

pub struct BatchProcessor {
    orchestrator: Arc<ProcessingOrchestrator>,
    state: StateManager,
    config: CoreConfig,
    sessions: Arc<RwLock<HashMap<SessionId, BatchSession>>>,
    controls: Arc<RwLock<HashMap<SessionId, Arc<SessionControl>>>>,
}

impl BatchProcessor {
    /// Build a processor and spawn its retention sweep task.
    pub fn new(orchestrator: Arc<ProcessingOrchestrator>, state: StateManager, config: CoreConfig) -> Self {
        let processor = Self {
            orchestrator,
            state,
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            controls: Arc::new(RwLock::new(HashMap::new())),
        };
        processor.spawn_retention_sweep();
        processor
    }

    fn spawn_retention_sweep(&self) {
        let sessions = self.sessions.clone();
        let controls = self.controls.clone();
        let retention_ms = self.config.session_retention_ms as i64;
        let interval = Duration::from_millis(self.config.session_sweep_interval_ms.max(1));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let now = now_ms();
                let mut sessions = sessions.write().await;
                let expired: Vec<SessionId> = sessions
                    .values()
                    .filter(|s| s.finished_at.is_some_and(|finished| now - finished >= retention_ms))
                    .map(|s| s.id.clone())
                    .collect();
                if expired.is_empty() {
                    continue;
                }
                let mut controls = controls.write().await;
                for id in &expired {
                    sessions.remove(id);
                    controls.remove(id);
                }
                debug!(count = expired.len(), "batch retention sweep: removed expired sessions");
            }
        });
    }

    /// Create a session for `url_ids` and return its id immediately. The
    /// background loop has not started a single task by the time this
    /// returns — it is spawned, not awaited.
    pub async fn start(&self, url_ids: Vec<UrlId>, opts: BatchOptions) -> Result<SessionId, BatchError> {
        if url_ids.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        let session_id = SessionId::generate();
        let concurrency = opts.concurrency.unwrap_or(self.config.concurrency).max(1) as usize;
        let control = Arc::new(SessionControl {
            paused: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            semaphore: Arc::new(Semaphore::new(concurrency)),
        });

        let session = BatchSession::new(session_id.clone(), url_ids.clone());
        self.sessions.write().await.insert(session_id.clone(), session);
        self.controls.write().await.insert(session_id.clone(), control.clone());

        info!(session_id = %session_id, total = url_ids.len(), concurrency, "batch session started");

        let orchestrator = self.orchestrator.clone();
        let state = self.state.clone();
        let sessions = self.sessions.clone();
        let respect_intent = opts.respect_intent;
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let session_id_for_task = session_id.clone();

        tokio::spawn(async move {
            run_session(session_id_for_task, url_ids, respect_intent, orchestrator, state, sessions, control, poll_interval).await;
        });

        Ok(session_id)
    }

    /// Stop starting new tasks; in-flight tasks drain to completion.
    pub async fn pause(&self, session_id: &SessionId) -> Result<(), BatchError> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(session_id).ok_or_else(|| BatchError::NotFound(session_id.clone()))?;
        if session.status != BatchStatus::Running {
            return Err(BatchError::NotRunning(session_id.clone()));
        }
        drop(sessions);

        let controls = self.controls.read().await;
        let control = controls.get(session_id).ok_or_else(|| BatchError::NotFound(session_id.clone()))?;
        control.paused.store(true, Ordering::SeqCst);
        drop(controls);

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.status = BatchStatus::Paused;
        }
        info!(session_id = %session_id, "batch session paused");
        Ok(())
    }

    /// Resume a paused session; the scheduler picks back up where it left off.
    pub async fn resume(&self, session_id: &SessionId) -> Result<(), BatchError> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(session_id).ok_or_else(|| BatchError::NotFound(session_id.clone()))?;
        if session.status != BatchStatus::Paused {
            return Err(BatchError::NotPaused(session_id.clone()));
        }
        drop(sessions);

        let controls = self.controls.read().await;
        let control = controls.get(session_id).ok_or_else(|| BatchError::NotFound(session_id.clone()))?;
        control.paused.store(false, Ordering::SeqCst);
        drop(controls);

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.status = BatchStatus::Running;
        }
        info!(session_id = %session_id, "batch session resumed");
        Ok(())
    }

    /// Soft-cancel: in-flight tasks are signalled but run to the end of
    /// their current stage; the session ends once the pool drains.
    pub async fn cancel(&self, session_id: &SessionId) -> Result<(), BatchError> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(session_id).ok_or_else(|| BatchError::NotFound(session_id.clone()))?;
        if matches!(session.status, BatchStatus::Completed | BatchStatus::Cancelled) {
            return Err(BatchError::AlreadyFinished(session_id.clone()));
        }
        drop(sessions);

        let controls = self.controls.read().await;
        let control = controls.get(session_id).ok_or_else(|| BatchError::NotFound(session_id.clone()))?;
        control.cancelled.store(true, Ordering::SeqCst);
        control.paused.store(false, Ordering::SeqCst);
        warn!(session_id = %session_id, "batch session cancelled");
        Ok(())
    }

    /// A copy-on-read snapshot, safe to call concurrently with the
    /// background loop's writes.
    pub async fn get(&self, session_id: &SessionId) -> Option<BatchSnapshot> {
        self.sessions.read().await.get(session_id).map(BatchSnapshot::from)
    }
}

async fn run_session(
    session_id: SessionId,
    url_ids: Vec<UrlId>,
    respect_intent: bool,
    orchestrator: Arc<ProcessingOrchestrator>,
    state: StateManager,
    sessions: Arc<RwLock<HashMap<SessionId, BatchSession>>>,
    control: Arc<SessionControl>,
    poll_interval: Duration,
) {
    let mut tasks = JoinSet::new();

    'submit: for (index, url_id) in url_ids.into_iter().enumerate() {
        loop {
            if control.cancelled.load(Ordering::SeqCst) {
                break 'submit;
            }
            if !control.paused.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(poll_interval).await;
        }

        if respect_intent {
            if let Ok(url) = state.get_url_required(url_id.clone()).await {
                if url.user_intent.skips_batch() {
                    record_skip(&sessions, &session_id, index).await;
                    continue;
                }
            }
        }

        let permit = match control.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break 'submit,
        };
        let orchestrator = orchestrator.clone();
        let sessions = sessions.clone();
        let session_id = session_id.clone();
        tasks.spawn(async move {
            let result = orchestrator.process(url_id.clone()).await;
            record_completion(&sessions, &session_id, index, url_id, result).await;
            drop(permit);
        });
    }

    while tasks.join_next().await.is_some() {}

    let cancelled = control.cancelled.load(Ordering::SeqCst);
    let mut sessions = sessions.write().await;
    if let Some(session) = sessions.get_mut(&session_id) {
        session.status = if cancelled { BatchStatus::Cancelled } else { BatchStatus::Completed };
        session.finished_at = Some(now_ms());
    }
    info!(session_id = %session_id, cancelled, "batch session finished");
}

async fn record_skip(sessions: &Arc<RwLock<HashMap<SessionId, BatchSession>>>, session_id: &SessionId, index: usize) {
    let mut sessions = sessions.write().await;
    if let Some(session) = sessions.get_mut(session_id) {
        session.skipped.push(index);
        session.current_index = session.current_index.max(index + 1);
    }
}

async fn record_completion(
    sessions: &Arc<RwLock<HashMap<SessionId, BatchSession>>>,
    session_id: &SessionId,
    index: usize,
    url_id: UrlId,
    result: crate::orchestrator::ProcessingResult,
) {
    let succeeded = matches!(result.outcome, ProcessingOutcome::Done | ProcessingOutcome::PendingUser);
    let entry = BatchUrlResult {
        url_id,
        final_status: result.final_status,
        item_key: result.item_key,
        error: result.error,
        ts: now_ms(),
    };

    let mut sessions = sessions.write().await;
    if let Some(session) = sessions.get_mut(session_id) {
        if succeeded {
            session.completed.push(index);
        } else {
            session.failed.push(index);
        }
        session.results.push(entry);
        session.current_index = session.current_index.max(index + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fetcher::mock::MockContentFetcher;
    use crate::collaborators::llm::mock::MockLlmExtractor;
    use crate::collaborators::store::mock::InMemoryStore;
    use crate::collaborators::zotero::mock::MockZoteroClient;
    use crate::collaborators::{FetchedContent, Store, ZoteroLookupOutcome};
    use crate::domain::{Url, UserIntent};
    use crate::state::StateHooks;

    async fn harness(
        lookups: Vec<Result<ZoteroLookupOutcome, crate::collaborators::ZoteroError>>,
        concurrency: u32,
    ) -> (Arc<BatchProcessor>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let state = StateManager::spawn(store.clone(), StateHooks::new());
        let zotero = Arc::new(MockZoteroClient::new(lookups));
        let fetcher = Arc::new(MockContentFetcher::succeeding(FetchedContent {
            text: "no content here".into(),
            is_pdf: false,
            scraped_identifiers: vec![],
        }));
        let llm = Arc::new(MockLlmExtractor::new(vec![]));
        let mut config = CoreConfig::default();
        config.concurrency = concurrency;
        config.poll_interval_ms = 5;
        config.session_sweep_interval_ms = 50;
        config.session_retention_ms = 30;

        let orchestrator = Arc::new(ProcessingOrchestrator::new(state.clone(), store.clone(), zotero, fetcher, llm, config.clone()));
        (Arc::new(BatchProcessor::new(orchestrator, state, config)), store)
    }

    async fn wait_for_completion(processor: &BatchProcessor, session_id: &SessionId) -> BatchSnapshot {
        for _ in 0..200 {
            let snapshot = processor.get(session_id).await.unwrap();
            if matches!(snapshot.status, BatchStatus::Completed | BatchStatus::Cancelled) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("batch session did not finish in time");
    }

    #[tokio::test]
    async fn start_returns_before_any_task_runs() {
        let (processor, store) = harness(vec![Ok(ZoteroLookupOutcome::Found(ItemKey::new("ABCD1234")))], 2).await;
        let url = Url::new("https://example.com/a");
        store.put_url(url.clone()).await.unwrap();

        let session_id = processor.start(vec![url.id.clone()], BatchOptions::new()).await.unwrap();
        let snapshot = processor.get(&session_id).await.unwrap();
        assert_eq!(snapshot.total, 1);
        // Whatever the state, a session must exist immediately; start() never awaits the loop.
        assert!(matches!(snapshot.status, BatchStatus::Running | BatchStatus::Completed));
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let (processor, _store) = harness(vec![], 2).await;
        let err = processor.start(vec![], BatchOptions::new()).await.unwrap_err();
        assert!(matches!(err, BatchError::EmptyBatch));
    }

    #[tokio::test]
    async fn all_urls_are_accounted_for_on_completion() {
        let (processor, store) = harness(
            vec![
                Ok(ZoteroLookupOutcome::Found(ItemKey::new("AAAA0001"))),
                Ok(ZoteroLookupOutcome::NotFound),
                Ok(ZoteroLookupOutcome::NotFound),
            ],
            2,
        )
        .await;

        let mut ids = Vec::new();
        for i in 0..3 {
            let url = Url::new(format!("https://example.com/{i}"));
            store.put_url(url.clone()).await.unwrap();
            ids.push(url.id);
        }

        let session_id = processor.start(ids, BatchOptions::new()).await.unwrap();
        let snapshot = wait_for_completion(&processor, &session_id).await;
        assert_eq!(snapshot.completed + snapshot.failed + snapshot.skipped, 3);
    }

    #[tokio::test]
    async fn respects_ignore_intent_as_skip() {
        let (processor, store) = harness(vec![Ok(ZoteroLookupOutcome::Found(ItemKey::new("AAAA0001")))], 2).await;

        let mut ignored = Url::new("https://example.com/ignored");
        ignored.set_intent(UserIntent::Ignore);
        store.put_url(ignored.clone()).await.unwrap();

        let session_id = processor.start(vec![ignored.id.clone()], BatchOptions::new()).await.unwrap();
        let snapshot = wait_for_completion(&processor, &session_id).await;
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.completed, 0);
        assert_eq!(snapshot.failed, 0);
    }

    #[tokio::test]
    async fn pause_blocks_further_progress_until_resumed() {
        let (processor, store) = harness(
            vec![
                Ok(ZoteroLookupOutcome::Found(ItemKey::new("AAAA0001"))),
                Ok(ZoteroLookupOutcome::Found(ItemKey::new("AAAA0002"))),
            ],
            1,
        )
        .await;

        let mut ids = Vec::new();
        for i in 0..2 {
            let url = Url::new(format!("https://example.com/{i}"));
            store.put_url(url.clone()).await.unwrap();
            ids.push(url.id);
        }

        let session_id = processor.start(ids, BatchOptions::new()).await.unwrap();
        processor.pause(&session_id).await.unwrap();
        let snapshot = processor.get(&session_id).await.unwrap();
        assert!(matches!(snapshot.status, BatchStatus::Paused | BatchStatus::Completed));

        processor.resume(&session_id).await.or_else(|e| match e {
            // The background loop may have already completed the whole batch
            // before pause() took effect; that's a legitimate race in a 1-item
            // queue, not a bug.
            BatchError::NotPaused(_) => Ok(()),
            other => Err(other),
        }).unwrap();

        let snapshot = wait_for_completion(&processor, &session_id).await;
        assert_eq!(snapshot.completed, 2);
    }

    #[tokio::test]
    async fn cancel_is_soft_and_session_ends_once_pool_drains() {
        let (processor, store) = harness(
            vec![
                Ok(ZoteroLookupOutcome::Found(ItemKey::new("AAAA0001"))),
                Ok(ZoteroLookupOutcome::Found(ItemKey::new("AAAA0002"))),
                Ok(ZoteroLookupOutcome::Found(ItemKey::new("AAAA0003"))),
            ],
            1,
        )
        .await;

        let mut ids = Vec::new();
        for i in 0..3 {
            let url = Url::new(format!("https://example.com/{i}"));
            store.put_url(url.clone()).await.unwrap();
            ids.push(url.id);
        }

        let session_id = processor.start(ids, BatchOptions::new()).await.unwrap();
        processor.cancel(&session_id).await.unwrap();
        let snapshot = wait_for_completion(&processor, &session_id).await;
        assert!(matches!(snapshot.status, BatchStatus::Cancelled));
        assert!(snapshot.completed + snapshot.failed + snapshot.skipped <= 3);
    }

    #[tokio::test]
    async fn pause_on_unknown_session_is_not_found() {
        let (processor, _store) = harness(vec![], 2).await;
        let err = processor.pause(&SessionId::generate()).await.unwrap_err();
        assert!(matches!(err, BatchError::NotFound(_)));
    }

    #[test]
    fn snapshot_sums_match_session_buckets() {
        let mut session = BatchSession::new(SessionId::generate(), vec![UrlId::generate(), UrlId::generate()]);
        session.completed.push(0);
        session.failed.push(1);
        let snapshot = BatchSnapshot::from(&session);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.total, 2);
    }
}
