//! `StateManager` — actor that owns the `Store` handle and is the sole
//! writer of `processingStatus`. A `tokio::sync::mpsc` command queue is
//! processed by a single task, with callers talking to it through
//! `oneshot`-reply async methods on a cheaply-`Clone`-able handle.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::collaborators::{Store, UrlFilter};
use crate::domain::{ProcessingAttempt, ProcessingStatus, Url, UrlId, UserIntent};

use super::machine::check_transition;
use super::messages::{StateCommand, StateError, StateResponse};

/// Side-effect hooks invoked after a write has already been committed to
/// the store. Each closure receives a snapshot, never a handle back into
/// the `StateManager`, so a hook cannot re-enter `transition`.
#[derive(Default)]
pub struct StateHooks {
    on_enter_terminal: Vec<Box<dyn Fn(&Url) + Send + Sync>>,
    on_leave_processing: Vec<Box<dyn Fn(&Url) + Send + Sync>>,
    on_reset: Vec<Box<dyn Fn(&Url) + Send + Sync>>,
}

impl StateHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_enter_terminal(mut self, hook: impl Fn(&Url) + Send + Sync + 'static) -> Self {
        self.on_enter_terminal.push(Box::new(hook));
        self
    }

    pub fn on_leave_processing(mut self, hook: impl Fn(&Url) + Send + Sync + 'static) -> Self {
        self.on_leave_processing.push(Box::new(hook));
        self
    }

    pub fn on_reset(mut self, hook: impl Fn(&Url) + Send + Sync + 'static) -> Self {
        self.on_reset.push(Box::new(hook));
        self
    }

    fn fire_enter_terminal(&self, url: &Url) {
        for hook in &self.on_enter_terminal {
            hook(url);
        }
    }

    fn fire_leave_processing(&self, url: &Url) {
        for hook in &self.on_leave_processing {
            hook(url);
        }
    }

    fn fire_reset(&self, url: &Url) {
        for hook in &self.on_reset {
            hook(url);
        }
    }
}

/// Handle to send commands to the `StateManager` actor. Cheap to clone;
/// every clone shares the same underlying task.
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a new `StateManager` actor over `store`.
    pub fn spawn(store: Arc<dyn Store>, hooks: StateHooks) -> Self {
        debug!("StateManager::spawn: called");
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(store, hooks, rx));
        info!("StateManager spawned");
        Self { tx }
    }

    pub async fn get_url(&self, id: UrlId) -> StateResponse<Option<Url>> {
        self.call(|reply| StateCommand::GetUrl { id, reply }).await
    }

    pub async fn get_url_required(&self, id: UrlId) -> StateResponse<Url> {
        self.get_url(id.clone()).await?.ok_or(StateError::NotFound(id))
    }

    pub async fn list_urls(&self, filter: UrlFilter) -> StateResponse<Vec<Url>> {
        self.call(|reply| StateCommand::ListUrls { filter, reply }).await
    }

    pub async fn create_url(&self, url: Url) -> StateResponse<UrlId> {
        self.call(|reply| StateCommand::CreateUrl { url, reply }).await
    }

    pub async fn record_attempt(&self, id: UrlId, attempt: ProcessingAttempt) -> StateResponse<Url> {
        self.call(|reply| StateCommand::RecordAttempt { id, attempt, reply }).await
    }

    pub async fn transition(
        &self,
        id: UrlId,
        expected_from: ProcessingStatus,
        to: ProcessingStatus,
        method: impl Into<String>,
    ) -> StateResponse<Url> {
        let method = method.into();
        self.call(|reply| StateCommand::Transition { id, expected_from, to, method, reply }).await
    }

    pub async fn reset(&self, id: UrlId, preserve_history: bool) -> StateResponse<Url> {
        self.call(|reply| StateCommand::Reset { id, preserve_history, reply }).await
    }

    pub async fn set_intent(&self, id: UrlId, intent: UserIntent) -> StateResponse<Url> {
        self.call(|reply| StateCommand::SetIntent { id, intent, reply }).await
    }

    pub async fn set_linked_item_count(&self, id: UrlId, count: u32) -> StateResponse<Url> {
        self.call(|reply| StateCommand::SetLinkedItemCount { id, count, reply }).await
    }

    pub async fn shutdown(&self) -> StateResponse<()> {
        debug!("StateManager::shutdown: called");
        self.tx.send(StateCommand::Shutdown).await.map_err(|_| StateError::ChannelClosed)
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(build(reply_tx)).await.map_err(|_| StateError::ChannelClosed)?;
        reply_rx.await.map_err(|_| StateError::ChannelClosed)?
    }
}

async fn actor_loop(store: Arc<dyn Store>, hooks: StateHooks, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::GetUrl { id, reply } => {
                let result = store.get_url(id).await.map_err(|e| StateError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StateCommand::ListUrls { filter, reply } => {
                let result = store.list_urls(&filter).await.map_err(|e| StateError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StateCommand::CreateUrl { url, reply } => {
                let id = url.id.clone();
                let result = store
                    .put_url(url)
                    .await
                    .map(|_| id)
                    .map_err(|e| StateError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StateCommand::RecordAttempt { id, attempt, reply } => {
                let result = record_attempt(&*store, id, attempt).await;
                let _ = reply.send(result);
            }

            StateCommand::Transition { id, expected_from, to, method, reply } => {
                let result = do_transition(&*store, &hooks, id, expected_from, to, method).await;
                let _ = reply.send(result);
            }

            StateCommand::Reset { id, preserve_history, reply } => {
                let result = do_reset(&*store, &hooks, id, preserve_history).await;
                let _ = reply.send(result);
            }

            StateCommand::SetIntent { id, intent, reply } => {
                let result = set_intent(&*store, id, intent).await;
                let _ = reply.send(result);
            }

            StateCommand::SetLinkedItemCount { id, count, reply } => {
                let result = set_linked_item_count(&*store, id, count).await;
                let _ = reply.send(result);
            }

            StateCommand::Shutdown => {
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}

async fn fetch(store: &dyn Store, id: UrlId) -> StateResponse<Url> {
    store
        .get_url(id.clone())
        .await
        .map_err(|e| StateError::Store(e.to_string()))?
        .ok_or(StateError::NotFound(id))
}

async fn record_attempt(store: &dyn Store, id: UrlId, attempt: ProcessingAttempt) -> StateResponse<Url> {
    let mut url = fetch(store, id).await?;
    url.append_attempt(attempt);
    store.put_url(url.clone()).await.map_err(|e| StateError::Store(e.to_string()))?;
    Ok(url)
}

async fn do_transition(
    store: &dyn Store,
    hooks: &StateHooks,
    id: UrlId,
    expected_from: ProcessingStatus,
    to: ProcessingStatus,
    method: String,
) -> StateResponse<Url> {
    let mut url = fetch(store, id.clone()).await?;
    check_transition(url.processing_status, expected_from, to)?;

    let was_transient = url.processing_status.is_transient();
    let from = url.processing_status;
    url.append_attempt(ProcessingAttempt::transition(method, from, to));
    url.set_status(to);
    store.put_url(url.clone()).await.map_err(|e| StateError::Store(e.to_string()))?;

    if to.is_terminal() {
        hooks.fire_enter_terminal(&url);
    }
    if was_transient && !to.is_transient() {
        hooks.fire_leave_processing(&url);
    }

    Ok(url)
}

async fn do_reset(store: &dyn Store, hooks: &StateHooks, id: UrlId, preserve_history: bool) -> StateResponse<Url> {
    let mut url = fetch(store, id.clone()).await?;
    let from = url.processing_status;
    if from != ProcessingStatus::NotStarted {
        check_transition(from, from, ProcessingStatus::NotStarted)?;
    }

    url.clear_attempt_counters();
    if !preserve_history {
        url.truncate_history();
    }
    url.append_attempt(ProcessingAttempt::transition("reset", from, ProcessingStatus::NotStarted));
    url.set_status(ProcessingStatus::NotStarted);
    store.put_url(url.clone()).await.map_err(|e| StateError::Store(e.to_string()))?;

    hooks.fire_reset(&url);
    warn!(url_id = %url.id, "url reset to not_started");
    Ok(url)
}

async fn set_intent(store: &dyn Store, id: UrlId, intent: UserIntent) -> StateResponse<Url> {
    let mut url = fetch(store, id).await?;
    url.set_intent(intent);
    store.put_url(url.clone()).await.map_err(|e| StateError::Store(e.to_string()))?;
    Ok(url)
}

async fn set_linked_item_count(store: &dyn Store, id: UrlId, count: u32) -> StateResponse<Url> {
    let mut url = fetch(store, id).await?;
    url.set_linked_item_count(count);
    store.put_url(url.clone()).await.map_err(|e| StateError::Store(e.to_string()))?;
    Ok(url)
}
