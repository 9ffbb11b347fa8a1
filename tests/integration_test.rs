//! End-to-end scenarios over the public API: a fresh URL is created
//! through a `StateManager`, handed to a `ProcessingOrchestrator` built
//! from hand-rolled fake collaborators, and driven through the cascade.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use theodore_core::{
    BatchOptions, BatchStatus, CitationValidation, ContentFetcher, CoreConfig, ExtractedMetadata, FetchError,
    FetchedContent, IdentifierKind, ItemKey, LinkId, LlmError, LlmExtractor, LlmProvider,
    ProcessingOrchestrator, ProcessingOutcome, ProcessingStatus, Store, StoreError, Url, UrlFilter, UrlId,
    ZoteroClient, ZoteroError, ZoteroItemLink, ZoteroLookupOutcome,
};
use theodore_core::{BatchProcessor, StateHooks, StateManager};

/// Route `tracing` output to the test harness so a failing scenario's
/// logs are visible in the captured test output, same filter shape as
/// the binary's own startup logging.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_test_writer()
        .try_init();
}

/// A plain in-memory `Store`, the same shape as the crate's own internal
/// test fake but written fresh since that one lives behind `cfg(test)`
/// and isn't visible to an external integration test binary.
#[derive(Default)]
struct FakeStore {
    urls: RwLock<HashMap<UrlId, Url>>,
    links: RwLock<HashMap<LinkId, ZoteroItemLink>>,
}

#[async_trait]
impl Store for FakeStore {
    async fn get_url(&self, id: UrlId) -> Result<Option<Url>, StoreError> {
        Ok(self.urls.read().await.get(&id).cloned())
    }

    async fn put_url(&self, url: Url) -> Result<(), StoreError> {
        self.urls.write().await.insert(url.id.clone(), url);
        Ok(())
    }

    async fn list_urls(&self, filter: &UrlFilter) -> Result<Vec<Url>, StoreError> {
        let urls = self.urls.read().await;
        Ok(urls
            .values()
            .filter(|u| filter.status.is_none_or(|s| u.processing_status == s))
            .filter(|u| !filter.startable_only || u.processing_status.is_startable())
            .cloned()
            .collect())
    }

    async fn get_link(&self, id: LinkId) -> Result<Option<ZoteroItemLink>, StoreError> {
        Ok(self.links.read().await.get(&id).cloned())
    }

    async fn put_link(&self, link: ZoteroItemLink) -> Result<(), StoreError> {
        self.links.write().await.insert(link.id.clone(), link);
        Ok(())
    }

    async fn delete_link(&self, id: LinkId) -> Result<(), StoreError> {
        self.links.write().await.remove(&id);
        Ok(())
    }

    async fn links_for_url(&self, url_id: UrlId) -> Result<Vec<ZoteroItemLink>, StoreError> {
        Ok(self.links.read().await.values().filter(|l| l.url_id == url_id).cloned().collect())
    }

    async fn links_for_item(&self, item_key: ItemKey) -> Result<Vec<ZoteroItemLink>, StoreError> {
        Ok(self.links.read().await.values().filter(|l| l.item_key == item_key).cloned().collect())
    }
}

/// Scripted Zotero lookups; created items are tracked so `validate_citation`
/// can answer honestly.
struct FakeZotero {
    lookups: RwLock<Vec<Result<ZoteroLookupOutcome, ZoteroError>>>,
    calls: AtomicUsize,
    items: RwLock<HashMap<ItemKey, ExtractedMetadata>>,
}

impl FakeZotero {
    fn new(lookups: Vec<Result<ZoteroLookupOutcome, ZoteroError>>) -> Self {
        Self { lookups: RwLock::new(lookups), calls: AtomicUsize::new(0), items: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl ZoteroClient for FakeZotero {
    async fn process_identifier(&self, _kind: IdentifierKind, _value: &str) -> Result<ZoteroLookupOutcome, ZoteroError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.lookups.read().await.get(idx) {
            Some(Ok(outcome)) => Ok(outcome.clone()),
            _ => Ok(ZoteroLookupOutcome::NotFound),
        }
    }

    async fn process_url(&self, _url: &str) -> Result<ZoteroLookupOutcome, ZoteroError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.lookups.read().await.get(idx) {
            Some(Ok(outcome)) => Ok(outcome.clone()),
            _ => Ok(ZoteroLookupOutcome::NotFound),
        }
    }

    async fn create_item(&self, metadata: &ExtractedMetadata) -> Result<ItemKey, ZoteroError> {
        let key = ItemKey::new(format!("FAKE{}", self.items.read().await.len() + 1));
        self.items.write().await.insert(key.clone(), metadata.clone());
        Ok(key)
    }

    async fn update_item(&self, key: &ItemKey, metadata: &ExtractedMetadata) -> Result<(), ZoteroError> {
        self.items.write().await.insert(key.clone(), metadata.clone());
        Ok(())
    }

    async fn get_item(&self, key: &ItemKey) -> Result<Option<ExtractedMetadata>, ZoteroError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn delete_item(&self, key: &ItemKey) -> Result<(), ZoteroError> {
        self.items.write().await.remove(key);
        Ok(())
    }

    async fn validate_citation(&self, key: &ItemKey) -> Result<CitationValidation, ZoteroError> {
        let has_required_fields = self.items.read().await.get(key).map(|m| m.has_required_fields()).unwrap_or(false);
        Ok(CitationValidation { has_required_fields })
    }
}

struct FakeFetcher(Result<FetchedContent, String>);

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedContent, FetchError> {
        match &self.0 {
            Ok(content) => Ok(content.clone()),
            Err(message) => Err(FetchError::Network(message.clone())),
        }
    }
}

struct FakeLlm(Vec<Result<ExtractedMetadata, LlmError>>);

#[async_trait]
impl LlmExtractor for FakeLlm {
    async fn extract(&self, _content: &str) -> Result<ExtractedMetadata, LlmError> {
        Ok(self.0.first().cloned().transpose().ok().flatten().unwrap_or_default())
    }
}

fn build(
    zotero_lookups: Vec<Result<ZoteroLookupOutcome, ZoteroError>>,
    fetcher: Result<FetchedContent, String>,
    llm_response: Option<ExtractedMetadata>,
    config: CoreConfig,
) -> (ProcessingOrchestrator, StateManager) {
    let store: Arc<dyn Store> = Arc::new(FakeStore::default());
    let state = StateManager::spawn(store.clone(), StateHooks::new());
    let zotero: Arc<dyn ZoteroClient> = Arc::new(FakeZotero::new(zotero_lookups));
    let fetcher: Arc<dyn ContentFetcher> = Arc::new(FakeFetcher(fetcher));
    let llm: Arc<dyn LlmExtractor> = Arc::new(FakeLlm(llm_response.into_iter().map(Ok).collect()));
    let orchestrator = ProcessingOrchestrator::new(state.clone(), store, zotero, fetcher, llm, config);
    (orchestrator, state)
}

#[tokio::test]
async fn happy_doi_path_stores_on_first_stage() {
    init_tracing();
    let (orchestrator, state) = build(
        vec![Ok(ZoteroLookupOutcome::Found(ItemKey::new("AAAA0001")))],
        Err("unused".into()),
        None,
        CoreConfig::default(),
    );
    let url_id = state.create_url(Url::new("https://example.com/doi-paper")).await.unwrap();

    let result = orchestrator.process(url_id.clone()).await;
    assert_eq!(result.outcome, ProcessingOutcome::Done);
    assert_eq!(result.final_status, Some(ProcessingStatus::Stored));

    let url = state.get_url_required(url_id).await.unwrap();
    assert_eq!(url.processing_status, ProcessingStatus::Stored);
    assert_eq!(url.linked_item_count, 1);
}

#[tokio::test]
async fn cascade_falls_through_to_user_review() {
    init_tracing();
    let config = CoreConfig { llm_provider: LlmProvider::Local, ..CoreConfig::default() };
    let (orchestrator, state) = build(
        vec![Ok(ZoteroLookupOutcome::NotFound)],
        Ok(FetchedContent { text: "no identifiers here".into(), is_pdf: false, scraped_identifiers: vec![] }),
        Some(ExtractedMetadata {
            title: Some("A Thin Paper".into()),
            authors: vec!["Solo Author".into()],
            year: Some(2021),
            ..Default::default()
        }),
        config,
    );
    let url_id = state.create_url(Url::new("https://example.com/weak-paper")).await.unwrap();

    let result = orchestrator.process(url_id.clone()).await;
    assert_eq!(result.outcome, ProcessingOutcome::PendingUser);
    assert_eq!(result.final_status, Some(ProcessingStatus::AwaitingMetadata));

    // Low-score metadata isn't auto-approved; reject it and confirm the
    // URL lands back at not_started for a retry.
    let rejected = orchestrator.reject_metadata(url_id.clone()).await.unwrap();
    assert_eq!(rejected.processing_status, ProcessingStatus::NotStarted);
}

#[tokio::test]
async fn exhausted_cascade_accepts_manual_creation() {
    init_tracing();
    let (orchestrator, state) = build(
        vec![Ok(ZoteroLookupOutcome::NotFound)],
        Err("fetch always fails".into()),
        None,
        CoreConfig::default(), // llm disabled by default, content failure cascades straight to exhausted
    );
    let url_id = state.create_url(Url::new("https://example.com/dead-link")).await.unwrap();

    let result = orchestrator.process(url_id.clone()).await;
    assert_eq!(result.outcome, ProcessingOutcome::Failed);
    assert_eq!(result.final_status, Some(ProcessingStatus::Exhausted));

    let payload = ExtractedMetadata {
        title: Some("Hand-entered title".into()),
        authors: vec!["Manual Entry".into()],
        year: Some(2018),
        ..Default::default()
    };
    let item_key = orchestrator.manual_create(url_id.clone(), payload).await.unwrap();
    assert_eq!(item_key.as_str(), "FAKE1");

    let url = state.get_url_required(url_id).await.unwrap();
    assert_eq!(url.processing_status, ProcessingStatus::StoredCustom);
    assert_eq!(url.linked_item_count, 1);
}

#[tokio::test]
async fn batch_processes_a_mixed_set_and_honors_pause_cancel() {
    init_tracing();
    let (orchestrator, state) = build(
        vec![
            Ok(ZoteroLookupOutcome::Found(ItemKey::new("AAAA0001"))),
            Ok(ZoteroLookupOutcome::Found(ItemKey::new("AAAA0002"))),
            Ok(ZoteroLookupOutcome::Found(ItemKey::new("AAAA0003"))),
        ],
        Err("unused".into()),
        None,
        CoreConfig::default(),
    );

    let mut url_ids = Vec::new();
    for i in 0..3 {
        let id = state.create_url(Url::new(format!("https://example.com/{i}"))).await.unwrap();
        url_ids.push(id);
    }

    let mut config = CoreConfig::default();
    config.poll_interval_ms = 5;
    config.session_retention_ms = 30;
    config.session_sweep_interval_ms = 50;
    let processor = BatchProcessor::new(Arc::new(orchestrator), state, config);

    let session_id = processor.start(url_ids, BatchOptions::new()).await.unwrap();

    let mut snapshot = processor.get(&session_id).await.unwrap();
    let mut attempts = 0;
    while !matches!(snapshot.status, BatchStatus::Completed | BatchStatus::Cancelled) && attempts < 200 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        snapshot = processor.get(&session_id).await.unwrap();
        attempts += 1;
    }

    assert_eq!(snapshot.status, BatchStatus::Completed);
    assert_eq!(snapshot.completed, 3);
    assert_eq!(snapshot.completed + snapshot.failed + snapshot.skipped, 3);
}

#[tokio::test]
async fn safety_guard_refuses_deleting_an_item_the_user_edited() {
    init_tracing();
    let (orchestrator, state) = build(
        vec![Ok(ZoteroLookupOutcome::Found(ItemKey::new("AAAA0001")))],
        Err("unused".into()),
        None,
        CoreConfig::default(),
    );
    let url_id = state.create_url(Url::new("https://example.com/edited")).await.unwrap();
    let result = orchestrator.process(url_id.clone()).await;
    assert_eq!(result.outcome, ProcessingOutcome::Done);

    // An external-change detector would call this; simulate it directly
    // through the link manager's own guard-backed operation instead of
    // reaching into orchestrator internals.
    let store: Arc<dyn Store> = Arc::new(FakeStore::default());
    let zotero: Arc<dyn ZoteroClient> = Arc::new(FakeZotero::new(vec![]));
    let state2 = StateManager::spawn(store.clone(), StateHooks::new());
    let links = theodore_core::LinkManager::new(store, zotero, state2.clone());
    let url_id2 = state2.create_url(Url::new("https://example.com/edited")).await.unwrap();
    let item = ItemKey::new("EDIT0001");
    links.record(url_id2.clone(), item.clone(), true).await.unwrap();
    links.mark_user_modified(item.clone()).await.unwrap();

    let result = links.delete_item_and_unlink(url_id2, item).await;
    assert!(result.is_err());
}
