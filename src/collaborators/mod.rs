//! External-system contracts the core depends on but does not implement:
//! persistence, the local Zotero library, content fetching and LLM-based
//! metadata extraction. Each is a `#[async_trait]` trait with a
//! `#[cfg(test)]` in-memory fake.

pub mod fetcher;
pub mod llm;
pub mod store;
pub mod zotero;

pub use fetcher::{ContentFetcher, FetchError, FetchedContent};
pub use llm::{LlmError, LlmExtractor};
pub use store::{Store, StoreError, UrlFilter};
pub use zotero::{ZoteroClient, ZoteroError, ZoteroLookupOutcome};
