//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::collaborators::UrlFilter;
use crate::domain::{ProcessingAttempt, ProcessingStatus, Url, UrlId, UserIntent};

use super::machine::TransitionError;

/// Errors from state operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("url not found: {0}")]
    NotFound(UrlId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("store error: {0}")]
    Store(String),

    #[error("channel closed")]
    ChannelClosed,
}

pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the `StateManager` actor. Every write is
/// fetch-check-commit inside a single actor iteration, so two concurrent
/// callers racing on the same `UrlId` can never interleave their reads
/// and writes.
#[derive(Debug)]
pub enum StateCommand {
    GetUrl {
        id: UrlId,
        reply: oneshot::Sender<StateResponse<Option<Url>>>,
    },
    ListUrls {
        filter: UrlFilter,
        reply: oneshot::Sender<StateResponse<Vec<Url>>>,
    },
    CreateUrl {
        url: Url,
        reply: oneshot::Sender<StateResponse<UrlId>>,
    },
    /// Append a stage-result attempt without changing `processingStatus`
    /// (used mid-stage, before the cascade decides the next transition).
    RecordAttempt {
        id: UrlId,
        attempt: ProcessingAttempt,
        reply: oneshot::Sender<StateResponse<Url>>,
    },
    Transition {
        id: UrlId,
        expected_from: ProcessingStatus,
        to: ProcessingStatus,
        method: String,
        reply: oneshot::Sender<StateResponse<Url>>,
    },
    Reset {
        id: UrlId,
        preserve_history: bool,
        reply: oneshot::Sender<StateResponse<Url>>,
    },
    SetIntent {
        id: UrlId,
        intent: UserIntent,
        reply: oneshot::Sender<StateResponse<Url>>,
    },
    SetLinkedItemCount {
        id: UrlId,
        count: u32,
        reply: oneshot::Sender<StateResponse<Url>>,
    },
    Shutdown,
}
