//! `ProcessingAttempt` — one append-only record per stage invocation or
//! transition event.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::id::{now_ms, ItemKey};
use super::status::ProcessingStatus;
use crate::errors::ErrorCategory;

/// One attempt at extraction via a specific method, or a bookkeeping
/// `transition`/`manual` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ZoteroIdentifier,
    ZoteroUrl,
    ContentExtraction,
    Llm,
    Manual,
    Transition,
}

impl Stage {
    /// Whether an attempt of this stage counts toward `processingAttempts`.
    pub fn counts_toward_attempts(self) -> bool {
        !matches!(self, Self::Transition | Self::Manual)
    }
}

/// The `from`/`to` pair recorded on a `transition`-stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: ProcessingStatus,
    pub to: ProcessingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingAttempt {
    pub timestamp: i64,
    pub stage: Stage,
    pub method: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_key: Option<ItemKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<TransitionRecord>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl ProcessingAttempt {
    /// Build an attempt describing a successful or failed stage invocation
    /// (not a bookkeeping transition — use [`ProcessingAttempt::transition`]
    /// for those).
    pub fn stage_result(stage: Stage, method: impl Into<String>, success: bool) -> Self {
        Self {
            timestamp: now_ms(),
            stage,
            method: method.into(),
            success,
            item_key: None,
            duration_ms: None,
            error_category: None,
            error_message: None,
            transition: None,
            metadata: HashMap::new(),
        }
    }

    /// Build the bookkeeping entry a `transition` call appends on every
    /// state change.
    pub fn transition(method: impl Into<String>, from: ProcessingStatus, to: ProcessingStatus) -> Self {
        Self {
            timestamp: now_ms(),
            stage: Stage::Transition,
            method: method.into(),
            success: true,
            item_key: None,
            duration_ms: None,
            error_category: None,
            error_message: None,
            transition: Some(TransitionRecord { from, to }),
            metadata: HashMap::new(),
        }
    }

    pub fn with_item_key(mut self, key: ItemKey) -> Self {
        self.item_key = Some(key);
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn with_error(mut self, category: ErrorCategory, message: impl Into<String>) -> Self {
        self.error_category = Some(category);
        self.error_message = Some(message.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
