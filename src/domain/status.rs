//! `ProcessingStatus` and `UserIntent` — the two closed enumerations that
//! drive the rest of the core.

use serde::{Deserialize, Serialize};

/// The twelve discrete processing statuses a URL can occupy.
///
/// This is the primary discriminant the whole core pivots on. The state
/// machine is the only component allowed to write it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Never processed, or reset back to the initial state.
    #[default]
    NotStarted,
    /// Stage 1 (identifier-based Zotero lookup) in flight.
    ProcessingZotero,
    /// Stage 2 (content-based identifier scraping) in flight.
    ProcessingContent,
    /// Stage 3 (LLM metadata extraction) in flight.
    ProcessingLlm,
    /// Multiple identifiers were found; needs the user to pick one.
    AwaitingSelection,
    /// Extracted metadata is pending user approval.
    AwaitingMetadata,
    /// Linked to a Zotero item with a valid citation.
    Stored,
    /// Linked, but the citation is missing at least one required field.
    StoredIncomplete,
    /// Linked via the manual user-creation path.
    StoredCustom,
    /// All automated stages failed; the user must act.
    Exhausted,
    /// The user explicitly skipped this URL.
    Ignored,
    /// The user hid this URL permanently.
    Archived,
}

impl ProcessingStatus {
    /// A status from which no automatic processing occurs. Manual actions
    /// (edit, unlink, reset) may still apply.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Stored
                | Self::StoredIncomplete
                | Self::StoredCustom
                | Self::Exhausted
                | Self::Ignored
                | Self::Archived
        )
    }

    /// A `processing_*` status; a URL in this status is owned by an
    /// in-flight orchestrator task.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::ProcessingZotero | Self::ProcessingContent | Self::ProcessingLlm)
    }

    /// Whether this status belongs to the "stored" family: whenever true,
    /// `linkedItemCount` must be at least 1.
    pub fn is_stored_family(self) -> bool {
        matches!(self, Self::Stored | Self::StoredIncomplete | Self::StoredCustom)
    }

    /// Statuses from which the orchestrator is allowed to start a fresh
    /// cascade; starting from anywhere else is refused.
    pub fn is_startable(self) -> bool {
        matches!(self, Self::NotStarted | Self::Exhausted)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::ProcessingZotero => "processing_zotero",
            Self::ProcessingContent => "processing_content",
            Self::ProcessingLlm => "processing_llm",
            Self::AwaitingSelection => "awaiting_selection",
            Self::AwaitingMetadata => "awaiting_metadata",
            Self::Stored => "stored",
            Self::StoredIncomplete => "stored_incomplete",
            Self::StoredCustom => "stored_custom",
            Self::Exhausted => "exhausted",
            Self::Ignored => "ignored",
            Self::Archived => "archived",
        };
        write!(f, "{s}")
    }
}

/// Orthogonal, user-set advisory flag. Influences batch behaviour but
/// never overrides the state machine's transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserIntent {
    #[default]
    Auto,
    Priority,
    Ignore,
    ManualOnly,
    Archive,
}

impl UserIntent {
    /// Whether the batch processor should skip a URL with this intent
    /// when `respectIntent` is set.
    pub fn skips_batch(self) -> bool {
        matches!(self, Self::Ignore | Self::Archive)
    }
}

impl std::fmt::Display for UserIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Auto => "auto",
            Self::Priority => "priority",
            Self::Ignore => "ignore",
            Self::ManualOnly => "manual_only",
            Self::Archive => "archive",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_exactly_six() {
        use ProcessingStatus::*;
        let all = [
            NotStarted,
            ProcessingZotero,
            ProcessingContent,
            ProcessingLlm,
            AwaitingSelection,
            AwaitingMetadata,
            Stored,
            StoredIncomplete,
            StoredCustom,
            Exhausted,
            Ignored,
            Archived,
        ];
        assert_eq!(all.iter().filter(|s| s.is_terminal()).count(), 6);
    }

    #[test]
    fn transient_statuses_are_exactly_three() {
        use ProcessingStatus::*;
        let all = [
            NotStarted,
            ProcessingZotero,
            ProcessingContent,
            ProcessingLlm,
            AwaitingSelection,
            AwaitingMetadata,
            Stored,
            StoredIncomplete,
            StoredCustom,
            Exhausted,
            Ignored,
            Archived,
        ];
        assert_eq!(all.iter().filter(|s| s.is_transient()).count(), 3);
    }

    #[test]
    fn display_matches_wire_format() {
        assert_eq!(ProcessingStatus::NotStarted.to_string(), "not_started");
        assert_eq!(ProcessingStatus::StoredIncomplete.to_string(), "stored_incomplete");
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ProcessingStatus::AwaitingSelection).unwrap();
        assert_eq!(json, "\"awaiting_selection\"");
    }

    #[test]
    fn ignore_and_archive_skip_batch() {
        assert!(UserIntent::Ignore.skips_batch());
        assert!(UserIntent::Archive.skips_batch());
        assert!(!UserIntent::Auto.skips_batch());
        assert!(!UserIntent::Priority.skips_batch());
        assert!(!UserIntent::ManualOnly.skips_batch());
    }
}
