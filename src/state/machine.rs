//! The transition table and the pure legality check over it.
//!
//! A simple `(from, to) -> bool` legality predicate over an explicit edge
//! list: the destination status is the only discriminant a caller needs,
//! so there's no separate event type to thread through.

use thiserror::Error;

use crate::domain::ProcessingStatus;

/// Every legal `(from, to)` edge a URL's processing status can take.
/// Grouped transitions are expanded here into explicit pairs so this
/// table can be walked without re-deriving grouped prose at runtime.
const EDGES: &[(ProcessingStatus, ProcessingStatus)] = {
    use ProcessingStatus::*;
    &[
        // not_started -> ...
        (NotStarted, ProcessingZotero),
        (NotStarted, ProcessingContent),
        (NotStarted, ProcessingLlm),
        (NotStarted, Ignored),
        (NotStarted, Archived),
        // processing_zotero -> ...
        (ProcessingZotero, Stored),
        (ProcessingZotero, StoredIncomplete),
        (ProcessingZotero, ProcessingContent),
        (ProcessingZotero, Exhausted),
        (ProcessingZotero, AwaitingSelection),
        // reset is the universal escape hatch, including out of a stuck processing_* stage.
        (ProcessingZotero, NotStarted),
        // processing_content -> ...
        (ProcessingContent, AwaitingSelection),
        (ProcessingContent, AwaitingMetadata),
        (ProcessingContent, ProcessingLlm),
        (ProcessingContent, Exhausted),
        // single content-scraped identifier re-promotes into the Zotero stage.
        (ProcessingContent, ProcessingZotero),
        (ProcessingContent, NotStarted),
        // processing_llm -> ...
        (ProcessingLlm, AwaitingMetadata),
        (ProcessingLlm, Exhausted),
        (ProcessingLlm, NotStarted),
        // awaiting_selection -> ...
        (AwaitingSelection, ProcessingZotero),
        (AwaitingSelection, Exhausted),
        (AwaitingSelection, NotStarted),
        // awaiting_metadata -> ...
        (AwaitingMetadata, Stored),
        (AwaitingMetadata, StoredIncomplete),
        (AwaitingMetadata, Exhausted),
        (AwaitingMetadata, NotStarted),
        // exhausted -> ...
        // exhausted is a startable status (canStartProcessing), so a fresh
        // cascade re-enters processing_zotero directly from here too.
        (Exhausted, ProcessingZotero),
        (Exhausted, NotStarted),
        (Exhausted, StoredCustom),
        (Exhausted, Ignored),
        (Exhausted, Archived),
        // stored <-> stored_incomplete, and both -> not_started/archived
        (Stored, StoredIncomplete),
        (Stored, NotStarted),
        (Stored, Archived),
        (StoredIncomplete, Stored),
        (StoredIncomplete, NotStarted),
        (StoredIncomplete, Archived),
        // stored_custom -> ...
        (StoredCustom, NotStarted),
        (StoredCustom, Archived),
        // ignored -> ...
        (Ignored, NotStarted),
        (Ignored, Archived),
        // archived -> ...
        (Archived, NotStarted),
        (Archived, Ignored),
    ]
};

/// Whether `(from, to)` is a legal edge. Self-loops are always illegal,
/// even if a caller hand-built an edge list that (incorrectly) contained
/// one — the no-self-loop rule is enforced structurally, not just by
/// EDGES happening to omit them.
pub fn is_legal_transition(from: ProcessingStatus, to: ProcessingStatus) -> bool {
    if from == to {
        return false;
    }
    EDGES.iter().any(|&(f, t)| f == from && t == to)
}

/// Errors a `transition` call can fail with.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("expected status {expected} but found {actual}")]
    InvalidTransition {
        expected: ProcessingStatus,
        actual: ProcessingStatus,
    },
    #[error("no such transition: {from} -> {to}")]
    IllegalTransition {
        from: ProcessingStatus,
        to: ProcessingStatus,
    },
}

/// Check a transition is legal, given the status the caller expects the
/// URL to currently be in. Pure — no I/O, no history mutation. The
/// `StateManager` actor is the component that performs the check and then
/// atomically commits the write + history append.
pub fn check_transition(
    current: ProcessingStatus,
    expected_from: ProcessingStatus,
    to: ProcessingStatus,
) -> Result<(), TransitionError> {
    if current != expected_from {
        return Err(TransitionError::InvalidTransition {
            expected: expected_from,
            actual: current,
        });
    }
    if !is_legal_transition(expected_from, to) {
        return Err(TransitionError::IllegalTransition { from: expected_from, to });
    }
    Ok(())
}

/// All twelve statuses, for reachability checks.
fn all_statuses() -> [ProcessingStatus; 12] {
    use ProcessingStatus::*;
    [
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
    ]
}

/// Run at process start: every non-terminal status must be reachable
/// from `not_started`, every terminal status must be reachable, and
/// there must be no orphans. Startup aborts if this fails.
pub fn validate_transition_graph() -> Result<(), String> {
    use std::collections::HashSet;

    let mut reachable: HashSet<ProcessingStatus> = HashSet::new();
    let mut frontier = vec![ProcessingStatus::NotStarted];
    reachable.insert(ProcessingStatus::NotStarted);

    while let Some(status) = frontier.pop() {
        for &(from, to) in EDGES {
            if from == status && reachable.insert(to) {
                frontier.push(to);
            }
        }
    }

    let unreachable: Vec<ProcessingStatus> = all_statuses()
        .into_iter()
        .filter(|s| !reachable.contains(s))
        .collect();

    if !unreachable.is_empty() {
        return Err(format!(
            "unreachable statuses from not_started: {:?}",
            unreachable.iter().map(ToString::to_string).collect::<Vec<_>>()
        ));
    }

    // An "orphan" is a non-not_started status with no incoming edge at all.
    let mut has_incoming: HashSet<ProcessingStatus> = HashSet::new();
    for &(_, to) in EDGES {
        has_incoming.insert(to);
    }
    let orphans: Vec<ProcessingStatus> = all_statuses()
        .into_iter()
        .filter(|&s| s != ProcessingStatus::NotStarted && !has_incoming.contains(&s))
        .collect();

    if !orphans.is_empty() {
        return Err(format!(
            "orphan statuses with no incoming edge: {:?}",
            orphans.iter().map(ToString::to_string).collect::<Vec<_>>()
        ));
    }

    Ok(())
}
