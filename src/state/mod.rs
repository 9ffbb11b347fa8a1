//! State management with actor pattern.
//!
//! `StateManager` owns write access to every URL's `processingStatus` and
//! processes commands via channels, giving per-URL exclusivity for free:
//! concurrent callers serialize through the actor's single command loop.

mod machine;
mod manager;
mod messages;

pub use machine::{check_transition, is_legal_transition, validate_transition_graph, TransitionError};
pub use manager::{StateHooks, StateManager};
pub use messages::{StateCommand, StateError, StateResponse};
