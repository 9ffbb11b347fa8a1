//! `ProcessingCapability` — computed, never stored. Derived per-URL from
//! database state and configured providers so the UI (and the
//! orchestrator, for the `canUseLLM` check) can present/consult available
//! actions without the state machine itself depending on it.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessingCapability {
    pub has_identifiers: bool,
    pub has_translators: bool,
    pub has_content_cached: bool,
    pub can_use_llm: bool,
    pub is_pdf: bool,
    pub has_multiple_identifiers: bool,
    pub has_valid_citation: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capability_disallows_everything() {
        let cap = ProcessingCapability::default();
        assert!(!cap.can_use_llm);
        assert!(!cap.has_identifiers);
    }
}
