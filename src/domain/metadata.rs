//! Shared record types passed across the collaborator boundary:
//! identifiers, extracted metadata and citation-validation results.

use serde::{Deserialize, Serialize};

/// The identifier kinds the Zotero lookup stage and the content-scraping
/// stage both recognize, in the priority order a configuration can
/// override (`identifierPriority`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdentifierKind {
    Doi,
    Pmid,
    #[serde(rename = "ARXIV")]
    Arxiv,
    Isbn,
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Doi => "DOI",
            Self::Pmid => "PMID",
            Self::Arxiv => "arXiv",
            Self::Isbn => "ISBN",
        };
        write!(f, "{s}")
    }
}

/// A single identifier scraped from page content or supplied by the user,
/// carrying enough context for `selectIdentifier` to re-promote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub kind: IdentifierKind,
    pub value: String,
}

/// Bibliographic fields produced by the LLM extraction stage. Every field
/// is optional: a partial record is still usable (it drives
/// `stored_incomplete` rather than `stored`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub doi: Option<String>,
    pub abstract_text: Option<String>,
    pub identifiers: Vec<Identifier>,
}

impl ExtractedMetadata {
    /// The required fields a "valid citation" needs: title, at least one
    /// author, and a year. Everything else is supplementary.
    pub fn has_required_fields(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.trim().is_empty())
            && !self.authors.is_empty()
            && self.year.is_some()
    }
}

/// Result of asking the Zotero collaborator whether a linked item's
/// citation still satisfies the required-fields rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationValidation {
    pub has_required_fields: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_metadata_has_required_fields() {
        let meta = ExtractedMetadata {
            title: Some("A Paper".into()),
            authors: vec!["A. Author".into()],
            year: Some(2020),
            ..Default::default()
        };
        assert!(meta.has_required_fields());
    }

    #[test]
    fn missing_year_fails_required_fields() {
        let meta = ExtractedMetadata {
            title: Some("A Paper".into()),
            authors: vec!["A. Author".into()],
            year: None,
            ..Default::default()
        };
        assert!(!meta.has_required_fields());
    }

    #[test]
    fn blank_title_fails_required_fields() {
        let meta = ExtractedMetadata {
            title: Some("   ".into()),
            authors: vec!["A. Author".into()],
            year: Some(2020),
            ..Default::default()
        };
        assert!(!meta.has_required_fields());
    }
}
