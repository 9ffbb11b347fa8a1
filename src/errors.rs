//! Error taxonomy and the retry/backoff policy attached to it.
//!
//! A closed `thiserror` enum with `is_retryable`/`cascades`-style predicate
//! methods, so retry policy lives in one place instead of being scattered
//! as `match`es over error variants at every call site.

use std::time::Duration;
use thiserror::Error;

/// The nine categories every surfaced collaborator failure is classified
/// into. No untyped error crosses the core boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    HttpServer,
    RateLimit,
    ZoteroApi,
    HttpClient,
    Parsing,
    Validation,
    Permanent,
    Unknown,
}

impl ErrorCategory {
    /// Whether a stage should retry in place after this category of
    /// failure.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::HttpServer | Self::RateLimit | Self::ZoteroApi | Self::Unknown
        )
    }

    /// Whether, once retries are exhausted, the orchestrator should fall
    /// through to the next stage rather than stopping at `exhausted`.
    pub fn cascades(self) -> bool {
        match self {
            Self::Network | Self::HttpServer | Self::ZoteroApi | Self::HttpClient | Self::Parsing | Self::Permanent | Self::Unknown => true,
            // rate_limit waits and retries the same stage; validation stops outright.
            Self::RateLimit | Self::Validation => false,
        }
    }

    /// Base delay before the first retry.
    pub fn base_delay(self) -> Duration {
        match self {
            Self::Network => Duration::from_secs(2),
            Self::HttpServer => Duration::from_secs(5),
            Self::RateLimit => Duration::from_secs(10),
            Self::ZoteroApi => Duration::from_secs(3),
            Self::Unknown => Duration::from_secs(1),
            // Non-retryable categories never consult this value.
            Self::HttpClient | Self::Parsing | Self::Validation | Self::Permanent => Duration::ZERO,
        }
    }

    /// Whether a single retry attempt is allowed even though the category
    /// is nominally non-retryable-forever (`unknown` gets exactly one).
    pub fn max_attempts(self) -> u32 {
        if self == Self::Unknown { 1 } else if self.is_retryable() { 3 } else { 0 }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::HttpServer => "http_server",
            Self::RateLimit => "rate_limit",
            Self::ZoteroApi => "zotero_api",
            Self::HttpClient => "http_client",
            Self::Parsing => "parsing",
            Self::Validation => "validation",
            Self::Permanent => "permanent",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Cap on exponential backoff (`backoffMaxMs` in configuration).
pub const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// `min(base * 2^(n-1), 60s)` for the n-th attempt (1-indexed).
pub fn backoff_delay(category: ErrorCategory, attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    let base = category.base_delay();
    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    let scaled = base.checked_mul(factor as u32).unwrap_or(BACKOFF_MAX);
    scaled.min(BACKOFF_MAX)
}

/// A raw failure reported by a collaborator, before classification.
/// Deliberately minimal: the classifier pattern-matches on shape, never on
/// a concrete collaborator error type, so new collaborators don't require
/// new classifier branches.
#[derive(Debug, Clone)]
pub struct RawError {
    pub status_code: Option<u16>,
    pub message: String,
    pub kind: RawErrorKind,
}

/// A coarse discriminant the calling collaborator supplies alongside the
/// raw message/status, used when status codes alone are ambiguous (e.g. a
/// parse failure has no HTTP status at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawErrorKind {
    Http,
    Network,
    Parsing,
    Validation,
    Zotero,
    Other,
}

impl RawError {
    pub fn new(kind: RawErrorKind, message: impl Into<String>) -> Self {
        Self { status_code: None, message: message.into(), kind }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }
}

/// Classify a raw collaborator failure into one of the nine categories.
/// Deterministic and side-effect-free.
pub fn classify(err: &RawError) -> ErrorCategory {
    match err.kind {
        RawErrorKind::Zotero => ErrorCategory::ZoteroApi,
        RawErrorKind::Parsing => ErrorCategory::Parsing,
        RawErrorKind::Validation => ErrorCategory::Validation,
        RawErrorKind::Network => ErrorCategory::Network,
        RawErrorKind::Http => match err.status_code {
            Some(429) => ErrorCategory::RateLimit,
            Some(s) if (500..600).contains(&s) => ErrorCategory::HttpServer,
            Some(s) if (400..500).contains(&s) => ErrorCategory::HttpClient,
            _ => ErrorCategory::Unknown,
        },
        RawErrorKind::Other => {
            let lower = err.message.to_lowercase();
            if lower.contains("timeout") || lower.contains("connection") {
                ErrorCategory::Network
            } else {
                ErrorCategory::Unknown
            }
        }
    }
}

/// A fully classified error attached to a `ProcessingAttempt` or returned
/// from the orchestrator. Carries enough for the UI to render "what's
/// next" guidance without the core knowing anything about the UI.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("{category}: {message}")]
pub struct ProcessingFailure {
    pub category: ErrorCategory,
    pub message: String,
}

impl ProcessingFailure {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self { category, message: message.into() }
    }

    pub fn from_raw(raw: &RawError) -> Self {
        Self { category: classify(raw), message: raw.message.clone() }
    }
}

/// Programming errors: invariant violations that should never happen in a
/// correct caller. These are logged, not shown to users.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("transition error: {0}")]
    Transition(#[from] crate::state::TransitionError),

    #[error("guard refused: {0}")]
    GuardRefused(String),

    #[error("required collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Store(#[from] crate::collaborators::store::StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_never_cascades() {
        assert!(!ErrorCategory::RateLimit.cascades());
    }

    #[test]
    fn validation_never_cascades() {
        assert!(!ErrorCategory::Validation.cascades());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(ErrorCategory::Network, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(ErrorCategory::Network, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(ErrorCategory::Network, 3), Duration::from_secs(8));
        // 10 * 2^9 would be far beyond 60s; must be capped.
        assert_eq!(backoff_delay(ErrorCategory::RateLimit, 10), BACKOFF_MAX);
    }

    #[test]
    fn classifies_429_as_rate_limit() {
        let raw = RawError::new(RawErrorKind::Http, "too many requests").with_status(429);
        assert_eq!(classify(&raw), ErrorCategory::RateLimit);
    }

    #[test]
    fn classifies_5xx_as_http_server() {
        let raw = RawError::new(RawErrorKind::Http, "bad gateway").with_status(502);
        assert_eq!(classify(&raw), ErrorCategory::HttpServer);
    }

    #[test]
    fn classifies_4xx_non_429_as_http_client() {
        let raw = RawError::new(RawErrorKind::Http, "not found").with_status(404);
        assert_eq!(classify(&raw), ErrorCategory::HttpClient);
        assert!(!ErrorCategory::HttpClient.is_retryable());
    }

    #[test]
    fn unknown_allows_exactly_one_retry() {
        assert_eq!(ErrorCategory::Unknown.max_attempts(), 1);
        assert_eq!(ErrorCategory::Network.max_attempts(), 3);
        assert_eq!(ErrorCategory::Validation.max_attempts(), 0);
    }

    mod backoff_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn backoff_never_exceeds_the_cap(
                attempt in 1u32..64,
                category in prop_oneof![
                    Just(ErrorCategory::Network),
                    Just(ErrorCategory::HttpServer),
                    Just(ErrorCategory::RateLimit),
                    Just(ErrorCategory::ZoteroApi),
                    Just(ErrorCategory::Unknown),
                ],
            ) {
                prop_assert!(backoff_delay(category, attempt) <= BACKOFF_MAX);
            }
        }
    }
}
