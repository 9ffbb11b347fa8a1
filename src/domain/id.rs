//! Domain identifiers
//!
//! All generated identifiers use the form `{8-char-hex}-{kind}`, e.g.
//! `019431a2-url`. The hex prefix comes from a UUIDv7 so IDs sort roughly
//! by creation time without needing a separate counter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Generate a domain identifier from a kind tag (`"url"`, `"link"`, `"session"`, ...).
pub fn generate_id(kind: &str) -> String {
    let uuid = uuid::Uuid::now_v7();
    let hex_prefix = &uuid.simple().to_string()[..8];
    format!("{hex_prefix}-{kind}")
}

/// A type-safe wrapper around a generated domain identifier.
///
/// Distinct newtypes (`UrlId`, `ItemKey`, `SessionId`) are built on top of
/// this so the compiler catches an `ItemKey` passed where a `UrlId` is
/// expected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DomainId(String);

impl DomainId {
    pub fn new(kind: &str) -> Self {
        Self(generate_id(kind))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DomainId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DomainId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DomainId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for DomainId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DomainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

macro_rules! domain_id_newtype {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(DomainId);

        impl $name {
            pub fn generate() -> Self {
                Self(DomainId::new($kind))
            }

            pub fn from_string(id: impl Into<String>) -> Self {
                Self(DomainId::from_string(id))
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from_string(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from_string(s)
            }
        }
    };
}

domain_id_newtype!(UrlId, "url");
domain_id_newtype!(LinkId, "link");
domain_id_newtype!(SessionId, "batch");

/// Zotero's own stable identifier for a library item. Not generated by us —
/// always assigned by the `ZoteroClient` collaborator — so it is a thin
/// wrapper rather than a `domain_id_newtype!`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ItemKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Current time in Unix milliseconds, used for every timestamp in the
/// domain model. A single helper keeps the rounding/overflow behavior
/// consistent across record types.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
