use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::parser::Entry;

/// Separator between title and summary in the hash input. A C0 control
/// character cannot survive XML parsing, so it never occurs in either field.
const FIELD_SEPARATOR: char = '\u{1f}';

/// Prefix marking a content-hash identity, keeping it disjoint from any link.
const HASH_PREFIX: &str = "sha256:";

/// Dedup key for an entry within its feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryIdentity(String);

impl EntryIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntryIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EntryIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Derives the stable identity of an entry.
///
/// A non-blank link is used as-is after trimming surrounding whitespace; no
/// other normalization is applied, so trailing slashes and query strings are
/// significant. Without a link the identity is the SHA-256 of title and summary.
///
/// Pure: depends only on the entry's fields, never on process state.
pub fn identify(entry: &Entry) -> EntryIdentity {
    if let Some(link) = entry.link.as_deref().map(str::trim) {
        if !link.is_empty() {
            return EntryIdentity(link.to_string());
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(entry.title.as_bytes());
    hasher.update(FIELD_SEPARATOR.to_string().as_bytes());
    hasher.update(entry.summary.as_deref().unwrap_or("").as_bytes());
    EntryIdentity(format!("{}{:x}", HASH_PREFIX, hasher.finalize()))
}
