//! Namespace-scoped cache keys.
//!
//! Every key the cache layer touches is built here so the layout stays in one
//! place:
//!
//! ```text
//! <root_key>:<id>                       entity and counter entries
//! <namespace>:<version>:<query_hash>    versioned query results
//! <namespace>:<query_hash>              unversioned query results
//! <tag_prefix>:<tag>                    tag key-sets
//! ```
//!
//! Namespaces and root keys are validated (see [`crate::config`]) not to
//! contain [`KEY_SEPARATOR`], so keys from distinct namespaces cannot collide.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::EntityId;

/// Separator between key segments.
pub const KEY_SEPARATOR: char = ':';

/// A fully-qualified key in the key-value store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a single entity or counter: `<root_key>:<id>`.
    pub fn entity(root_key: &str, id: EntityId) -> Self {
        Self(format!("{}{}{}", root_key, KEY_SEPARATOR, id))
    }

    /// Key for a query result: `<namespace>[:<version>]:<hash>`.
    pub fn query(namespace: &str, version: Option<&str>, query_hash: &str) -> Self {
        match version {
            Some(version) => Self(format!(
                "{ns}{sep}{version}{sep}{hash}",
                ns = namespace,
                sep = KEY_SEPARATOR,
                version = version,
                hash = query_hash
            )),
            None => Self(format!("{}{}{}", namespace, KEY_SEPARATOR, query_hash)),
        }
    }

    /// Key of the set holding every cache key registered under `tag`.
    pub fn tag_set(prefix: &str, tag: &str) -> Self {
        Self(format!("{}{}{}", prefix, KEY_SEPARATOR, tag))
    }

    /// Wrap an already-qualified key (e.g. a tag set member read back from the
    /// store).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}
