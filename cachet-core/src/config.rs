//! Configuration types
//!
//! Every section deserializes from TOML with defaults for missing fields:
//!
//! ```toml
//! [query]
//! namespace = "q"
//! version = "v3"
//! default_ttl_secs = 120
//!
//! [entity]
//! root_key = "user"
//! cache_not_found = false
//!
//! [counter]
//! root_key = "follower_count"
//!
//! [tags]
//! prefix = "tag"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ConfigError, KEY_SEPARATOR};

/// Multi-get requests are capped at this many keys.
pub const DEFAULT_READ_BATCH_SIZE: usize = 200;

/// Lookup collaborator calls are capped at this many ids.
pub const DEFAULT_LOOKUP_BATCH_SIZE: usize = 10_000;

/// Seconds a bust suppresses re-caching.
pub const DEFAULT_DEBOUNCE_WINDOW_SECS: u64 = 10;

/// Whole seconds in `duration`, rounding any fraction up.
fn whole_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn default_query_namespace() -> String {
    "query".to_string()
}

fn default_query_ttl_secs() -> u64 {
    300
}

fn default_entity_root_key() -> String {
    "entity".to_string()
}

fn default_entry_ttl_secs() -> u64 {
    3600
}

fn default_debounce_window_secs() -> u64 {
    DEFAULT_DEBOUNCE_WINDOW_SECS
}

fn default_true() -> bool {
    true
}

fn default_read_batch_size() -> usize {
    DEFAULT_READ_BATCH_SIZE
}

fn default_lookup_batch_size() -> usize {
    DEFAULT_LOOKUP_BATCH_SIZE
}

fn default_counter_root_key() -> String {
    "counter".to_string()
}

fn default_tag_prefix() -> String {
    "tag".to_string()
}

/// Query result cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCacheConfig {
    #[serde(default = "default_query_namespace")]
    pub namespace: String,
    /// Bumping the version orphans every previously cached result.
    #[serde(default)]
    pub version: Option<String>,
    /// TTL used when a run does not specify one. Zero disables caching.
    #[serde(default = "default_query_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            namespace: default_query_namespace(),
            version: None,
            default_ttl_secs: default_query_ttl_secs(),
        }
    }
}

impl QueryCacheConfig {
    /// Create settings for the given key namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Set the version segment of every key.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the default TTL. Fractions of a second round up.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_secs = whole_secs(ttl);
        self
    }

    /// The default TTL as a duration.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_segment("query.namespace", &self.namespace)?;
        if let Some(version) = &self.version {
            validate_segment("query.version", version)?;
        }
        Ok(())
    }
}

/// Batch entity cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCacheConfig {
    #[serde(default = "default_entity_root_key")]
    pub root_key: String,
    #[serde(default = "default_entry_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_debounce_window_secs")]
    pub debounce_window_secs: u64,
    /// Write tombstones for ids the lookup did not return.
    #[serde(default = "default_true")]
    pub cache_not_found: bool,
    #[serde(default = "default_read_batch_size")]
    pub read_batch_size: usize,
    #[serde(default = "default_lookup_batch_size")]
    pub lookup_batch_size: usize,
}

impl Default for EntityCacheConfig {
    fn default() -> Self {
        Self {
            root_key: default_entity_root_key(),
            ttl_secs: default_entry_ttl_secs(),
            debounce_window_secs: default_debounce_window_secs(),
            cache_not_found: true,
            read_batch_size: default_read_batch_size(),
            lookup_batch_size: default_lookup_batch_size(),
        }
    }
}

impl EntityCacheConfig {
    /// Create settings for entities stored under `root_key`.
    pub fn new(root_key: impl Into<String>) -> Self {
        Self {
            root_key: root_key.into(),
            ..Self::default()
        }
    }

    /// Set the entry TTL. Fractions of a second round up.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = whole_secs(ttl);
        self
    }

    /// Set how long a bust suppresses re-caching. Fractions of a second round up.
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window_secs = whole_secs(window);
        self
    }

    /// Enable or disable tombstones for absent ids.
    pub fn with_cache_not_found(mut self, enabled: bool) -> Self {
        self.cache_not_found = enabled;
        self
    }

    /// Set the maximum keys per multi-get.
    pub fn with_read_batch_size(mut self, size: usize) -> Self {
        self.read_batch_size = size;
        self
    }

    /// Set the maximum ids per lookup call.
    pub fn with_lookup_batch_size(mut self, size: usize) -> Self {
        self.lookup_batch_size = size;
        self
    }

    /// The entry TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// The debounce window as a duration.
    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_window_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_segment("entity.root_key", &self.root_key)?;
        validate_positive("entity.ttl_secs", self.ttl_secs as u128)?;
        validate_positive("entity.debounce_window_secs", self.debounce_window_secs as u128)?;
        validate_positive("entity.read_batch_size", self.read_batch_size as u128)?;
        validate_positive("entity.lookup_batch_size", self.lookup_batch_size as u128)?;
        Ok(())
    }
}

/// Counter cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterCacheConfig {
    #[serde(default = "default_counter_root_key")]
    pub root_key: String,
    #[serde(default = "default_entry_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CounterCacheConfig {
    fn default() -> Self {
        Self {
            root_key: default_counter_root_key(),
            ttl_secs: default_entry_ttl_secs(),
        }
    }
}

impl CounterCacheConfig {
    /// Create settings for counters stored under `root_key`.
    pub fn new(root_key: impl Into<String>) -> Self {
        Self {
            root_key: root_key.into(),
            ..Self::default()
        }
    }

    /// Set the counter TTL. Fractions of a second round up.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = whole_secs(ttl);
        self
    }

    /// The counter TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_segment("counter.root_key", &self.root_key)?;
        validate_positive("counter.ttl_secs", self.ttl_secs as u128)
    }
}

/// Tag registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagConfig {
    #[serde(default = "default_tag_prefix")]
    pub prefix: String,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            prefix: default_tag_prefix(),
        }
    }
}

impl TagConfig {
    /// Create settings with tag sets stored under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_segment("tags.prefix", &self.prefix)
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub query: QueryCacheConfig,
    #[serde(default)]
    pub entity: EntityCacheConfig,
    #[serde(default)]
    pub counter: CounterCacheConfig,
    #[serde(default)]
    pub tags: TagConfig,
}

impl CacheSettings {
    /// Parse and validate settings from a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(input).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.query.validate()?;
        self.entity.validate()?;
        self.counter.validate()?;
        self.tags.validate()?;

        // Every section prefixes keys of the form `<prefix>:<name>`.
        let prefixes = [
            ("tags.prefix", self.tags.prefix.as_str()),
            ("entity.root_key", self.entity.root_key.as_str()),
            ("counter.root_key", self.counter.root_key.as_str()),
            ("query.namespace", self.query.namespace.as_str()),
        ];
        for (i, (field_a, a)) in prefixes.iter().enumerate() {
            if let Some((field_b, _)) = prefixes[i + 1..].iter().find(|(_, b)| b == a) {
                return Err(ConfigError::IncompatibleOptions {
                    option_a: field_a.to_string(),
                    option_b: field_b.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn validate_segment(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::MissingRequired {
            field: field.to_string(),
        });
    }
    if value.contains(KEY_SEPARATOR) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: format!("must not contain '{}'", KEY_SEPARATOR),
        });
    }
    Ok(())
}

fn validate_positive(field: &str, value: u128) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
