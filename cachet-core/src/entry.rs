//! Entity cache entries.
//!
//! An entry is exactly one of a positive value, a not-found tombstone, or a
//! debounce marker written by a bust. Modelling the states as enum variants
//! means "not found" and "debounced" can never be set on the same entry.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{EntityId, Timestamp};

/// A cached lookup result for a single entity id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CacheEntry<T> {
    /// The entity exists; `value` is the record as returned by the lookup.
    Positive {
        id: EntityId,
        value: T,
        cached_at: Timestamp,
    },
    /// The entity was looked up and does not exist.
    Tombstone { id: EntityId, cached_at: Timestamp },
    /// The entity was recently busted. Neither served nor re-cached while
    /// the debounce window is open.
    Debounced { id: EntityId, cached_at: Timestamp },
}

impl<T> CacheEntry<T> {
    pub fn positive(id: EntityId, value: T, cached_at: Timestamp) -> Self {
        Self::Positive {
            id,
            value,
            cached_at,
        }
    }

    pub fn tombstone(id: EntityId, cached_at: Timestamp) -> Self {
        Self::Tombstone { id, cached_at }
    }

    pub fn debounced(id: EntityId, cached_at: Timestamp) -> Self {
        Self::Debounced { id, cached_at }
    }

    pub fn id(&self) -> EntityId {
        match self {
            Self::Positive { id, .. } | Self::Tombstone { id, .. } | Self::Debounced { id, .. } => {
                *id
            }
        }
    }

    pub fn cached_at(&self) -> Timestamp {
        match self {
            Self::Positive { cached_at, .. }
            | Self::Tombstone { cached_at, .. }
            | Self::Debounced { cached_at, .. } => *cached_at,
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Positive { .. })
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::Tombstone { .. })
    }

    pub fn is_debounced(&self) -> bool {
        matches!(self, Self::Debounced { .. })
    }

    /// True for a debounce marker written less than `window` before `now`.
    ///
    /// The comparison is strict: a marker written exactly `window` ago is
    /// no longer active.
    pub fn debounce_active(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self {
            Self::Debounced { cached_at, .. } => {
                let window = ChronoDuration::from_std(window).unwrap_or(ChronoDuration::MAX);
                match now.checked_sub_signed(window) {
                    Some(threshold) => *cached_at > threshold,
                    None => true,
                }
            }
            _ => false,
        }
    }

    /// Consume the entry, returning the value of a positive entry.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Positive { value, .. } => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn test_accessors() {
        let entry = CacheEntry::positive(7, "seven".to_string(), at(0));
        assert_eq!(entry.id(), 7);
        assert_eq!(entry.cached_at(), at(0));
        assert!(entry.is_positive());
        assert_eq!(entry.into_value(), Some("seven".to_string()));

        let tomb: CacheEntry<String> = CacheEntry::tombstone(8, at(1));
        assert!(tomb.is_tombstone());
        assert_eq!(tomb.into_value(), None);
    }

    #[test]
    fn test_debounce_window_is_strict() {
        let window = Duration::from_secs(10);
        let marker: CacheEntry<()> = CacheEntry::debounced(1, at(0));

        assert!(marker.debounce_active(at(0), window));
        assert!(marker.debounce_active(at(9), window));
        assert!(!marker.debounce_active(at(10), window));
        assert!(!marker.debounce_active(at(60), window));
    }

    #[test]
    fn test_non_markers_never_debounce() {
        let window = Duration::from_secs(10);
        let positive = CacheEntry::positive(1, 1u8, at(0));
        let tomb: CacheEntry<u8> = CacheEntry::tombstone(1, at(0));
        assert!(!positive.debounce_active(at(0), window));
        assert!(!tomb.debounce_active(at(0), window));
    }

    #[test]
    fn test_serialized_state_tag() {
        let marker: CacheEntry<u8> = CacheEntry::debounced(3, at(0));
        let json = serde_json::to_value(&marker).expect("serialize");
        assert_eq!(json["state"], "debounced");
        assert_eq!(json["id"], 3);
        assert!(json.get("value").is_none());

        let positive = CacheEntry::positive(3, 9u8, at(0));
        let json = serde_json::to_value(&positive).expect("serialize");
        assert_eq!(json["state"], "positive");
        assert_eq!(json["value"], 9);
    }
}
