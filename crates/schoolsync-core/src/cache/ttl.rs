use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::clock::Clock;

/// Default lifetime for semi-static reference data (religions and similar lists).
pub const DEFAULT_REFERENCE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, stored_at: DateTime<Utc>) -> Self {
        Self { value, stored_at }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.stored_at
    }

    /// An entry is valid while `now - stored_at < ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// In-memory cache whose entries expire `ttl` after they were stored.
///
/// Eviction is lazy: an expired entry stays in the map until it is
/// overwritten or removed, but `get` treats it as absent.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the cached value if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entry(key).map(|entry| entry.value)
    }

    /// Returns the whole entry (value and timestamp) if present and not expired.
    pub fn entry(&self, key: &K) -> Option<CacheEntry<V>> {
        let now = self.clock.now();
        let entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_fresh(now, self.ttl) => Some(entry.clone()),
            Some(_) => {
                trace!("Cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Store `value` stamped with the current time, replacing any previous entry.
    pub fn set(&self, key: K, value: V) {
        let entry = CacheEntry::new(value, self.clock.now());
        self.entries().insert(key, entry);
    }

    pub fn invalidate(&self, key: &K) {
        self.entries().remove(key);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of physically stored entries, expired ones included.
    pub fn stored_len(&self) -> usize {
        self.entries().len()
    }
}

// ============================================================================
// Tests
// ============================================================================
