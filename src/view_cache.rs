use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::*;

pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

pub trait Clock {
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

struct CacheEntry<V> {
    stored_at: Duration,
    value: V,
}

/// Memo table keyed by query identity, not by data content. An entry is
/// fresh while `now - stored_at < ttl`.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + std::fmt::Debug,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry<V>, now: Duration) -> bool {
        now.saturating_sub(entry.stored_at) < self.ttl
    }

    pub fn get(&self, key: &K, now: Duration) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&mut self, key: K, value: V, now: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                stored_at: now,
                value,
            },
        );
    }

    /// Returns the fresh value for `key`, or runs `load` and stores its
    /// result. A failed load evicts any stale entry and returns the error.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: K,
        now: Duration,
        load: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(&key, now) {
            debug!("cache hit for {:?}", key);
            return Ok(value);
        }

        match load() {
            Ok(value) => {
                self.insert(key, value.clone(), now);
                Ok(value)
            }
            Err(e) => {
                if self.entries.remove(&key).is_some() {
                    warn!("evicted stale entry for {:?} after failed reload", key);
                }
                Err(e)
            }
        }
    }

    pub fn invalidate(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn purge_expired(&mut self, now: Duration) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.stored_at) < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
