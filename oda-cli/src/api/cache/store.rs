//! In-memory query result cache

use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::api::error::Result;
use crate::api::query::Query;

use super::clock::{Clock, SystemClock};
use super::entry::{CacheEntry, CachedPayload};

/// Thread-safe cache of assembled query results keyed by canonical query form
///
/// Expired entries are never returned: `get` evicts them on sight and
/// `purge_expired` sweeps the whole map.
#[derive(Debug)]
pub struct QueryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl QueryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Cache driven by the wall clock
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Key for a query capped at `max_records` (None = uncapped)
    pub fn key_for(query: &Query, max_records: Option<usize>) -> Result<String> {
        let base = query.cache_key()?;
        Ok(match max_records {
            Some(max) => format!("{}#max={}", base, max),
            None => base,
        })
    }

    /// Look up a still-valid payload
    pub fn get(&self, query: &Query, max_records: Option<usize>) -> Result<Option<CachedPayload>> {
        let key = Self::key_for(query, max_records)?;
        Ok(self.get_by_key(&key))
    }

    pub(crate) fn get_by_key(&self, key: &str) -> Option<CachedPayload> {
        let now = self.clock.now();
        let mut entries = self.lock();

        match entries.get(key) {
            Some(entry) if entry.is_valid(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit: {}", key);
                Some(entry.payload.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache entry expired: {}", key);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a payload, replacing any previous entry for the same key
    pub fn put(
        &self,
        query: &Query,
        max_records: Option<usize>,
        payload: CachedPayload,
        ttl: Duration,
    ) -> Result<()> {
        let key = Self::key_for(query, max_records)?;
        self.put_by_key(key, query, payload, ttl);
        Ok(())
    }

    pub(crate) fn put_by_key(&self, key: String, query: &Query, payload: CachedPayload, ttl: Duration) {
        let entry = CacheEntry::new(query.clone(), payload, self.clock.now(), ttl);
        debug!("Cache store: {} (ttl {:?})", key, ttl);
        self.lock().insert(key, entry);
    }

    /// Remove every entry whose descriptor matches the predicate; returns how many were removed
    pub fn invalidate<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Query) -> bool,
    {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !predicate(&entry.query));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Cache invalidated {} entries", removed);
        }
        removed
    }

    /// Remove every entry for one entity set
    pub fn invalidate_entity(&self, entity: &str) -> usize {
        self.invalidate(|query| query.entity() == entity)
    }

    /// Drop all expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid(now));
        let removed = before - entries.len();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Copy of every stored entry, ordered by key
    pub fn entries(&self) -> Vec<(String, CacheEntry)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub(crate) fn insert_entry(&self, key: String, entry: CacheEntry) {
        self.lock().insert(key, entry);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::system()
    }
}

/// Counters for cache behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
