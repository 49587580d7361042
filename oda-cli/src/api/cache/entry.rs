//! Cache entries with TTL

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::api::models::Record;
use crate::api::query::Query;

/// The cached result of one logical query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPayload {
    pub records: Vec<Record>,
    pub total_count: Option<u64>,
}

/// A stored payload plus the metadata needed to decide whether it is still valid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: CachedPayload,
    /// Descriptor the payload was stored for, so invalidation can match on it
    pub query: Query,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(query: Query, payload: CachedPayload, created_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            payload,
            query,
            created_at,
            ttl,
        }
    }

    /// Valid iff `now - created_at < ttl`
    ///
    /// An entry whose age equals its TTL is already expired; a clock that went
    /// backwards counts as age zero.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        let age = (now - self.created_at).to_std().unwrap_or(Duration::ZERO);
        age < self.ttl
    }

    /// Time left before expiry (zero once expired)
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> Duration {
        let age = (now - self.created_at).to_std().unwrap_or(Duration::ZERO);
        self.ttl.saturating_sub(age)
    }
}
