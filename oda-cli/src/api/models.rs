//! Result models returned by the client

use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};

/// One upstream record; its schema depends on the entity set
pub type Record = Map<String, Value>;

/// Where the records of a [`FetchResult`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    CacheHit,
    Fetched,
}

/// Outcome of a completed fetch
#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    /// Records in upstream order
    pub records: Vec<Record>,
    /// Total count reported by the server, if requested and present
    pub total_count: Option<u64>,
    pub freshness: Freshness,
    /// Only set when the caller allowed partial results and a page failed
    pub partial: bool,
    /// Number of page requests issued to produce this result (0 on cache hits)
    pub requests: usize,
}

impl FetchResult {
    pub fn is_cache_hit(&self) -> bool {
        self.freshness == Freshness::CacheHit
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Greatest value of a timestamp field across all records
    pub fn latest_timestamp(&self, field: &str) -> Option<NaiveDateTime> {
        self.records
            .iter()
            .filter_map(|r| record_timestamp(r, field))
            .max()
    }
}

/// Read a timestamp field from a record
///
/// ODA sends local times without offset (`2025-01-02T10:00:00.123`); values
/// with an offset are converted to their naive UTC form.
pub fn record_timestamp(record: &Record, field: &str) -> Option<NaiveDateTime> {
    let raw = record.get(field)?.as_str()?;
    parse_timestamp(raw)
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}
