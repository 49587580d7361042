//! Public entry point composing cache, paginator and transport

use chrono::NaiveDateTime;
use futures::future::try_join_all;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

use crate::api::cache::{CacheConfig, CachedPayload, QueryCache};
use crate::api::constants::DEFAULT_BASE_URL;
use crate::api::error::Result;
use crate::api::models::{FetchResult, Freshness, record_timestamp};
use crate::api::pagination::{PaginationOptions, Paginator};
use crate::api::query::{OrderBy, Query};
use crate::api::resilience::{ConcurrencyLimiter, ResilienceConfig, RetryPolicy, Sleeper};
use crate::api::transport::{HttpTransport, Transport};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub resilience: ResilienceConfig,
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            resilience: ResilienceConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Per-call options for [`OdaClient::fetch`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    /// Cap on the number of records (None = everything)
    pub max_records: Option<usize>,
    /// TTL override for this result; defaults to the entity's configured TTL
    pub ttl: Option<Duration>,
    /// Accept a truncated result when a later page fails fatally (never cached)
    pub allow_partial: bool,
    /// Skip the cache lookup (the fresh result is still stored)
    pub bypass_cache: bool,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_records(mut self, max: usize) -> Self {
        self.max_records = Some(max);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn allow_partial(mut self, allow: bool) -> Self {
        self.allow_partial = allow;
        self
    }

    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }
}

/// Query-and-cache client for the ODA service
///
/// The cache is injected so callers (and tests) decide its lifetime and clock.
/// Concurrent fetches of the same logical query are coalesced: one of them
/// goes upstream, the others wait and are then served from the cache.
#[derive(Debug)]
pub struct OdaClient {
    paginator: Paginator,
    cache: Arc<QueryCache>,
    config: ClientConfig,
    in_flight: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
    watermarks: Mutex<HashMap<String, NaiveDateTime>>,
}

impl OdaClient {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<QueryCache>, config: ClientConfig) -> Self {
        let resilience = &config.resilience;
        let paginator = Paginator::new(
            transport,
            RetryPolicy::new(resilience.retry.clone()),
            ConcurrencyLimiter::new(resilience.concurrency.clone()),
            resilience.timeout.clone(),
        );

        Self {
            paginator,
            cache,
            config,
            in_flight: Mutex::new(HashMap::new()),
            watermarks: Mutex::new(HashMap::new()),
        }
    }

    /// Client over HTTP with a fresh wall-clock cache
    pub fn http(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.base_url.clone())?;
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(QueryCache::system()),
            config,
        ))
    }

    /// Replace the sleeper used between retries
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.paginator = self.paginator.with_sleeper(sleeper);
        self
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch all records matching `query`, from cache when fresh
    pub async fn fetch(&self, query: &Query, options: &FetchOptions) -> Result<FetchResult> {
        let key = QueryCache::key_for(query, options.max_records)?;
        let use_cache = self.config.cache.enabled;

        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        if use_cache && !options.bypass_cache {
            if let Some(cached) = self.cache.get_by_key(&key) {
                return Ok(FetchResult {
                    records: cached.records,
                    total_count: cached.total_count,
                    freshness: Freshness::CacheHit,
                    partial: false,
                    requests: 0,
                });
            }
        }

        let paginated = self
            .paginator
            .paginate(
                query,
                &PaginationOptions {
                    max_records: options.max_records,
                    allow_partial: options.allow_partial,
                },
            )
            .await?;

        if use_cache && !paginated.partial {
            let ttl = options
                .ttl
                .unwrap_or_else(|| self.config.cache.ttl_for(query.entity()));
            if !ttl.is_zero() {
                self.cache.put_by_key(
                    key,
                    query,
                    CachedPayload {
                        records: paginated.records.clone(),
                        total_count: paginated.total_count,
                    },
                    ttl,
                );
            }
        }

        info!(
            "Fetched {} {} record(s) in {} request(s)",
            paginated.records.len(),
            query.entity(),
            paginated.requests
        );

        Ok(FetchResult {
            records: paginated.records,
            total_count: paginated.total_count,
            freshness: Freshness::Fetched,
            partial: paginated.partial,
            requests: paginated.requests,
        })
    }

    /// Fetch several queries concurrently; fails on the first error
    pub async fn fetch_many(&self, queries: &[Query], options: &FetchOptions) -> Result<Vec<FetchResult>> {
        try_join_all(queries.iter().map(|query| self.fetch(query, options))).await
    }

    /// Drop cached results for every entity matching the predicate
    pub fn invalidate<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        self.cache.invalidate(|query| predicate(query.entity()))
    }

    /// Most recent value of a timestamp field on an entity set (never cached)
    pub async fn latest_modification(&self, entity: &str, field: &str) -> Result<Option<NaiveDateTime>> {
        let query = Query::builder(entity)
            .select([field])
            .orderby(OrderBy::desc(field))
            .page_size(1)
            .include_count(false)
            .build()?;

        let paginated = self
            .paginator
            .paginate(
                &query,
                &PaginationOptions {
                    max_records: Some(1),
                    allow_partial: false,
                },
            )
            .await?;

        Ok(paginated
            .records
            .first()
            .and_then(|record| record_timestamp(record, field)))
    }

    /// Poll the entity's latest modification and invalidate its cache entries if it moved
    ///
    /// The first observation only records the watermark and reports no change.
    pub async fn refresh_if_changed(&self, entity: &str, field: &str) -> Result<bool> {
        let latest = self.latest_modification(entity, field).await?;

        let previous = {
            let mut watermarks = lock(&self.watermarks);
            match latest {
                Some(ts) => watermarks.insert(entity.to_string(), ts),
                None => watermarks.get(entity).copied(),
            }
        };

        let changed = matches!((previous, latest), (Some(prev), Some(now)) if now != prev);
        if changed {
            let removed = self.cache.invalidate_entity(entity);
            info!(
                "{} changed since last check; invalidated {} cached result(s)",
                entity, removed
            );
        } else {
            debug!("{} unchanged (latest {:?})", entity, latest);
        }
        Ok(changed)
    }

    fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut in_flight = lock(&self.in_flight);
        if let Some(existing) = in_flight.get(key).and_then(Weak::upgrade) {
            debug!("Coalescing with in-flight fetch: {}", key);
            return existing;
        }

        in_flight.retain(|_, weak| weak.strong_count() > 0);
        let fresh = Arc::new(AsyncMutex::new(()));
        in_flight.insert(key.to_string(), Arc::downgrade(&fresh));
        fresh
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
