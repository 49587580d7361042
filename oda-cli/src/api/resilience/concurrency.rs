//! Cap on concurrent upstream requests
//!
//! One limiter is shared by every page request issued through a client, so
//! `fetch_many` and coalesced callers together stay under the configured cap.

use super::config::ConcurrencyConfig;
use crate::api::error::{OdaError, Result};
use log::debug;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Semaphore-backed request limiter; a disabled limiter never waits
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Option<Arc<Semaphore>>,
    max: usize,
}

impl ConcurrencyLimiter {
    pub fn new(config: ConcurrencyConfig) -> Self {
        let max = config.max_concurrent_requests.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: config.enabled.then(|| Arc::new(Semaphore::new(max))),
            max,
        }
    }

    /// Wait for a request slot; the slot is released when the permit drops
    pub async fn acquire(&self) -> Result<Option<OwnedSemaphorePermit>> {
        let Some(semaphore) = &self.semaphore else {
            return Ok(None);
        };

        if semaphore.available_permits() == 0 {
            debug!("All {} request slots busy, waiting", self.max);
        }
        semaphore
            .clone()
            .acquire_owned()
            .await
            .map(Some)
            .map_err(|_| OdaError::fetch_failed("request limiter closed", 0))
    }
}
