//! Multi-page result assembly
//!
//! Pages are requested in increasing `$skip` order. The sequence ends on the
//! first short page, when the caller's record cap is reached, or when the
//! assembled offset equals the server's count hint. A page holding more
//! records than requested is treated as a fatal protocol error.

use log::{debug, warn};
use std::sync::Arc;

use crate::api::error::{OdaError, Result};
use crate::api::models::Record;
use crate::api::query::{Page, Query};
use crate::api::resilience::{
    ConcurrencyLimiter, RetryPolicy, RetryState, Sleeper, TimeoutConfig, TokioSleeper,
};
use crate::api::transport::{Transport, TransportOutcome};

/// Per-fetch pagination options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationOptions {
    /// Stop after this many records (None = all)
    pub max_records: Option<usize>,
    /// Return what was assembled when a later page fails fatally
    pub allow_partial: bool,
}

/// Records assembled across pages
#[derive(Debug, Clone, Default)]
pub struct Paginated {
    pub records: Vec<Record>,
    pub total_count: Option<u64>,
    /// Page requests issued (retries of the same page count once)
    pub requests: usize,
    pub partial: bool,
}

/// Drives a [`Transport`] page by page
#[derive(Debug, Clone)]
pub struct Paginator {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    limiter: ConcurrencyLimiter,
    timeouts: TimeoutConfig,
}

impl Paginator {
    pub fn new(
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        limiter: ConcurrencyLimiter,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            transport,
            retry,
            sleeper: Arc::new(TokioSleeper),
            limiter,
            timeouts,
        }
    }

    /// Replace the sleeper used between retries
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Assemble the full result of `query`, bounded by the fetch deadline
    pub async fn paginate(&self, query: &Query, options: &PaginationOptions) -> Result<Paginated> {
        if options.max_records == Some(0) {
            return Ok(Paginated::default());
        }

        let deadline = self.timeouts.fetch_deadline;
        match tokio::time::timeout(deadline, self.collect(query, options)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Fetch of {} exceeded deadline {:?}", query.entity(), deadline);
                Err(OdaError::Timeout { deadline })
            }
        }
    }

    async fn collect(&self, query: &Query, options: &PaginationOptions) -> Result<Paginated> {
        let page_size = query.page_size() as usize;
        let mut assembled = Paginated::default();
        let mut skip = query.skip();

        loop {
            let top = match options.max_records {
                Some(max) => page_size.min(max - assembled.records.len()),
                None => page_size,
            };
            let request = query.page(top as u32, skip)?.render()?;

            assembled.requests += 1;
            let page = match self.fetch_page(&request).await {
                Ok(page) if page.len() > top => Err(OdaError::fetch_failed(
                    format!(
                        "inconsistent page at skip {}: received {} records, requested at most {}",
                        skip,
                        page.len(),
                        top
                    ),
                    1,
                )),
                other => other,
            };
            let page = match page {
                Ok(page) => page,
                Err(err) => return Self::fail(err, assembled, options),
            };

            let received = page.len();
            if page.total_count.is_some() {
                assembled.total_count = page.total_count;
            }
            assembled.records.extend(page.records);
            skip += received as u64;
            debug!(
                "Page {} of {}: {} records (total so far {})",
                assembled.requests,
                query.entity(),
                received,
                assembled.records.len()
            );

            if received < top {
                break;
            }
            if options.max_records == Some(assembled.records.len()) {
                break;
            }
            if let Some(total) = assembled.total_count {
                if skip == total {
                    break;
                }
                if skip > total {
                    warn!(
                        "{} returned more records ({}) than its count hint ({}); following page contents",
                        query.entity(),
                        skip,
                        total
                    );
                }
            }
        }

        Ok(assembled)
    }

    /// One page, with retries for retryable failures
    async fn fetch_page(&self, request: &str) -> Result<Page> {
        let mut state = RetryState::new();

        loop {
            state.begin_attempt();
            let outcome = {
                let _permit = self.limiter.acquire().await?;
                self.transport
                    .execute(request, self.timeouts.request_timeout)
                    .await
            };

            match outcome {
                TransportOutcome::Success(page) => return Ok(page),
                TransportOutcome::FatalFailure(reason) => {
                    warn!("Request failed: {} ({})", reason, request);
                    return Err(OdaError::fetch_failed(reason, state.attempts()));
                }
                TransportOutcome::RetryableFailure(reason) => match self.retry.next_delay(&state) {
                    Some(delay) => {
                        warn!(
                            "Retryable failure (attempt {}/{}): {}; retrying in {:?}",
                            state.attempts(),
                            self.retry.max_attempts(),
                            reason,
                            delay
                        );
                        self.sleeper.sleep(delay).await;
                    }
                    None => {
                        return Err(OdaError::fetch_failed(
                            format!("{} (retries exhausted)", reason),
                            state.attempts(),
                        ));
                    }
                },
            }
        }
    }

    fn fail(err: OdaError, mut assembled: Paginated, options: &PaginationOptions) -> Result<Paginated> {
        if assembled.records.is_empty() {
            return Err(err);
        }
        if options.allow_partial {
            warn!(
                "Returning {} partial records after failure: {}",
                assembled.records.len(),
                err
            );
            assembled.partial = true;
            return Ok(assembled);
        }
        Err(OdaError::PartialResultsDiscarded {
            discarded: assembled.records.len(),
            source: Box::new(err),
        })
    }
}
