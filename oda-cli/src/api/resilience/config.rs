//! Resilience configuration with builder pattern
//!
//! Provides a unified configuration for retry policies, concurrency limiting
//! and timeouts with sane defaults for the public ODA endpoint.

use super::retry::RetryConfig;
use std::time::Duration;

/// Global resilience configuration for API requests
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub concurrency: ConcurrencyConfig,
    pub timeout: TimeoutConfig,
}

/// Concurrency limiting configuration
#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    /// Maximum concurrent HTTP requests to the API, across all fetches
    pub max_concurrent_requests: usize,
    /// Whether concurrency limiting is enabled
    pub enabled: bool,
}

/// Timeouts for a single request and for a whole multi-page fetch
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub request_timeout: Duration,
    /// Deadline across all pages and retries of one fetch
    pub fetch_deadline: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            timeout: TimeoutConfig::default(),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 8, // Public endpoint, be polite
            enabled: true,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            fetch_deadline: Duration::from_secs(300),
        }
    }
}

impl ResilienceConfig {
    /// Create a new builder for ResilienceConfig
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }
}

/// Builder for ResilienceConfig
#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    /// Configure retry behavior
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set max concurrent requests
    pub fn max_concurrent_requests(mut self, max: usize) -> Self {
        self.config.concurrency.max_concurrent_requests = max;
        self
    }

    /// Enable/disable concurrency limiting
    pub fn enable_concurrency_limiting(mut self, enabled: bool) -> Self {
        self.config.concurrency.enabled = enabled;
        self
    }

    /// Per-request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout.request_timeout = timeout;
        self
    }

    /// Deadline across all pages of one fetch
    pub fn fetch_deadline(mut self, deadline: Duration) -> Self {
        self.config.timeout.fetch_deadline = deadline;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
