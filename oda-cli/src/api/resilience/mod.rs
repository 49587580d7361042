//! Production resilience and hardening features
//!
//! Provides retry policies, concurrency limiting and timeouts for requests
//! against the ODA endpoint.

pub mod concurrency;
pub mod config;
pub mod retry;

pub use concurrency::ConcurrencyLimiter;
pub use config::{ConcurrencyConfig, ResilienceConfig, ResilienceConfigBuilder, TimeoutConfig};
pub use retry::{RetryConfig, RetryPolicy, RetryState, Sleeper, TokioSleeper};
