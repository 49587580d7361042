//! Retry policy with exponential backoff
//!
//! Retrying is an explicit state machine: a [`RetryState`] counts attempts and
//! [`RetryPolicy::next_delay`] decides whether another attempt is allowed and
//! how long to wait first. Waiting goes through a [`Sleeper`] so tests can run
//! without real delays.

use async_trait::async_trait;
use log::debug;
use rand::Rng;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per page, including the first one (1 = no retries)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Randomise each delay within `[delay / 2, delay]`
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Attempt counter for one retried unit of work (one page)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an attempt is being made
    pub fn begin_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Decides whether and when to retry
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted
    pub fn next_delay(&self, state: &RetryState) -> Option<Duration> {
        if state.attempts() >= self.max_attempts() {
            return None;
        }
        Some(self.delay_for(state.attempts()))
    }

    /// Backoff delay after the `failed_attempts`-th failure (1-based)
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1) as i32;
        let factor = self.config.backoff_multiplier.max(1.0).powi(exponent);
        let raw = self.config.base_delay.as_secs_f64() * factor;
        let capped = raw.min(self.config.max_delay.as_secs_f64());
        let delay = Duration::from_secs_f64(capped.max(0.0));

        if self.config.jitter && !delay.is_zero() {
            let jittered = rand::rng().random_range(delay / 2..=delay);
            debug!("Retry backoff {:?} (jittered from {:?})", jittered, delay);
            jittered
        } else {
            delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Abstraction over waiting between retries
#[async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
