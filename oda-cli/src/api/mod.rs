//! Query-and-cache client for the Danish Parliament open data service (oda.ft.dk)
//!
//! Queries are built with [`QueryBuilder`], rendered into fully percent-encoded
//! OData request strings, fetched page by page with retries, and cached by
//! their logical identity. [`OdaClient`] ties these together.

pub mod cache;
pub mod client;
pub mod constants;
pub mod error;
pub mod models;
pub mod pagination;
pub mod query;
pub mod resilience;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use cache::{CacheConfig, CacheStats, Clock, ManualClock, QueryCache, SystemClock};
pub use client::{ClientConfig, FetchOptions, OdaClient};
pub use error::{OdaError, Result};
pub use models::{FetchResult, Freshness, Record};
pub use pagination::{Paginated, PaginationOptions, Paginator};
pub use query::{Filter, FilterValue, OrderBy, Page, Query, QueryBuilder, ResponseFormat};
pub use resilience::{ResilienceConfig, RetryConfig, RetryPolicy};
pub use transport::{HttpTransport, Transport, TransportOutcome};
