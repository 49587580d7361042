//! Query result caching
//!
//! Results are cached per logical query (rendered descriptor without `$top`)
//! with a TTL chosen per entity set by [`CacheConfig`]. A cache can be saved
//! to and reloaded from a JSON file so results outlive one process.

pub mod clock;
pub mod config;
pub mod entry;
pub mod persist;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use entry::{CacheEntry, CachedPayload};
pub use store::{CacheStats, QueryCache};
