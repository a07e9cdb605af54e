//! Session cache for per-call conversation state.
//!
//! Redis in production, moka in memory for local runs and tests. Both sit
//! behind the `CacheBackend` trait so the rest of the service only sees
//! `CacheStore`.

pub mod keys;
pub mod redis_backend;
pub mod store;

pub use redis_backend::RedisCacheBackend;
pub use store::{
    CacheBackend, CacheConfig, CacheError, CacheMetrics, CacheStore, MemoryCacheBackend, Result,
    glob_match,
};
