//! Cache abstraction layer for coursekit.
//!
//! The compiler keeps two small persistent key-value stores: the change
//! cache (content hashes of already-compiled documents) and the equation
//! cache (rendered markup per equation source). Both are decoupled from
//! their storage through two traits:
//!
//! - [`Cache`]: Factory for named cache buckets
//! - [`CacheBucket`]: String key-value store with explicit flushing
//!
//! # Implementations
//!
//! - [`NullCache`] / [`NullCacheBucket`]: No-op implementations (always miss)
//! - [`JsonCache`]: One JSON object file per bucket, with throttled flushing
//!
//! # Example
//!
//! ```
//! use ck_cache::{Cache, NullCache};
//!
//! let cache = NullCache;
//! let bucket = cache.bucket("changes");
//! bucket.set("circles-en", "d41d8cd9");
//! assert_eq!(bucket.get("circles-en"), None); // NullCache always misses
//! ```

mod json;
pub use json::JsonCache;

use std::sync::Arc;

/// A named partition within a [`Cache`].
///
/// Each bucket stores string key-value pairs. Writes may be buffered in
/// memory; [`flush`](Self::flush) forces them to durable storage. Buckets
/// are shared across threads, so all methods take `&self`.
pub trait CacheBucket: Send + Sync {
    /// Retrieve a cached value, or `None` on miss.
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value, overwriting any existing entry for the same key.
    ///
    /// Implementations may defer the actual disk write; storage failures
    /// are logged, never propagated.
    fn set(&self, key: &str, value: &str);

    /// Write any buffered entries to durable storage.
    fn flush(&self);
}

/// Factory for named cache [`CacheBucket`]s.
///
/// Buckets with different names are logically isolated from each other.
/// Calling [`bucket`](Self::bucket) twice with the same name returns
/// handles sharing the same underlying storage.
pub trait Cache: Send + Sync {
    /// Open or create a named bucket.
    fn bucket(&self, name: &str) -> Arc<dyn CacheBucket>;
}

/// No-op [`CacheBucket`] that never stores or retrieves data.
pub struct NullCacheBucket;

impl CacheBucket for NullCacheBucket {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str) {}

    fn flush(&self) {}
}

/// No-op [`Cache`] that always returns [`NullCacheBucket`]s.
///
/// Use when caching is disabled, e.g. in tests.
pub struct NullCache;

impl Cache for NullCache {
    fn bucket(&self, _name: &str) -> Arc<dyn CacheBucket> {
        Arc::new(NullCacheBucket)
    }
}
