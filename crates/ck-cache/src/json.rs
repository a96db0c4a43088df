//! JSON-file-backed cache implementation.
//!
//! [`JsonCache`] stores each bucket as a single JSON object file:
//!
//! ```text
//! {root}/
//! +-- changes.json       # bucket "changes"
//! +-- equations.json     # bucket "equations"
//! ```
//!
//! The whole file is loaded into memory when a bucket is first opened.
//! Writes go to the in-memory map and are flushed back to disk at most
//! once per throttle interval, so many rapid compilations collapse into
//! one disk write. An explicit [`flush`](crate::CacheBucket::flush) at the
//! end of a run writes whatever is still pending.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::{Cache, CacheBucket};

const DEFAULT_THROTTLE: Duration = Duration::from_secs(1);

/// JSON-file-backed [`Cache`] rooted at a directory on disk.
pub struct JsonCache {
    root: PathBuf,
    throttle: Duration,
    buckets: Mutex<HashMap<String, Arc<JsonBucket>>>,
}

impl JsonCache {
    /// Create a cache rooted at `root` with the default flush throttle.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self::with_throttle(root, DEFAULT_THROTTLE)
    }

    /// Create a cache with an explicit minimum interval between disk writes.
    #[must_use]
    pub fn with_throttle(root: PathBuf, throttle: Duration) -> Self {
        Self {
            root,
            throttle,
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

impl Cache for JsonCache {
    fn bucket(&self, name: &str) -> Arc<dyn CacheBucket> {
        let mut buckets = self.buckets.lock().expect("bucket registry poisoned");
        let bucket = buckets.entry(name.to_owned()).or_insert_with(|| {
            Arc::new(JsonBucket::open(
                self.root.join(format!("{name}.json")),
                self.throttle,
            ))
        });
        Arc::clone(bucket) as Arc<dyn CacheBucket>
    }
}

struct BucketState {
    entries: HashMap<String, String>,
    dirty: bool,
    last_flush: Instant,
}

/// A single bucket backed by one JSON object file.
struct JsonBucket {
    path: PathBuf,
    throttle: Duration,
    state: Mutex<BucketState>,
}

impl JsonBucket {
    fn open(path: PathBuf, throttle: Duration) -> Self {
        let entries = load_entries(&path);
        Self {
            path,
            throttle,
            state: Mutex::new(BucketState {
                entries,
                dirty: false,
                last_flush: Instant::now(),
            }),
        }
    }

    fn write(&self, state: &mut BucketState) {
        if let Some(parent) = self.path.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            tracing::warn!(path = %self.path.display(), "failed to create cache directory: {e}");
            return;
        }
        match serde_json::to_string(&state.entries) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.path, json) {
                    tracing::warn!(path = %self.path.display(), "failed to write cache file: {e}");
                } else {
                    state.dirty = false;
                }
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "failed to serialize cache: {e}");
            }
        }
        state.last_flush = Instant::now();
    }
}

impl CacheBucket for JsonBucket {
    fn get(&self, key: &str) -> Option<String> {
        let state = self.state.lock().expect("cache state poisoned");
        state.entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut state = self.state.lock().expect("cache state poisoned");
        state.entries.insert(key.to_owned(), value.to_owned());
        state.dirty = true;
        // Throttled write-back: skip if we flushed recently.
        if state.last_flush.elapsed() >= self.throttle {
            self.write(&mut state);
        }
    }

    fn flush(&self) {
        let mut state = self.state.lock().expect("cache state poisoned");
        if state.dirty {
            self.write(&mut state);
        }
    }
}

fn load_entries(path: &Path) -> HashMap<String, String> {
    let Ok(json) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    match serde_json::from_str(&json) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %path.display(), "discarding unreadable cache file: {e}");
            HashMap::new()
        }
    }
}
