//! Shared test utilities for the page-transfer test suite.
//!
//! Provides an asset store rooted in a temp directory, recording fakes for
//! the fetch, store and invalidation seams, and filesystem counters.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let store = asset_store(tmp.path());
//! let fetcher = MockFetcher::serving(b"PNG");
//! let types = MimeTypes::stock();
//! let mut m = Materializer::new(&store, &fetcher, &types, UPLOADS);
//!
//! m.materialize(&asset);
//! assert_eq!(fetcher.requests().len(), 1);
//! ```

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde_json::Value;
use url::Url;

use crate::assets::AssetStore;
use crate::fetch::{FetchError, Fetcher};
use crate::invalidate::{CacheInvalidator, InvalidateError};
use crate::store::{Bundle, MemoryStore, MetaStore, StoreError};

/// Source upload prefix used throughout the tests.
pub const UPLOADS: &str = "/wp-content/uploads/";

/// Public URL of the destination asset store in tests.
pub const NEW_BASE_URL: &str = "https://new.example.com/wp-content/uploads";

/// Asset store at `dir`, served from [`NEW_BASE_URL`].
pub fn asset_store(dir: &Path) -> AssetStore {
    AssetStore::new(dir, NEW_BASE_URL).unwrap()
}

/// Number of regular files below `dir`, recursively.
pub fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .map(|e| e.unwrap().path())
        .map(|p| if p.is_dir() { count_files(&p) } else { 1 })
        .sum()
}

// =========================================================================
// Fetch fake
// =========================================================================

/// Fetcher that records every request and serves a fixed body, or fails.
pub struct MockFetcher {
    body: Option<Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn serving(body: &[u8]) -> Self {
        Self {
            body: Some(body.to_vec()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request fails with a 503 after writing a partial body, so the
    /// caller has something to clean up.
    pub fn failing() -> Self {
        Self {
            body: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &Url, sink: &mut dyn Write) -> Result<u64, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        match &self.body {
            Some(body) => {
                sink.write_all(body)?;
                Ok(body.len() as u64)
            }
            None => {
                sink.write_all(b"partial")?;
                Err(FetchError::Status {
                    status: 503,
                    url: url.to_string(),
                })
            }
        }
    }
}

// =========================================================================
// Store fake
// =========================================================================

/// [`MemoryStore`] that refuses to write one field name.
pub struct FailingStore {
    pub inner: MemoryStore,
    reject: String,
}

impl FailingStore {
    pub fn rejecting(field: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            reject: field.to_string(),
        }
    }
}

impl MetaStore for FailingStore {
    fn get_all(&self, id: &str) -> Result<Bundle, StoreError> {
        self.inner.get_all(id)
    }

    fn set(&mut self, id: &str, field: &str, value: Value) -> Result<(), StoreError> {
        if field == self.reject {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.inner.set(id, field, value)
    }

    fn delete(&mut self, id: &str, field: &str) -> Result<(), StoreError> {
        self.inner.delete(id, field)
    }
}

// =========================================================================
// Invalidation fake
// =========================================================================

/// Records the ids it is asked to invalidate.
#[derive(Default)]
pub struct RecordingInvalidator {
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl RecordingInvalidator {
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CacheInvalidator for RecordingInvalidator {
    fn invalidate(&self, id: &str) -> Result<(), InvalidateError> {
        self.calls.lock().unwrap().push(id.to_string());
        if self.fail {
            return Err(InvalidateError::Spawn {
                program: "regenerate-css".into(),
                source: std::io::Error::other("not installed"),
            });
        }
        Ok(())
    }
}
