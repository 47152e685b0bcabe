//! Per-item metadata stores.
//!
//! A content item carries a flat set of named fields. Values are kept as
//! [`serde_json::Value`] so strings, numbers and nested structures written by
//! the host round-trip untouched; most fields are strings holding some
//! encoding that [`codec`](crate::codec) detects.
//!
//! [`JsonDirStore`] keeps one `<id>.json` object per item in a directory;
//! [`MemoryStore`] is the same contract in a `HashMap`.

use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// All fields of one content item, in stored order.
pub type Bundle = serde_json::Map<String, Value>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt metadata file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid content id {0:?}: use letters, digits, '-' and '_'")]
    InvalidId(String),
}

/// Storage of per-item fields.
pub trait MetaStore {
    /// Every field of `id`. An item with no fields yields an empty bundle.
    fn get_all(&self, id: &str) -> Result<Bundle, StoreError>;
    /// Create or overwrite one field.
    fn set(&mut self, id: &str, field: &str, value: Value) -> Result<(), StoreError>;
    /// Remove one field. Removing an absent field is not an error.
    fn delete(&mut self, id: &str, field: &str) -> Result<(), StoreError>;
}

/// Reject ids that could not safely name a file.
pub fn check_id(id: &str) -> Result<(), StoreError> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

/// One pretty-printed JSON object per item: `<dir>/<id>.json`.
///
/// Every mutation rewrites the item's file through a temporary file in the
/// same directory, so a crash mid-write leaves the previous version intact.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        check_id(id)?;
        Ok(self.dir.join(format!("{}.json", id)))
    }

    fn load(&self, path: &Path) -> Result<Bundle, StoreError> {
        if !path.exists() {
            return Ok(Bundle::new());
        }
        let content = fs::read_to_string(path)?;
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                source: serde::de::Error::custom("top level is not an object"),
            }),
            Err(source) => Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn save(&self, path: &Path, bundle: &Bundle) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, bundle)?;
        tmp.write_all(b"\n")?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        debug!("Wrote {} fields to {}", bundle.len(), path.display());
        Ok(())
    }
}

impl MetaStore for JsonDirStore {
    fn get_all(&self, id: &str) -> Result<Bundle, StoreError> {
        let path = self.path_for(id)?;
        self.load(&path)
    }

    fn set(&mut self, id: &str, field: &str, value: Value) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        let mut bundle = self.load(&path)?;
        bundle.insert(field.to_string(), value);
        self.save(&path, &bundle)
    }

    fn delete(&mut self, id: &str, field: &str) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        let mut bundle = self.load(&path)?;
        if bundle.remove(field).is_none() {
            return Ok(());
        }
        self.save(&path, &bundle)
    }
}

/// In-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    items: HashMap<String, Bundle>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an item with a full bundle, replacing whatever was there.
    pub fn with_item(mut self, id: &str, bundle: Bundle) -> Self {
        self.items.insert(id.to_string(), bundle);
        self
    }

    /// Single field lookup.
    pub fn field(&self, id: &str, field: &str) -> Option<&Value> {
        self.items.get(id)?.get(field)
    }
}

impl MetaStore for MemoryStore {
    fn get_all(&self, id: &str) -> Result<Bundle, StoreError> {
        check_id(id)?;
        Ok(self.items.get(id).cloned().unwrap_or_default())
    }

    fn set(&mut self, id: &str, field: &str, value: Value) -> Result<(), StoreError> {
        check_id(id)?;
        self.items
            .entry(id.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, id: &str, field: &str) -> Result<(), StoreError> {
        check_id(id)?;
        if let Some(bundle) = self.items.get_mut(id) {
            bundle.remove(field);
        }
        Ok(())
    }
}
