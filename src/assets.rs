//! The destination asset store and the relative paths inside it.
//!
//! An asset store is a directory on disk plus the public URL it is served
//! from: `<base_dir>/2023/01/a.png` is reachable at `<base_url>/2023/01/a.png`.
//! [`RelativePath`] is the part in between, derived from a source URL's path.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum PathError {
    #[error("path segment {0:?} is not valid UTF-8 once decoded")]
    InvalidEncoding(String),
    #[error("path segment {0:?} is not a safe file name")]
    UnsafeSegment(String),
    #[error("URL has no file path")]
    Empty,
}

#[derive(Error, Debug, PartialEq)]
pub enum AssetStoreError {
    #[error("asset base URL {0:?} is not an absolute http(s) URL")]
    InvalidBaseUrl(String),
}

/// Decoded path segments below the asset root, always at least one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelativePath {
    segments: Vec<String>,
}

impl RelativePath {
    /// Derive a relative path from a URL path, stripping `source_prefix`
    /// (typically `/wp-content/uploads/`) when present.
    ///
    /// Segments are percent-decoded. Empty segments are dropped; `.` and `..`
    /// or segments that decode to something containing a path separator are
    /// rejected so a hostile URL can never escape the asset root.
    pub fn from_url_path(path: &str, source_prefix: &str) -> Result<Self, PathError> {
        let relative = match path.strip_prefix(source_prefix) {
            Some(rest) if !source_prefix.is_empty() => rest,
            _ => path,
        };
        let mut segments = Vec::new();
        for raw in relative.split('/').filter(|s| !s.is_empty()) {
            let decoded = percent_encoding::percent_decode_str(raw)
                .decode_utf8()
                .map_err(|_| PathError::InvalidEncoding(raw.to_string()))?;
            if decoded == "."
                || decoded == ".."
                || decoded.contains(['/', '\\', '\0'])
            {
                return Err(PathError::UnsafeSegment(raw.to_string()));
            }
            segments.push(decoded.into_owned());
        }
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self { segments })
    }

    /// Insert `_<fingerprint>` between the file stem and its extension.
    ///
    /// Returns `None` when the file name has no separable stem and extension
    /// (`README`, `.htaccess`), in which case the path is used unmodified.
    pub fn with_fingerprint(&self, fingerprint: &str) -> Option<Self> {
        let (file, dirs) = self.segments.split_last()?;
        let (stem, ext) = file.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        let mut segments = dirs.to_vec();
        segments.push(format!("{}_{}.{}", stem, fingerprint, ext));
        Some(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// Where materialized assets live and how they are addressed publicly.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetStore {
    base_dir: PathBuf,
    base_url: Url,
}

impl AssetStore {
    pub fn new(base_dir: impl Into<PathBuf>, base_url: &str) -> Result<Self, AssetStoreError> {
        let invalid = || AssetStoreError::InvalidBaseUrl(base_url.to_string());
        let url = Url::parse(base_url).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(invalid());
        }
        Ok(Self {
            base_dir: base_dir.into(),
            base_url: url,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Filesystem location of a relative path.
    pub fn local_path(&self, relative: &RelativePath) -> PathBuf {
        let mut path = self.base_dir.clone();
        path.extend(relative.segments());
        path
    }

    /// Public URL of a relative path. Segments are percent-encoded again, so
    /// `my photo.png` on disk is served as `my%20photo.png`.
    pub fn public_url(&self, relative: &RelativePath) -> String {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(relative.segments());
        }
        url.to_string()
    }
}
