//! Export and import of a content item's metadata bundle.
//!
//! # Export
//!
//! [`export`] reads every field of an item (optionally restricted to a set of
//! name prefixes) and [`write_bundle`] stores it as one JSON object.
//!
//! # Import
//!
//! [`read_bundle`] validates the artifact before anything is written: it must
//! be an existing `.json` file holding a single JSON object. [`import`] then
//! processes fields in bundle order:
//!
//! 1. The layout field holds the page layout as JSON text. When it is a
//!    non-empty string it is parsed, rewritten and serialized again; if it
//!    does not parse it is committed untouched.
//! 2. Every other field goes through [`codec::decode`], the rewriter, and
//!    [`codec::encode`] with the encoding it arrived in.
//! 3. A field in which nothing was rewritten is committed with its raw
//!    value, byte for byte.
//! 4. The stylesheet cache field is never imported.
//!
//! Committing deletes the stylesheet cache, then writes each field on its
//! own: a failing write is logged and counted, and the rest still go through.
//! Finally the cache invalidator runs; its failure is logged and ignored.
//!
//! Asset materialization happens during processing, so by the time anything
//! is committed every referenced asset has been fetched or given up on.

use crate::classify::{Classification, classify};
use crate::codec::{self, Encoding};
use crate::config::ImportConfig;
use crate::invalidate::CacheInvalidator;
use crate::materialize::{AssetEvent, MaterializeStats, Materializer};
use crate::mime::MimeTypes;
use crate::rewrite::rewrite;
use crate::store::{Bundle, MetaStore, StoreError, check_id};
use crate::tree::Tree;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Missing content id")]
    MissingId,
    #[error("Import file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Invalid file type. Please upload a JSON file. ({})", .0.display())]
    InvalidFileType(PathBuf),
    #[error("Invalid JSON file: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Invalid JSON file: top level must be an object of fields")]
    NotAnObject,
    #[error("No data found to export for {0}")]
    NothingToExport(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

fn check_content_id(id: &str) -> Result<(), TransferError> {
    if id.trim().is_empty() {
        return Err(TransferError::MissingId);
    }
    check_id(id)?;
    Ok(())
}

// ============================================================================
// Export
// ============================================================================

/// Collect the fields of `id` whose names start with one of `prefixes`, or
/// every field when `prefixes` is empty.
pub fn export(
    store: &dyn MetaStore,
    id: &str,
    prefixes: &[String],
) -> Result<Bundle, TransferError> {
    check_content_id(id)?;
    let bundle: Bundle = store
        .get_all(id)?
        .into_iter()
        .filter(|(name, _)| prefixes.is_empty() || prefixes.iter().any(|p| name.starts_with(p)))
        .collect();
    if bundle.is_empty() {
        return Err(TransferError::NothingToExport(id.to_string()));
    }
    debug!("Exporting {} fields of {}", bundle.len(), id);
    Ok(bundle)
}

/// File name an export is written to unless told otherwise.
pub fn default_export_name(id: &str) -> String {
    format!("elementor-content-{}.json", id)
}

/// Write a bundle as a pretty-printed JSON object.
pub fn write_bundle(bundle: &Bundle, path: &Path) -> Result<(), TransferError> {
    let mut text = serde_json::to_string_pretty(bundle)?;
    text.push('\n');
    fs::write(path, text)?;
    Ok(())
}

// ============================================================================
// Import
// ============================================================================

/// Read and validate an import artifact.
pub fn read_bundle(path: &Path) -> Result<Bundle, TransferError> {
    let json_only = MimeTypes::from_pairs([("json", "application/json")]);
    let name = path.to_string_lossy();
    if !matches!(json_only.check_filetype(&name), Some((_, "application/json"))) {
        return Err(TransferError::InvalidFileType(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(TransferError::MissingFile(path.to_path_buf()));
    }
    let content = fs::read(path)?;
    match serde_json::from_slice::<Value>(&content) {
        Ok(Value::Object(bundle)) => Ok(bundle),
        Ok(_) => Err(TransferError::NotAnObject),
        Err(e) => Err(TransferError::InvalidJson(e)),
    }
}

/// Field names with special handling during import.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Field holding the page layout as JSON text.
    pub layout_field: String,
    /// Derived stylesheet cache: deleted before commit, never imported.
    /// Empty disables.
    pub css_cache_field: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::from(&ImportConfig::default())
    }
}

impl From<&ImportConfig> for ImportOptions {
    fn from(config: &ImportConfig) -> Self {
        Self {
            layout_field: config.layout_field.clone(),
            css_cache_field: config.css_cache_field.clone(),
        }
    }
}

/// What import did with one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAction {
    /// This many string leaves were replaced.
    Rewritten(usize),
    /// Nothing to rewrite; the raw value is committed as is.
    Unchanged,
    /// Processing failed; the raw value is committed as is.
    KeptRaw(String),
    /// Not imported (the stylesheet cache field).
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldReport {
    pub name: String,
    pub encoding: Encoding,
    pub action: FieldAction,
}

/// Outcome of one import.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub id: String,
    pub dry_run: bool,
    pub fields: Vec<FieldReport>,
    /// Fields written to the store.
    pub committed: usize,
    /// `(field, error)` for each write that failed.
    pub failed_commits: Vec<(String, String)>,
    /// Set when the post-import cache invalidation failed.
    pub invalidation_error: Option<String>,
    pub assets: MaterializeStats,
    pub events: Vec<AssetEvent>,
}

impl ImportReport {
    /// Number of fields with at least one rewritten URL.
    pub fn rewritten_fields(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| matches!(f.action, FieldAction::Rewritten(_)))
            .count()
    }
}

/// Rewrite and commit `bundle` as the fields of `id`.
///
/// When the materializer is in dry-run mode every field is processed and
/// reported but the store and invalidator are left alone.
pub fn import(
    bundle: Bundle,
    id: &str,
    store: &mut dyn MetaStore,
    materializer: &mut Materializer<'_>,
    invalidator: &dyn CacheInvalidator,
    options: &ImportOptions,
) -> Result<ImportReport, TransferError> {
    check_content_id(id)?;
    let mut report = ImportReport {
        id: id.to_string(),
        dry_run: materializer.is_dry_run(),
        ..Default::default()
    };

    let mut pending: Vec<(String, Value)> = Vec::with_capacity(bundle.len());
    for (name, raw) in bundle {
        let is_css_cache = !options.css_cache_field.is_empty() && name == options.css_cache_field;
        let (value, encoding, action) = if is_css_cache {
            debug!("Skipping {}: regenerated after import", name);
            (None, codec::detect(&raw), FieldAction::Skipped)
        } else if name == options.layout_field {
            let (value, encoding, action) = process_layout(raw, materializer);
            (Some(value), encoding, action)
        } else {
            let (value, encoding, action) = process_field(raw, materializer);
            (Some(value), encoding, action)
        };
        if let FieldAction::KeptRaw(reason) = &action {
            warn!("Field {} kept as is: {}", name, reason);
        }
        report.fields.push(FieldReport {
            name: name.clone(),
            encoding,
            action,
        });
        if let Some(value) = value {
            pending.push((name, value));
        }
    }

    report.assets = materializer.stats().clone();
    report.events = materializer.events().to_vec();

    if report.dry_run {
        info!("Dry run: {} fields of {} not committed", pending.len(), id);
        return Ok(report);
    }

    if !options.css_cache_field.is_empty()
        && let Err(e) = store.delete(id, &options.css_cache_field)
    {
        warn!("Failed to delete {} of {}: {}", options.css_cache_field, id, e);
    }

    for (name, value) in pending {
        match store.set(id, &name, value) {
            Ok(()) => report.committed += 1,
            Err(e) => {
                warn!("Failed to write {} of {}: {}", name, id, e);
                report.failed_commits.push((name, e.to_string()));
            }
        }
    }

    if let Err(e) = invalidator.invalidate(id) {
        warn!("Cache invalidation for {} failed: {}", id, e);
        report.invalidation_error = Some(e.to_string());
    }

    info!(
        "Imported {} fields into {} ({})",
        report.committed, id, report.assets
    );
    Ok(report)
}

/// The layout field: JSON text wrapped around the page tree.
fn process_layout(raw: Value, materializer: &mut Materializer<'_>) -> (Value, Encoding, FieldAction) {
    let Value::String(text) = &raw else {
        return process_field(raw, materializer);
    };
    if text.is_empty() {
        return (raw, Encoding::Native, FieldAction::Unchanged);
    }
    let tree = match codec::decode_json_text(text) {
        Ok(tree) => tree,
        Err(e) => {
            let reason = format!("layout is not valid JSON: {}", e);
            return (raw, Encoding::Native, FieldAction::KeptRaw(reason));
        }
    };
    finish(raw, tree, Encoding::JsonText, materializer)
}

/// Any other field, in whatever encoding it arrived.
fn process_field(raw: Value, materializer: &mut Materializer<'_>) -> (Value, Encoding, FieldAction) {
    let decoded = codec::decode(&raw);
    finish(raw, decoded.tree, decoded.encoding, materializer)
}

fn finish(
    raw: Value,
    tree: Tree,
    encoding: Encoding,
    materializer: &mut Materializer<'_>,
) -> (Value, Encoding, FieldAction) {
    let before = materializer.rewritten();
    let rewritten = rewrite(tree, materializer);
    let changed = materializer.rewritten() - before;
    if changed == 0 {
        return (raw, encoding, FieldAction::Unchanged);
    }
    match codec::encode(rewritten, encoding) {
        Ok(value) => (value, encoding, FieldAction::Rewritten(changed)),
        Err(e) => (raw, encoding, FieldAction::KeptRaw(format!("re-encoding failed: {}", e))),
    }
}

// ============================================================================
// Inspect
// ============================================================================

/// Encoding and URL references of one field, without touching anything.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSummary {
    pub name: String,
    pub encoding: Encoding,
    /// URLs that would be localized.
    pub assets: Vec<String>,
    /// URLs whose file type is not on the allow-list.
    pub disallowed: Vec<String>,
}

/// Summarize every field of a bundle.
pub fn inspect(bundle: &Bundle, types: &MimeTypes, layout_field: &str) -> Vec<FieldSummary> {
    bundle
        .iter()
        .map(|(name, raw)| {
            let (encoding, tree) = match raw {
                Value::String(text) if name == layout_field && !text.is_empty() => {
                    match codec::decode_json_text(text) {
                        Ok(tree) => (Encoding::JsonText, tree),
                        Err(_) => (Encoding::Native, Tree::Str(text.clone())),
                    }
                }
                _ => {
                    let decoded = codec::decode(raw);
                    (decoded.encoding, decoded.tree)
                }
            };
            let mut summary = FieldSummary {
                name: name.clone(),
                encoding,
                assets: Vec::new(),
                disallowed: Vec::new(),
            };
            for leaf in tree.strings() {
                match classify(leaf, types) {
                    Classification::Asset(_) => summary.assets.push(leaf.to_string()),
                    Classification::DisallowedType(_) => {
                        summary.disallowed.push(leaf.to_string())
                    }
                    Classification::NotUrl => {}
                }
            }
            summary
        })
        .collect()
}
