//! Transfer configuration.
//!
//! Handles loading, validating, and merging `page-transfer.toml`. Stock
//! defaults are overridden by whatever the user file specifies; the file is
//! sparse and only needs the keys that differ.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [assets]
//! base_dir = "wp-content/uploads"                    # Destination asset root on disk
//! base_url = "http://localhost/wp-content/uploads"   # Public URL of base_dir
//! source_prefix = "/wp-content/uploads/"             # Stripped from source URL paths
//!
//! [fetch]
//! timeout_secs = 30                                  # Per-asset download timeout
//! user_agent = "page-transfer"
//!
//! [mime]
//! extra = {}                                         # ext = "mime/type" added to the allow-list
//! deny = []                                          # extensions removed from it
//!
//! [store]
//! dir = "meta"                                       # One <id>.json per content item
//!
//! [export]
//! prefixes = []                                      # Field prefixes to export; empty = all
//!
//! [import]
//! layout_field = "_elementor_data"                   # Field holding nested layout JSON
//! css_cache_field = "_elementor_css"                 # Derived field dropped on import
//! after_import = []                                  # Command run after commit, {id} substituted
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::mime::MimeTypes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "page-transfer.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Transfer configuration loaded from `page-transfer.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferConfig {
    /// Destination asset store.
    pub assets: AssetsConfig,
    /// Network fetch settings.
    pub fetch: FetchConfig,
    /// Allow-list adjustments.
    pub mime: MimeConfig,
    /// Metadata store location.
    pub store: StoreConfig,
    /// Export filtering.
    pub export: ExportConfig,
    /// Import field names and post-import hook.
    pub import: ImportConfig,
}

impl TransferConfig {
    /// Validate config values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match Url::parse(&self.assets.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base() => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "assets.base_url must be an absolute http(s) URL, got {:?}",
                    self.assets.base_url
                )));
            }
        }
        if self.assets.base_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "assets.base_dir must not be empty".into(),
            ));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "fetch.timeout_secs must be at least 1".into(),
            ));
        }
        if self.import.layout_field.is_empty() {
            return Err(ConfigError::Validation(
                "import.layout_field must not be empty".into(),
            ));
        }
        if self.mime.types().is_empty() {
            return Err(ConfigError::Validation(
                "mime allow-list is empty; no asset would ever be localized".into(),
            ));
        }
        Ok(())
    }
}

/// Destination asset store: a directory and the URL it is served from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    /// Directory materialized assets are written under.
    pub base_dir: PathBuf,
    /// Public URL corresponding to `base_dir`.
    pub base_url: String,
    /// Source URL path prefix stripped before building the local path.
    pub source_prefix: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("wp-content/uploads"),
            base_url: "http://localhost/wp-content/uploads".to_string(),
            source_prefix: "/wp-content/uploads/".to_string(),
        }
    }
}

/// Network fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Total time allowed for one asset download.
    pub timeout_secs: u64,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("page-transfer/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Adjustments to the stock MIME allow-list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MimeConfig {
    /// Extra `extension = "mime/type"` entries, e.g. `woff2 = "font/woff2"`.
    pub extra: BTreeMap<String, String>,
    /// Extensions removed from the allow-list.
    pub deny: Vec<String>,
}

impl MimeConfig {
    /// The effective allow-list: stock, plus `extra`, minus `deny`.
    pub fn types(&self) -> MimeTypes {
        let mut types = MimeTypes::stock();
        for (ext, mime) in &self.extra {
            types.insert(ext, mime);
        }
        for ext in &self.deny {
            types.remove(ext);
        }
        types
    }
}

/// Metadata store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding one `<id>.json` per content item.
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("meta"),
        }
    }
}

/// Export filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Only export fields starting with one of these prefixes. Empty exports
    /// every field.
    pub prefixes: Vec<String>,
}

/// Import field names and the post-import hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    /// Field holding the page layout as JSON text.
    pub layout_field: String,
    /// Derived stylesheet cache field, deleted before committing and never
    /// imported. Empty disables.
    pub css_cache_field: String,
    /// Command (program + args) run after a successful import to regenerate
    /// derived caches. `{id}` in any argument is replaced with the content id.
    pub after_import: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            layout_field: "_elementor_data".to_string(),
            css_cache_field: "_elementor_css".to_string(),
            after_import: Vec::new(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(TransferConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config does not serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<TransferConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: TransferConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file.
///
/// A missing file is only an error when `required` is set (the user named
/// it explicitly); otherwise the stock defaults apply.
pub fn load_config(path: &Path, required: bool) -> Result<TransferConfig, ConfigError> {
    if !path.exists() && !required {
        return resolve_config(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    resolve_config(Some(value))
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# page-transfer configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Destination asset store
# ---------------------------------------------------------------------------
[assets]
# Directory materialized assets are written under (the destination site's
# uploads directory).
base_dir = "wp-content/uploads"

# Public URL that serves base_dir. Rewritten asset URLs start with this.
base_url = "http://localhost/wp-content/uploads"

# Prefix stripped from source URL paths before they are placed under
# base_dir. Paths without it are placed under base_dir as they are.
source_prefix = "/wp-content/uploads/"

# ---------------------------------------------------------------------------
# Downloads
# ---------------------------------------------------------------------------
[fetch]
# Seconds allowed for each asset download. A timed-out asset keeps its
# original URL; the import carries on.
timeout_secs = 30

# user_agent = "page-transfer/<version>"

# ---------------------------------------------------------------------------
# File types
# ---------------------------------------------------------------------------
[mime]
# The stock allow-list is the host's default upload list plus svg and webp.
# Add types here, e.g. web fonts:
# extra = { woff = "font/woff", woff2 = "font/woff2" }
extra = {}

# Extensions to remove from the allow-list.
deny = []

# ---------------------------------------------------------------------------
# Metadata store
# ---------------------------------------------------------------------------
[store]
# Directory holding one <id>.json file of fields per content item.
dir = "meta"

# ---------------------------------------------------------------------------
# Export
# ---------------------------------------------------------------------------
[export]
# Only export fields starting with one of these prefixes. Empty = all fields.
# prefixes = ["_elementor_", "_wp_page_template"]
prefixes = []

# ---------------------------------------------------------------------------
# Import
# ---------------------------------------------------------------------------
[import]
# Field holding the page layout as JSON text.
layout_field = "_elementor_data"

# Derived stylesheet cache: deleted before import, never imported.
css_cache_field = "_elementor_css"

# Command run after a successful import to regenerate derived caches.
# {id} is replaced with the content id. Failures are logged and ignored.
# after_import = ["wp", "elementor", "flush-css", "--post-id={id}"]
after_import = []
"##
}
