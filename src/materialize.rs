//! Asset materialization: fetch once, store at a deterministic path.
//!
//! # Local paths
//!
//! Every asset URL maps to exactly one local path, computed without I/O:
//!
//! ```text
//! https://old.example.com/wp-content/uploads/2023/01/photo.png?ver=2
//!   fetch URL    https://old.example.com/wp-content/uploads/2023/01/photo.png
//!   fingerprint  crc32(fetch URL) = 1a2b3c4d
//!   relative     2023/01/photo_1a2b3c4d.png
//!   local path   <base_dir>/2023/01/photo_1a2b3c4d.png
//!   public URL   <base_url>/2023/01/photo_1a2b3c4d.png
//! ```
//!
//! The fingerprint covers scheme, host, port and path, so two sites that both
//! have `/uploads/img.png` never collide. Query string and fragment are left
//! out of both the fingerprint and the request: `photo.png?ver=1` and
//! `photo.png?ver=2` are the same file.
//!
//! # Deduplication
//!
//! The filesystem is the only record of what has been materialized. If the
//! local path exists, the asset is reused without touching the network, which
//! makes repeated references within one import and repeated imports of the
//! same bundle free.
//!
//! # Failure
//!
//! [`Materializer::materialize`] never fails. Anything that goes wrong (unsafe
//! path, directory creation, network, write) is logged and the original URL
//! is returned so the document keeps pointing at the source site.
//!
//! Downloads are staged in a temporary file next to the target and moved into
//! place with a no-clobber rename: a failed download leaves nothing at the
//! local path, and of two concurrent imports fetching the same asset the
//! second one simply keeps the first one's file.

use crate::assets::{AssetStore, PathError, RelativePath};
use crate::classify::{Asset, Classification, classify};
use crate::fetch::Fetcher;
use crate::mime::MimeTypes;
use crate::rewrite::LeafRewriter;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use url::Url;

/// Prefix of staging files inside the asset directories.
const STAGING_PREFIX: &str = ".page-transfer-";

/// Where an asset URL resolves to, computed without I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub fetch_url: Url,
    pub relative: RelativePath,
    pub local_path: PathBuf,
    pub public_url: String,
}

/// The URL actually requested: scheme, host, port and path.
pub fn fetch_url(url: &Url) -> Url {
    let mut fetch = url.clone();
    fetch.set_query(None);
    fetch.set_fragment(None);
    // Credentials never take part in naming or fetching.
    let _ = fetch.set_username("");
    let _ = fetch.set_password(None);
    fetch
}

/// Eight hex digits of CRC-32 over the fetch URL.
pub fn fingerprint(url: &Url) -> String {
    format!("{:08x}", crc32fast::hash(fetch_url(url).as_str().as_bytes()))
}

/// Resolve an asset URL to its local path and public URL.
pub fn resolve(url: &Url, store: &AssetStore, source_prefix: &str) -> Result<Resolved, PathError> {
    let base = RelativePath::from_url_path(url.path(), source_prefix)?;
    let relative = base.with_fingerprint(&fingerprint(url)).unwrap_or(base);
    Ok(Resolved {
        fetch_url: fetch_url(url),
        local_path: store.local_path(&relative),
        public_url: store.public_url(&relative),
        relative,
    })
}

/// What happened to one asset reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Downloaded during this run.
    Fetched,
    /// Already present on disk.
    Reused,
    /// Dry run: would be downloaded.
    Planned,
    /// Kept pointing at the source.
    Failed(String),
}

/// One asset reference seen during a walk.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetEvent {
    pub url: String,
    pub relative: Option<String>,
    pub outcome: Outcome,
}

/// Per-run counters.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MaterializeStats {
    pub fetched: u32,
    pub reused: u32,
    pub planned: u32,
    pub failed: u32,
    /// URL leaves whose file type is not on the allow-list.
    pub skipped: u32,
}

impl MaterializeStats {
    pub fn total(&self) -> u32 {
        self.fetched + self.reused + self.planned + self.failed
    }
}

impl fmt::Display for MaterializeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total() == 0 {
            return write!(f, "no assets referenced");
        }
        let mut parts = Vec::new();
        if self.fetched > 0 {
            parts.push(format!("{} fetched", self.fetched));
        }
        if self.planned > 0 {
            parts.push(format!("{} to fetch", self.planned));
        }
        if self.reused > 0 {
            parts.push(format!("{} reused", self.reused));
        }
        if self.failed > 0 {
            parts.push(format!("{} failed", self.failed));
        }
        write!(f, "{} ({} total)", parts.join(", "), self.total())
    }
}

/// Localizes asset URLs into an [`AssetStore`].
///
/// Implements [`LeafRewriter`], so it can be handed straight to
/// [`rewrite`](crate::rewrite::rewrite).
pub struct Materializer<'a> {
    store: &'a AssetStore,
    fetcher: &'a dyn Fetcher,
    types: &'a MimeTypes,
    source_prefix: String,
    dry_run: bool,
    /// Dry runs write nothing, so repeated references are deduplicated here.
    planned: HashSet<PathBuf>,
    stats: MaterializeStats,
    events: Vec<AssetEvent>,
    rewritten: usize,
}

impl<'a> Materializer<'a> {
    pub fn new(
        store: &'a AssetStore,
        fetcher: &'a dyn Fetcher,
        types: &'a MimeTypes,
        source_prefix: &str,
    ) -> Self {
        Self {
            store,
            fetcher,
            types,
            source_prefix: source_prefix.to_string(),
            dry_run: false,
            planned: HashSet::new(),
            stats: MaterializeStats::default(),
            events: Vec::new(),
            rewritten: 0,
        }
    }

    /// Resolve and report, but never create directories or download.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn stats(&self) -> &MaterializeStats {
        &self.stats
    }

    pub fn events(&self) -> &[AssetEvent] {
        &self.events
    }

    /// Number of string leaves replaced so far.
    pub fn rewritten(&self) -> usize {
        self.rewritten
    }

    /// Return the local public URL for `asset`, fetching it if needed, or the
    /// original URL if it cannot be localized.
    pub fn materialize(&mut self, asset: &Asset) -> String {
        self.localize(asset).unwrap_or_else(|| asset.raw.clone())
    }

    /// Like [`materialize`](Self::materialize), with `None` for "keep the
    /// original".
    fn localize(&mut self, asset: &Asset) -> Option<String> {
        let original = asset.url.as_str();
        let resolved = match resolve(&asset.url, self.store, &self.source_prefix) {
            Ok(r) => r,
            Err(e) => {
                warn!("Not localizing {}: {}", original, e);
                self.record(original, None, Outcome::Failed(e.to_string()));
                return None;
            }
        };
        let relative = Some(resolved.relative.to_string());

        if resolved.local_path.exists() {
            debug!("Reusing {} for {}", resolved.local_path.display(), original);
            self.record(original, relative, Outcome::Reused);
            return Some(resolved.public_url);
        }

        if self.dry_run {
            let outcome = if self.planned.insert(resolved.local_path.clone()) {
                Outcome::Planned
            } else {
                Outcome::Reused
            };
            self.record(original, relative, outcome);
            return Some(resolved.public_url);
        }

        match self.download(&resolved) {
            Ok(outcome) => {
                if outcome == Outcome::Fetched {
                    info!(
                        "Fetched {} -> {}",
                        resolved.fetch_url,
                        resolved.local_path.display()
                    );
                }
                self.record(original, relative, outcome);
                Some(resolved.public_url)
            }
            Err(reason) => {
                warn!("Failed to download {}: {}", resolved.fetch_url, reason);
                self.record(original, relative, Outcome::Failed(reason));
                None
            }
        }
    }

    /// Stage the download next to the target, then move it into place.
    fn download(&self, resolved: &Resolved) -> Result<Outcome, String> {
        let dir = resolved
            .local_path
            .parent()
            .ok_or_else(|| "local path has no parent directory".to_string())?;
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;

        let mut staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(dir)
            .map_err(|e| format!("cannot stage download in {}: {}", dir.display(), e))?;

        self.fetcher
            .fetch(&resolved.fetch_url, staging.as_file_mut())
            .map_err(|e| e.to_string())?;

        // Someone else may have finished the same asset while we downloaded.
        if resolved.local_path.exists() {
            return Ok(Outcome::Reused);
        }
        match staging.persist_noclobber(&resolved.local_path) {
            Ok(_) => Ok(Outcome::Fetched),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(Outcome::Reused),
            Err(e) => Err(format!(
                "cannot write {}: {}",
                resolved.local_path.display(),
                e.error
            )),
        }
    }

    fn record(&mut self, url: &str, relative: Option<String>, outcome: Outcome) {
        match &outcome {
            Outcome::Fetched => self.stats.fetched += 1,
            Outcome::Reused => self.stats.reused += 1,
            Outcome::Planned => self.stats.planned += 1,
            Outcome::Failed(_) => self.stats.failed += 1,
        }
        self.events.push(AssetEvent {
            url: url.to_string(),
            relative,
            outcome,
        });
    }
}

impl LeafRewriter for Materializer<'_> {
    fn rewrite_leaf(&mut self, value: &str) -> Option<String> {
        match classify(value, self.types) {
            Classification::Asset(asset) => {
                debug!("File type allowed: {}", value);
                let local = self.localize(&asset).filter(|local| local != value)?;
                self.rewritten += 1;
                Some(local)
            }
            Classification::DisallowedType(_) => {
                debug!("File type not allowed: {}", value);
                self.stats.skipped += 1;
                None
            }
            Classification::NotUrl => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use std::fs;
    use tempfile::TempDir;

    fn asset(url: &str) -> Asset {
        match classify(url, &MimeTypes::stock()) {
            Classification::Asset(a) => a,
            other => panic!("{} did not classify as asset: {:?}", url, other),
        }
    }

    // =========================================================================
    // Path resolution
    // =========================================================================

    #[test]
    fn fingerprint_is_stable_and_short() {
        let url = Url::parse("https://old.example.com/wp-content/uploads/a.png").unwrap();
        assert_eq!(fingerprint(&url), fingerprint(&url));
        assert_eq!(fingerprint(&url).len(), 8);
    }

    #[test]
    fn fingerprint_ignores_query_and_fragment() {
        let plain = Url::parse("https://x.test/a.png").unwrap();
        let busted = Url::parse("https://x.test/a.png?ver=6.4#top").unwrap();
        assert_eq!(fingerprint(&plain), fingerprint(&busted));
    }

    #[test]
    fn fingerprint_distinguishes_hosts_and_ports() {
        let a = Url::parse("https://a.com/img.png").unwrap();
        let b = Url::parse("https://b.com/img.png").unwrap();
        let a_port = Url::parse("https://a.com:8443/img.png").unwrap();
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&a_port));
    }

    #[test]
    fn same_name_on_two_hosts_gets_two_paths() {
        let tmp = TempDir::new().unwrap();
        let store = asset_store(tmp.path());
        let a = resolve(&Url::parse("https://a.com/img.png").unwrap(), &store, UPLOADS).unwrap();
        let b = resolve(&Url::parse("https://b.com/img.png").unwrap(), &store, UPLOADS).unwrap();
        assert_ne!(a.local_path, b.local_path);
        assert_eq!(a.local_path.parent(), b.local_path.parent());
    }

    #[test]
    fn resolve_builds_fingerprinted_path() {
        let tmp = TempDir::new().unwrap();
        let store = asset_store(tmp.path());
        let url = Url::parse("https://old.example.com/wp-content/uploads/2023/01/photo.png?x=1")
            .unwrap();
        let resolved = resolve(&url, &store, UPLOADS).unwrap();
        let fp = fingerprint(&url);

        assert_eq!(
            resolved.fetch_url.as_str(),
            "https://old.example.com/wp-content/uploads/2023/01/photo.png"
        );
        assert_eq!(resolved.relative.to_string(), format!("2023/01/photo_{}.png", fp));
        assert_eq!(
            resolved.local_path,
            tmp.path().join("2023").join("01").join(format!("photo_{}.png", fp))
        );
        assert_eq!(
            resolved.public_url,
            format!("{}/2023/01/photo_{}.png", NEW_BASE_URL, fp)
        );
    }

    #[test]
    fn fetch_url_drops_credentials() {
        let url = Url::parse("https://user:pw@x.test/a.png").unwrap();
        assert_eq!(fetch_url(&url).as_str(), "https://x.test/a.png");
    }

    // =========================================================================
    // Materialization
    // =========================================================================

    #[test]
    fn first_reference_fetches_and_writes() {
        let tmp = TempDir::new().unwrap();
        let store = asset_store(tmp.path());
        let fetcher = MockFetcher::serving(b"PNGDATA");
        let types = MimeTypes::stock();
        let mut m = Materializer::new(&store, &fetcher, &types, UPLOADS);

        let a = asset("https://old.example.com/wp-content/uploads/2023/01/photo.png");
        let new_url = m.materialize(&a);

        let resolved = resolve(&a.url, &store, UPLOADS).unwrap();
        assert_eq!(new_url, resolved.public_url);
        assert_eq!(fs::read(&resolved.local_path).unwrap(), b"PNGDATA");
        assert_eq!(
            fetcher.requests(),
            vec!["https://old.example.com/wp-content/uploads/2023/01/photo.png"]
        );
        assert_eq!(m.stats().fetched, 1);
    }

    #[test]
    fn second_reference_reuses_without_network() {
        let tmp = TempDir::new().unwrap();
        let store = asset_store(tmp.path());
        let fetcher = MockFetcher::serving(b"data");
        let types = MimeTypes::stock();
        let mut m = Materializer::new(&store, &fetcher, &types, UPLOADS);

        let a = asset("https://old.example.com/wp-content/uploads/a.png");
        let first = m.materialize(&a);
        let second = m.materialize(&a);

        assert_eq!(first, second);
        assert_eq!(fetcher.requests().len(), 1);
        assert_eq!(m.stats().fetched, 1);
        assert_eq!(m.stats().reused, 1);
    }

    #[test]
    fn repeated_runs_reuse_existing_files() {
        let tmp = TempDir::new().unwrap();
        let store = asset_store(tmp.path());
        let types = MimeTypes::stock();
        let a = asset("https://old.example.com/wp-content/uploads/a.png");

        let first_fetcher = MockFetcher::serving(b"data");
        let first = Materializer::new(&store, &first_fetcher, &types, UPLOADS).materialize(&a);

        let second_fetcher = MockFetcher::serving(b"other");
        let second = Materializer::new(&store, &second_fetcher, &types, UPLOADS).materialize(&a);

        assert_eq!(first, second);
        assert!(second_fetcher.requests().is_empty());
    }

    #[test]
    fn fetch_failure_keeps_original_and_leaves_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = asset_store(tmp.path());
        let fetcher = MockFetcher::failing();
        let types = MimeTypes::stock();
        let mut m = Materializer::new(&store, &fetcher, &types, UPLOADS);

        let original = "https://old.example.com/wp-content/uploads/2023/01/photo.png";
        let a = asset(original);
        assert_eq!(m.materialize(&a), original);

        let resolved = resolve(&a.url, &store, UPLOADS).unwrap();
        assert!(!resolved.local_path.exists());
        assert_eq!(count_files(tmp.path()), 0, "staging file left behind");
        assert_eq!(m.stats().failed, 1);
        assert!(matches!(m.events()[0].outcome, Outcome::Failed(_)));
    }

    #[test]
    fn fetch_failure_returns_leaf_as_written() {
        let tmp = TempDir::new().unwrap();
        let store = asset_store(tmp.path());
        let fetcher = MockFetcher::failing();
        let types = MimeTypes::stock();
        let mut m = Materializer::new(&store, &fetcher, &types, UPLOADS);

        let original = "HTTPS://Old.Example.com:443/wp-content/uploads/café.png";
        let a = asset(original);
        assert_ne!(a.url.as_str(), original);
        assert_eq!(m.materialize(&a), original);
    }

    #[test]
    fn failed_fetch_is_retried_on_next_run() {
        let tmp = TempDir::new().unwrap();
        let store = asset_store(tmp.path());
        let types = MimeTypes::stock();
        let a = asset("https://old.example.com/wp-content/uploads/a.png");

        let failing = MockFetcher::failing();
        Materializer::new(&store, &failing, &types, UPLOADS).materialize(&a);

        let working = MockFetcher::serving(b"data");
        let url = Materializer::new(&store, &working, &types, UPLOADS).materialize(&a);
        assert_eq!(working.requests().len(), 1);
        assert!(url.starts_with(NEW_BASE_URL));
    }

    #[test]
    fn unsafe_path_keeps_original_without_fetching() {
        let tmp = TempDir::new().unwrap();
        let store = asset_store(tmp.path());
        let fetcher = MockFetcher::serving(b"data");
        let types = MimeTypes::stock();
        let mut m = Materializer::new(&store, &fetcher, &types, UPLOADS);

        let original = "https://x.test/a/..%5C..%5Cevil.png";
        assert_eq!(m.materialize(&asset(original)), original);
        assert!(fetcher.requests().is_empty());
        assert_eq!(m.stats().failed, 1);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = asset_store(tmp.path());
        let fetcher = MockFetcher::serving(b"data");
        let types = MimeTypes::stock();
        let mut m = Materializer::new(&store, &fetcher, &types, UPLOADS).dry_run(true);

        let a = asset("https://old.example.com/wp-content/uploads/a.png");
        let first = m.materialize(&a);
        let second = m.materialize(&a);

        assert_eq!(first, second);
        assert!(fetcher.requests().is_empty());
        assert_eq!(count_files(tmp.path()), 0);
        assert_eq!(m.stats().planned, 1);
        assert_eq!(m.stats().reused, 1);
    }

    // =========================================================================
    // Leaf rewriting
    // =========================================================================

    #[test]
    fn leaf_rewriter_counts_only_changes() {
        let tmp = TempDir::new().unwrap();
        let store = asset_store(tmp.path());
        let fetcher = MockFetcher::serving(b"data");
        let types = MimeTypes::stock();
        let mut m = Materializer::new(&store, &fetcher, &types, UPLOADS);

        assert_eq!(m.rewrite_leaf("just text"), None);
        assert_eq!(m.rewrite_leaf("https://x.test/page/"), None);
        assert!(m.rewrite_leaf("https://x.test/wp-content/uploads/a.jpg").is_some());
        assert_eq!(m.rewritten(), 1);
        assert_eq!(m.stats().skipped, 1);
    }

    #[test]
    fn leaf_rewriter_leaves_failures_alone() {
        let tmp = TempDir::new().unwrap();
        let store = asset_store(tmp.path());
        let fetcher = MockFetcher::failing();
        let types = MimeTypes::stock();
        let mut m = Materializer::new(&store, &fetcher, &types, UPLOADS);

        assert_eq!(m.rewrite_leaf("https://x.test/wp-content/uploads/a.jpg"), None);
        assert_eq!(m.rewritten(), 0);
    }

    // =========================================================================
    // Stats
    // =========================================================================

    #[test]
    fn stats_display() {
        let mut s = MaterializeStats::default();
        assert_eq!(s.to_string(), "no assets referenced");
        s.fetched = 2;
        s.reused = 3;
        s.failed = 1;
        assert_eq!(s.to_string(), "2 fetched, 3 reused, 1 failed (6 total)");
    }
}
