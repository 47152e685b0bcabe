//! # Page Transfer
//!
//! Moves page-builder content between two installations of a site, bringing
//! the media it references along. A page's metadata fields are exported as a
//! JSON bundle on one side and imported on the other; during import every
//! embedded asset URL is fetched from the source site, stored under the
//! destination's asset root, and rewritten to point there.
//!
//! # Architecture: Decode, Walk, Encode
//!
//! ```text
//! bundle field  ──decode──▶  Tree  ──rewrite──▶  Tree  ──encode──▶  field
//!                               │                   ▲
//!                               └── string leaf ──▶ classify ──▶ materialize
//! ```
//!
//! Field values arrive in one of three encodings: legacy serialized text,
//! JSON text, or a plain value. Each is decoded into a [`tree::Tree`], walked
//! by [`rewrite::rewrite`], and encoded back in the encoding it arrived in.
//! Only string leaves that [`classify`] recognizes as allowed asset URLs can
//! change; everything else, including container shape and key order, passes
//! through. A field with nothing to rewrite is written back byte for byte.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`transfer`] | Export, import and inspect of whole bundles |
//! | [`tree`] | The document tree every encoding decodes into |
//! | [`codec`] | Encoding detection, decode and encode (JSON text, legacy serialized text) |
//! | [`rewrite`] | Shape-preserving walk that replaces string leaves |
//! | [`classify`] | Decides whether a string is an allowed asset URL |
//! | [`mime`] | Extension → MIME type allow-list |
//! | [`materialize`] | Fetch-once asset localization with fingerprinted paths |
//! | [`assets`] | Destination asset store: directory + public URL |
//! | [`fetch`] | HTTP download primitive |
//! | [`store`] | Per-item metadata stores |
//! | [`invalidate`] | Post-import cache invalidation hook |
//! | [`config`] | `page-transfer.toml` loading, validation and merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The Filesystem Is the Cache
//!
//! Whether an asset has been materialized is decided by one question: does a
//! file exist at its local path? Local paths are a pure function of the URL
//! (source path plus a CRC-32 fingerprint of scheme, host, port and path), so
//! the same URL always lands in the same place. There is no index to go stale
//! and re-running an import costs no network traffic.
//!
//! ## Soft Failure per Asset
//!
//! A missing or slow asset must not sink a page. Fetch errors, unsafe paths
//! and write errors are logged, and the field keeps the source URL. Only
//! problems with the bundle itself (wrong file type, bad JSON, missing id)
//! stop an import, and they stop it before anything is written.
//!
//! ## Traits at the Host Boundary
//!
//! The metadata store, the network and the cache invalidation hook are
//! traits ([`store::MetaStore`], [`fetch::Fetcher`],
//! [`invalidate::CacheInvalidator`]), each with one production adapter. Tests
//! swap in recording fakes and never touch the network.

pub mod assets;
pub mod classify;
pub mod codec;
pub mod config;
pub mod fetch;
pub mod invalidate;
pub mod materialize;
pub mod mime;
pub mod output;
pub mod rewrite;
pub mod store;
pub mod transfer;
pub mod tree;

#[cfg(test)]
pub(crate) mod test_helpers;
