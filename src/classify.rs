//! Decide which string leaves are localizable asset URLs.
//!
//! A leaf is an asset when it is an absolute `http(s)` URL with a host, and
//! the extension of its path is on the MIME allow-list. Classification is
//! pure: no I/O and nothing is cached.

use crate::mime::MimeTypes;
use url::Url;

/// A URL that should be materialized locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    /// The leaf exactly as it appeared in the document.
    pub raw: String,
    pub url: Url,
    /// Extension as written in the URL (original case).
    pub ext: String,
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Asset(Asset),
    /// A well-formed URL whose file type is not on the allow-list.
    DisallowedType(Url),
    NotUrl,
}

impl Classification {
    pub fn is_asset(&self) -> bool {
        matches!(self, Classification::Asset(_))
    }
}

/// Classify a string leaf.
pub fn classify(value: &str, types: &MimeTypes) -> Classification {
    let Some(url) = parse_absolute(value) else {
        return Classification::NotUrl;
    };
    if types.is_empty() || url.path().ends_with('/') {
        return Classification::DisallowedType(url);
    }
    let Some((ext, mime)) = types
        .check_filetype(url.path())
        .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
    else {
        return Classification::DisallowedType(url);
    };
    Classification::Asset(Asset {
        raw: value.to_string(),
        url,
        ext,
        mime,
    })
}

/// Parse a strict absolute URL: http(s), a host, no surrounding or embedded
/// whitespace. The URL parser itself would quietly trim and percent-encode
/// such input, which turns prose into "URLs".
fn parse_absolute(value: &str) -> Option<Url> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return None;
    }
    let url = Url::parse(value).ok()?;
    match url.scheme() {
        "http" | "https" => {}
        _ => return None,
    }
    url.host_str().filter(|h| !h.is_empty())?;
    Some(url)
}
