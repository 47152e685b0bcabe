//! The network fetch primitive.
//!
//! [`Fetcher`] is the seam between materialization and the network: it
//! streams one URL into a caller-provided writer or fails. The production
//! implementation is [`HttpFetcher`], a blocking reqwest client with a hard
//! per-request timeout. Failures are never retried here; the caller decides
//! what a failed fetch means (for asset localization: keep the remote URL).

use crate::config::FetchConfig;
use reqwest::blocking::Client;
use std::io::Write;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to create HTTP client: {0}")]
    Init(String),
    #[error("Timed out after {}s fetching {url}", .timeout.as_secs())]
    Timeout { url: String, timeout: Duration },
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Failed to fetch {url}: {reason}")]
    Request { url: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Download primitive used by the materializer.
pub trait Fetcher {
    /// Stream the body of `url` into `sink`, returning the number of bytes
    /// written. Any non-success status is an error.
    fn fetch(&self, url: &Url, sink: &mut dyn Write) -> Result<u64, FetchError>;
}

/// Blocking HTTP client with a total per-request timeout.
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Init(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::new(Duration::from_secs(config.timeout_secs), &config.user_agent)
    }

    fn classify_error(&self, url: &Url, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &Url, sink: &mut dyn Write) -> Result<u64, FetchError> {
        debug!("GET {}", url);
        let mut response = self
            .client
            .get(url.as_str())
            .send()
            .map_err(|e| self.classify_error(url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let written = response
            .copy_to(sink)
            .map_err(|e| self.classify_error(url, e))?;
        sink.flush()?;
        debug!("Fetched {} bytes from {}", written, url);
        Ok(written)
    }
}
