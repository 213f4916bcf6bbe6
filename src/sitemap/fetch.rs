//! HTTP retrieval of sitemap documents

use std::io::Read;

use chrono::Utc;
use flate2::read::GzDecoder;
use reqwest::Client as ReqwestClient;
use reqwest::header::CONTENT_ENCODING;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::config::CrawlerDefaults;
use crate::sitemap::SitemapDocument;

/// Error type for sitemap fetch operations
///
/// One bad sitemap must never abort the crawl: the scheduler recovers from
/// every variant except [`FetchError::Cancelled`] by skipping the branch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP client error (connect, timeout, body read)
    #[error("HTTP error fetching {uri}: {source}")]
    Http {
        /// URI being fetched
        uri: String,
        /// Underlying transport error
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status
    #[error("Unexpected status {status} fetching {uri}")]
    Status {
        /// URI being fetched
        uri: String,
        /// HTTP status code
        status: u16,
    },

    /// The document exceeds the configured byte ceiling
    #[error("Sitemap at {uri} is {size} bytes, ceiling is {limit}")]
    TooLarge {
        /// URI being fetched
        uri: String,
        /// Declared or actual size in bytes
        size: u64,
        /// Configured ceiling in bytes
        limit: u64,
    },

    /// The body could not be decompressed or decoded as UTF-8
    #[error("Failed to decode sitemap at {uri}: {reason}")]
    Decode {
        /// URI being fetched
        uri: String,
        /// What went wrong
        reason: String,
    },

    /// The fetch was cancelled by the caller
    #[error("Fetch of {0} was cancelled")]
    Cancelled(String),
}

impl FetchError {
    /// HTTP status code, for the non-2xx variant
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this failure is caller cancellation rather than a remote fault
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled(_))
    }
}

/// Retrieves one sitemap document over HTTP
///
/// Applies the configured timeout and user agent, enforces the sitemap byte
/// ceiling, and transparently decompresses gzip payloads.
#[derive(Clone)]
pub struct SitemapFetcher {
    client: ReqwestClient,
    max_bytes: u64,
}

impl SitemapFetcher {
    /// Create a fetcher from the service defaults
    pub fn new(defaults: &CrawlerDefaults) -> Self {
        let client = ReqwestClient::builder()
            .timeout(defaults.fetch_timeout())
            .user_agent(&defaults.user_agent)
            .build()
            .expect("Failed to create HTTP client");

        Self::with_client(client, defaults.max_sitemap_bytes)
    }

    /// Create a fetcher around an existing client
    pub fn with_client(client: ReqwestClient, max_bytes: u64) -> Self {
        Self { client, max_bytes }
    }

    /// Fetch and decode one sitemap document
    ///
    /// Non-2xx responses, oversized documents, and decode failures all come
    /// back as `Err` values rather than panics; cancellation is surfaced
    /// distinctly so the scheduler can tell it apart from a remote fault.
    #[instrument(skip(self, cancel), level = "debug")]
    pub async fn fetch(
        &self,
        uri: &Url,
        cancel: &CancellationToken,
    ) -> Result<SitemapDocument, FetchError> {
        debug!("Fetching sitemap {}", uri);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled(uri.to_string())),
            result = self.client.get(uri.clone()).send() => {
                result.map_err(|source| FetchError::Http {
                    uri: uri.to_string(),
                    source,
                })?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }

        // Reject on the declared length before pulling the body.
        if let Some(declared) = response.content_length()
            && declared > self.max_bytes
        {
            return Err(FetchError::TooLarge {
                uri: uri.to_string(),
                size: declared,
                limit: self.max_bytes,
            });
        }

        let gzip_encoded = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains("gzip"));

        let bytes = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled(uri.to_string())),
            result = response.bytes() => {
                result.map_err(|source| FetchError::Http {
                    uri: uri.to_string(),
                    source,
                })?
            }
        };

        // Servers that omit content-length still get the ceiling enforced.
        if bytes.len() as u64 > self.max_bytes {
            return Err(FetchError::TooLarge {
                uri: uri.to_string(),
                size: bytes.len() as u64,
                limit: self.max_bytes,
            });
        }

        let compressed = gzip_encoded || uri.path().ends_with(".gz");
        let raw_content = decode_body(&bytes, compressed).map_err(|reason| FetchError::Decode {
            uri: uri.to_string(),
            reason,
        })?;

        let is_index_hint = raw_content.contains("<sitemapindex");

        Ok(SitemapDocument {
            source_uri: uri.clone(),
            raw_content,
            is_index_hint,
            fetched_at: Utc::now(),
        })
    }
}

/// Decompress if needed and decode UTF-8 with BOM stripping
fn decode_body(bytes: &[u8], compressed: bool) -> Result<String, String> {
    let decoded = if compressed {
        let mut decoder = GzDecoder::new(bytes);
        let mut content = Vec::new();
        decoder
            .read_to_end(&mut content)
            .map_err(|e| format!("gzip decompression failed: {}", e))?;
        content
    } else {
        bytes.to_vec()
    };

    let without_bom = decoded
        .strip_prefix(&[0xEF, 0xBB, 0xBF][..])
        .unwrap_or(&decoded);

    String::from_utf8(without_bom.to_vec()).map_err(|e| format!("invalid UTF-8: {}", e))
}
