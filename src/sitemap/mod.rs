//! Sitemap document model and acquisition
//!
//! This module provides the value types produced while walking a sitemap
//! tree, plus the fetcher that retrieves documents over HTTP and the parser
//! that turns them into page entries or child-sitemap references.

mod fetch;
mod parse;

pub use fetch::{FetchError, SitemapFetcher};
pub use parse::{ParsedSitemap, parse_sitemap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A single page entry discovered in a sitemap urlset
///
/// Immutable once created by the parser; scoring produces a copy via
/// [`SitemapEntry::with_score`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitemapEntry {
    /// Absolute URI of the page
    pub location: Url,

    /// `<lastmod>` timestamp, if present and parseable
    pub last_modified: Option<DateTime<Utc>>,

    /// Raw `<changefreq>` value, if present
    pub change_frequency: Option<String>,

    /// `<priority>` value, if present and parseable
    pub priority: Option<f64>,

    /// Heuristic score in [0,1]; 0.0 until scored
    pub heuristic_score: f64,
}

impl SitemapEntry {
    /// Create an unscored entry for a location
    pub fn new(location: Url) -> Self {
        Self {
            location,
            last_modified: None,
            change_frequency: None,
            priority: None,
            heuristic_score: 0.0,
        }
    }

    /// Return a copy of this entry carrying the given score, clamped to [0,1]
    pub fn with_score(&self, score: f64) -> Self {
        Self {
            heuristic_score: score.clamp(0.0, 1.0),
            ..self.clone()
        }
    }

    /// Deduplication key: case-insensitive scheme and host, ordinal path and query
    ///
    /// `Url` already lowercases scheme and host during parsing, so the
    /// serialized form without the fragment is the key.
    pub fn dedup_key(&self) -> String {
        let mut key = format!(
            "{}://{}{}",
            self.location.scheme(),
            self.location.authority(),
            self.location.path()
        );
        if let Some(query) = self.location.query() {
            key.push('?');
            key.push_str(query);
        }
        key
    }
}

/// One fetched sitemap document, handed from the fetcher to the parser
#[derive(Debug, Clone)]
pub struct SitemapDocument {
    /// URI the document was fetched from
    pub source_uri: Url,

    /// Decoded document body
    pub raw_content: String,

    /// Whether the body looks like a sitemap index (final say is the parser's)
    pub is_index_hint: bool,

    /// When the document was fetched
    pub fetched_at: DateTime<Utc>,
}
