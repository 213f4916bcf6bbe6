//! Crawl request and context types
//!
//! A [`CrawlRequest`] carries the root sitemap URI plus optional per-call
//! overrides; resolving those overrides against the service
//! [`CrawlerDefaults`] produces an immutable [`CrawlContext`] shared
//! read-only across concurrent workers.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::CrawlerDefaults;

/// Per-call overrides for a single crawl
///
/// Every field is optional; unset fields fall back to the service defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Maximum number of pages to process
    pub max_pages: Option<usize>,

    /// Maximum sitemap-index recursion depth
    pub max_depth: Option<u32>,

    /// Whether to respect robots.txt
    pub respect_robots_txt: Option<bool>,

    /// Hosts that candidate pages may belong to
    pub allowed_hosts: Option<Vec<String>>,

    /// Per-worker throttle delay in milliseconds
    pub throttle_ms: Option<u64>,
}

/// A request to crawl one sitemap tree
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    /// Absolute http(s) URI of the root sitemap
    pub sitemap_uri: Url,

    /// Per-call overrides
    pub settings: CrawlSettings,

    /// Caller-supplied metadata carried through to logging
    pub metadata: HashMap<String, String>,
}

impl CrawlRequest {
    /// Create a request with default settings and no metadata
    pub fn new(sitemap_uri: Url) -> Self {
        Self {
            sitemap_uri,
            settings: CrawlSettings::default(),
            metadata: HashMap::new(),
        }
    }

    /// Attach per-call settings
    pub fn with_settings(mut self, settings: CrawlSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Attach request metadata
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Settings with every override resolved against the defaults
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    /// Maximum number of pages to process
    pub max_pages: usize,

    /// Maximum sitemap-index recursion depth
    pub max_depth: u32,

    /// Whether to respect robots.txt
    pub respect_robots_txt: bool,

    /// Explicit host allowlist; empty means "fall back to the root host"
    pub allowed_hosts: Vec<String>,

    /// Per-worker throttle delay
    pub throttle: Duration,
}

/// Immutable context for one crawl, shared read-only across workers
#[derive(Debug, Clone)]
pub struct CrawlContext {
    /// The root sitemap this crawl started from
    pub root_sitemap: Url,

    /// Effective settings for this crawl
    pub settings: ResolvedSettings,

    /// Caller-supplied metadata
    pub metadata: HashMap<String, String>,
}

impl CrawlContext {
    /// Resolve a request against the service defaults
    pub fn new(request: &CrawlRequest, defaults: &CrawlerDefaults) -> Self {
        let settings = &request.settings;
        let resolved = ResolvedSettings {
            max_pages: settings.max_pages.unwrap_or(defaults.max_pages),
            max_depth: settings.max_depth.unwrap_or(defaults.max_depth),
            respect_robots_txt: settings
                .respect_robots_txt
                .unwrap_or(defaults.respect_robots_txt),
            allowed_hosts: settings.allowed_hosts.clone().unwrap_or_default(),
            throttle: settings
                .throttle_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| defaults.throttle()),
        };

        Self {
            root_sitemap: request.sitemap_uri.clone(),
            settings: resolved,
            metadata: request.metadata.clone(),
        }
    }

    /// The effective allowed-host set for candidate pages
    ///
    /// The explicit per-call allowlist wins when non-empty; otherwise the
    /// host of the sitemap document the entry came from, and as a last
    /// resort the root sitemap's host. Pages listed by a cross-host child
    /// sitemap thus stay within that child's host by default.
    pub fn effective_allowed_hosts(&self, source_host: Option<&str>) -> Vec<String> {
        if !self.settings.allowed_hosts.is_empty() {
            return self.settings.allowed_hosts.clone();
        }
        if let Some(host) = source_host {
            return vec![host.to_string()];
        }
        self.root_sitemap
            .host_str()
            .map(|h| vec![h.to_string()])
            .unwrap_or_default()
    }
}
