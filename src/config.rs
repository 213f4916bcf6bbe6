//! # Crawler Configuration Module
//!
//! This module provides the service-level defaults for the crawl scheduler,
//! including crawl budgets, concurrency bounds, throttling, and the scoring
//! heuristic's tuning knobs. It uses a builder pattern for flexible
//! configuration.
//!
//! ## Key Components
//!
//! - `CrawlerDefaults`: The main configuration struct with scheduler parameters
//! - `CrawlerDefaultsBuilder`: Builder pattern implementation for easier configuration
//!
//! ## Features
//!
//! - Default configurations suitable for polite crawling
//! - Fine-grained control over crawl behavior (pages, depth, concurrency, throttle)
//! - Sitemap transport limits (timeout, byte ceiling)
//! - Heuristic tuning (recency half-life, change-frequency weight)
//! - User-agent customization

use std::time::Duration;

/// Service-level defaults for the crawl scheduler
///
/// Individual crawl requests may override the budget-related fields through
/// [`CrawlSettings`](crate::context::CrawlSettings); the remaining fields
/// apply to every crawl served by the scheduler.
#[derive(Debug, Clone)]
pub struct CrawlerDefaults {
    /// Maximum number of pages to process per crawl
    pub max_pages: usize,

    /// Maximum sitemap-index recursion depth (root sitemap is depth 0)
    pub max_depth: u32,

    /// Maximum number of pages processed concurrently
    pub max_concurrency: usize,

    /// Delay in milliseconds each worker idles after finishing a page
    pub throttle_ms: u64,

    /// Whether to respect robots.txt
    pub respect_robots_txt: bool,

    /// User agent to use for requests
    pub user_agent: String,

    /// Timeout in seconds for each HTTP fetch
    pub fetch_timeout_secs: u64,

    /// Byte ceiling for a single sitemap document
    pub max_sitemap_bytes: u64,

    /// Half-life in days for the recency score decay
    pub recency_half_life_days: f64,

    /// Weight of the change-frequency score when blending with recency
    pub change_frequency_weight: f64,

    /// How long cached robots.txt rules stay valid
    pub robots_cache_ttl_secs: u64,
}

impl Default for CrawlerDefaults {
    fn default() -> Self {
        Self {
            max_pages: 200,
            max_depth: 2,
            max_concurrency: 3,
            throttle_ms: 250,
            respect_robots_txt: true,
            user_agent: format!("trailhead-crawler/{}", env!("CARGO_PKG_VERSION")),
            fetch_timeout_secs: 30,
            max_sitemap_bytes: 10 * 1024 * 1024,
            recency_half_life_days: 7.0,
            change_frequency_weight: 0.6,
            robots_cache_ttl_secs: 24 * 3600,
        }
    }
}

/// Builder for CrawlerDefaults
#[derive(Debug, Default)]
pub struct CrawlerDefaultsBuilder {
    defaults: CrawlerDefaults,
}

impl CrawlerDefaultsBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            defaults: CrawlerDefaults::default(),
        }
    }

    /// Set the maximum number of pages to process per crawl
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.defaults.max_pages = max_pages;
        self
    }

    /// Set the maximum sitemap-index recursion depth
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.defaults.max_depth = max_depth;
        self
    }

    /// Set the maximum number of concurrently processed pages
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.defaults.max_concurrency = max_concurrency;
        self
    }

    /// Set the per-worker throttle delay in milliseconds
    pub fn throttle_ms(mut self, throttle_ms: u64) -> Self {
        self.defaults.throttle_ms = throttle_ms;
        self
    }

    /// Set whether to respect robots.txt
    pub fn respect_robots_txt(mut self, respect_robots_txt: bool) -> Self {
        self.defaults.respect_robots_txt = respect_robots_txt;
        self
    }

    /// Set the user agent to use for requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.defaults.user_agent = user_agent.into();
        self
    }

    /// Set the HTTP fetch timeout in seconds
    pub fn fetch_timeout_secs(mut self, fetch_timeout_secs: u64) -> Self {
        self.defaults.fetch_timeout_secs = fetch_timeout_secs;
        self
    }

    /// Set the byte ceiling for a single sitemap document
    pub fn max_sitemap_bytes(mut self, max_sitemap_bytes: u64) -> Self {
        self.defaults.max_sitemap_bytes = max_sitemap_bytes;
        self
    }

    /// Set the recency half-life in days
    pub fn recency_half_life_days(mut self, days: f64) -> Self {
        self.defaults.recency_half_life_days = days;
        self
    }

    /// Set the change-frequency blend weight
    pub fn change_frequency_weight(mut self, weight: f64) -> Self {
        self.defaults.change_frequency_weight = weight;
        self
    }

    /// Set the robots.txt cache TTL in seconds
    pub fn robots_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.defaults.robots_cache_ttl_secs = secs;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlerDefaults {
        self.defaults
    }
}

impl CrawlerDefaults {
    /// Create a new builder
    pub fn builder() -> CrawlerDefaultsBuilder {
        CrawlerDefaultsBuilder::new()
    }

    /// Get the per-worker throttle delay as a Duration
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// Get the HTTP fetch timeout as a Duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Get the robots.txt cache TTL as a Duration
    pub fn robots_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_cache_ttl_secs)
    }
}
