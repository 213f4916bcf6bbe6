//! # Trailhead - Sitemap Discovery and Crawl Scheduling for Rust
//!
//! This crate provides the discovery and scheduling core of a content
//! ingestion pipeline. Starting from a root sitemap it walks nested sitemap
//! indexes breadth-first, filters candidates against a host allowlist and
//! robots.txt policy, ranks them by a change-frequency/recency heuristic, and
//! fans the selected pages out to a pluggable processor under a bounded
//! worker pool.
//!
//! ## Features
//!
//! - Sitemap and sitemap-index traversal with a configurable depth bound
//! - Gzip-compressed sitemap support with a byte ceiling per document
//! - Per-host robots.txt caching with single-flight fetching
//! - Change-frequency and recency scoring for crawl-budget selection
//! - Bounded-concurrency page processing with per-worker throttling
//! - Cooperative cancellation via `tokio_util` cancellation tokens
//! - Async API with Tokio
//! - Robust error handling and logging
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trailhead::config::CrawlerDefaults;
//! use trailhead::context::CrawlRequest;
//! use trailhead::scheduler::{CrawlScheduler, FetchedPage, PageProcessor, ProcessOutcome};
//! use url::Url;
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl PageProcessor for Printer {
//!     async fn process(&self, page: &FetchedPage) -> ProcessOutcome {
//!         println!("processing {}", page.uri);
//!         ProcessOutcome::indexed(1)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let defaults = CrawlerDefaults::builder().max_pages(25).build();
//!     let scheduler = CrawlScheduler::new(defaults, Arc::new(Printer));
//!
//!     let request = CrawlRequest::new(Url::parse("https://example.com/sitemap.xml")?);
//!     let outcome = scheduler.crawl(request).await?;
//!
//!     println!(
//!         "{} discovered, {} ingested, {} failed",
//!         outcome.total_discovered, outcome.total_ingested, outcome.total_failed
//!     );
//!     Ok(())
//! }
//! ```

mod error;

pub mod config;
pub mod context;
pub mod heuristic;
pub mod policy;
pub mod robots;
pub mod scheduler;
pub mod sitemap;

pub use error::{Error, Result};
