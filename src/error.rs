//! Error types for the trailhead crate

use thiserror::Error;

/// Result type for trailhead operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for trailhead operations
///
/// Only whole-crawl failures live here; per-branch and per-page faults are
/// recovered by the scheduler and surface in the crawl outcome instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid crawl request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The crawl was cancelled by the caller
    #[error("Crawl cancelled")]
    Cancelled,
}
