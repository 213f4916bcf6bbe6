//! Change-frequency/recency scoring heuristic
//!
//! A pure function from sitemap entry to a [0,1] priority used to rank
//! candidates under the crawl budget. Declared change frequency and lastmod
//! recency are blended by a configurable weight; a declared priority, when
//! present, is averaged into the result.

use chrono::{DateTime, Utc};

use crate::config::CrawlerDefaults;
use crate::sitemap::SitemapEntry;

const LN_2: f64 = std::f64::consts::LN_2;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Scores sitemap entries by declared change frequency and recency
#[derive(Debug, Clone)]
pub struct ChangeFrequencyHeuristic {
    half_life_days: f64,
    change_frequency_weight: f64,
}

impl ChangeFrequencyHeuristic {
    /// Create a heuristic with the given recency half-life (days) and
    /// change-frequency blend weight
    ///
    /// The weight is clamped to [0,1]; a non-positive half-life falls back
    /// to one day.
    pub fn new(half_life_days: f64, change_frequency_weight: f64) -> Self {
        Self {
            half_life_days: if half_life_days > 0.0 {
                half_life_days
            } else {
                1.0
            },
            change_frequency_weight: change_frequency_weight.clamp(0.0, 1.0),
        }
    }

    /// Create a heuristic from the service defaults
    pub fn from_defaults(defaults: &CrawlerDefaults) -> Self {
        Self::new(
            defaults.recency_half_life_days,
            defaults.change_frequency_weight,
        )
    }

    /// Score an entry against the current time
    pub fn score(&self, entry: &SitemapEntry) -> f64 {
        self.score_at(entry, Utc::now())
    }

    /// Score an entry against an explicit "now", for deterministic tests
    pub fn score_at(&self, entry: &SitemapEntry, now: DateTime<Utc>) -> f64 {
        let frequency = change_frequency_score(entry.change_frequency.as_deref());
        let recency = match entry.last_modified {
            Some(last_modified) => recency_score(last_modified, now, self.half_life_days),
            None => 0.5,
        };

        let weight = self.change_frequency_weight;
        let combined = weight * frequency + (1.0 - weight) * recency;

        let blended = match entry.priority {
            Some(priority) => (combined + priority.clamp(0.0, 1.0)) / 2.0,
            None => combined,
        };

        blended.clamp(0.0, 1.0)
    }
}

/// Lookup table for declared change frequencies
///
/// Unrecognized or absent values sit at the neutral midpoint.
fn change_frequency_score(change_frequency: Option<&str>) -> f64 {
    let Some(value) = change_frequency else {
        return 0.5;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "always" => 1.0,
        "hourly" => 0.95,
        "daily" => 0.85,
        "weekly" => 0.7,
        "monthly" => 0.5,
        "yearly" => 0.25,
        "never" => 0.1,
        _ => 0.5,
    }
}

/// Exponential decay of recency: 1.0 now, halving every `half_life_days`
fn recency_score(last_modified: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let age = now.signed_duration_since(last_modified);
    if age <= chrono::Duration::zero() {
        return 1.0;
    }
    let age_days = age.num_seconds() as f64 / SECONDS_PER_DAY;
    (-LN_2 * age_days / half_life_days).exp().clamp(0.0, 1.0)
}
