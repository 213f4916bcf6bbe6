//! Per-host robots.txt cache with single-flight fetching
//!
//! Concurrent lookups for one host collapse to exactly one GET of that
//! host's `/robots.txt`; the parsed rules are cached per process with a TTL
//! so long-running services pick up policy changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client as ReqwestClient;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;
use url::Url;

use crate::robots::RobotsRules;

/// One cache window for a host's rules
///
/// The `OnceCell` carries the single-flight guarantee: every caller that
/// picked up this slot awaits the same initialization future.
struct CacheSlot {
    cell: Arc<OnceCell<Arc<RobotsRules>>>,
    created_at: Instant,
}

impl CacheSlot {
    fn fresh() -> Self {
        Self {
            cell: Arc::new(OnceCell::new()),
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        // an in-flight fetch is never expired, however old its slot
        self.cell.initialized() && self.created_at.elapsed() > ttl
    }
}

/// Cache of parsed robots rules, keyed by origin, fetched lazily
pub struct RobotsPolicyCache {
    client: ReqwestClient,
    user_agent: String,
    ttl: Duration,
    slots: Mutex<HashMap<String, CacheSlot>>,
}

impl RobotsPolicyCache {
    /// Create a cache that fetches with the given client and user agent
    pub fn new(client: ReqwestClient, user_agent: impl Into<String>, ttl: Duration) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the robots rules governing the given page URL
    ///
    /// Never fails: an unreachable, erroring, or non-2xx robots.txt yields
    /// allow-all rules, which are cached like any other result.
    pub async fn rules_for(&self, page_url: &Url) -> Arc<RobotsRules> {
        let origin = page_url.origin().ascii_serialization();

        let cell = {
            let mut slots = self.slots.lock().await;
            // expired slots for any origin are dropped here, so the map
            // never accumulates hosts that were visited once
            slots.retain(|_, slot| !slot.is_expired(self.ttl));
            slots
                .entry(origin.clone())
                .or_insert_with(CacheSlot::fresh)
                .cell
                .clone()
        };

        cell.get_or_init(|| self.fetch_rules(&origin)).await.clone()
    }

    #[cfg(test)]
    async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }

    async fn fetch_rules(&self, origin: &str) -> Arc<RobotsRules> {
        let robots_url = format!("{}/robots.txt", origin);
        debug!("Fetching robots rules from {}", robots_url);

        match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => Arc::new(RobotsRules::parse(&body, &self.user_agent)),
                Err(e) => {
                    debug!("Failed to read {}: {}; allowing all", robots_url, e);
                    Arc::new(RobotsRules::allow_all())
                }
            },
            Ok(response) => {
                debug!(
                    "{} returned status {}; allowing all",
                    robots_url,
                    response.status()
                );
                Arc::new(RobotsRules::allow_all())
            }
            Err(e) => {
                debug!("Failed to fetch {}: {}; allowing all", robots_url, e);
                Arc::new(RobotsRules::allow_all())
            }
        }
    }
}
