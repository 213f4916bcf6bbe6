//! Candidate URL filtering
//!
//! Composes the host allowlist and the robots.txt policy cache into a single
//! accept/reject decision per discovered entry.

use std::sync::Arc;

use tracing::trace;

use crate::context::CrawlContext;
use crate::robots::RobotsPolicyCache;
use crate::sitemap::SitemapEntry;

/// Accepts or rejects discovered entries against crawl policy
pub struct UrlFilterPolicy {
    robots: Arc<RobotsPolicyCache>,
}

impl UrlFilterPolicy {
    /// Create a filter backed by the given robots cache
    pub fn new(robots: Arc<RobotsPolicyCache>) -> Self {
        Self { robots }
    }

    /// Decide whether one entry should be crawled
    ///
    /// `source_host` is the host of the sitemap document the entry was
    /// listed in; it bounds the entry when no explicit allowlist is set.
    /// Rejection is a normal filtering outcome, not an error: non-http(s)
    /// schemes and hosts outside the effective allowlist are dropped
    /// immediately, and robots rules are only consulted when the crawl
    /// respects them.
    pub async fn should_include(
        &self,
        entry: &SitemapEntry,
        source_host: Option<&str>,
        context: &CrawlContext,
    ) -> bool {
        let url = &entry.location;

        if !matches!(url.scheme(), "http" | "https") {
            trace!("Rejecting {}: non-http(s) scheme", url);
            return false;
        }

        let Some(host) = url.host_str() else {
            trace!("Rejecting {}: no host", url);
            return false;
        };

        let allowed_hosts = context.effective_allowed_hosts(source_host);
        if !allowed_hosts.is_empty()
            && !allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(host))
        {
            trace!("Rejecting {}: host not in allowlist", url);
            return false;
        }

        if !context.settings.respect_robots_txt {
            return true;
        }

        let rules = self.robots.rules_for(url).await;
        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }

        let allowed = rules.is_allowed(&target);
        if !allowed {
            trace!("Rejecting {}: disallowed by robots.txt", url);
        }
        allowed
    }
}
