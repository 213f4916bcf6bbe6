//! Crawl scheduling and orchestration
//!
//! This module drives a crawl through its phases: breadth-first sitemap-tree
//! discovery, dedup/filter/score, budget selection, bounded-concurrency page
//! processing, and outcome aggregation. Per-branch and per-page faults are
//! recovered locally; only systemic failures and caller cancellation fail
//! the whole crawl.

use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future;
use reqwest::Client as ReqwestClient;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::CrawlerDefaults;
use crate::context::{CrawlContext, CrawlRequest};
use crate::error::{Error, Result};
use crate::heuristic::ChangeFrequencyHeuristic;
use crate::policy::UrlFilterPolicy;
use crate::robots::RobotsPolicyCache;
use crate::sitemap::{SitemapEntry, SitemapFetcher, parse_sitemap};

/// A page fetched for processing, handed to the external processor
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URI the page was fetched from
    pub uri: Url,

    /// Content-type header, if the server sent one
    pub content_type: Option<String>,

    /// Response body
    pub body: String,

    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Result of processing one page
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Whether processing succeeded
    pub success: bool,

    /// Number of chunks indexed from the page
    pub chunks_indexed: usize,

    /// Error message when processing failed
    pub error_message: Option<String>,
}

impl ProcessOutcome {
    /// A successful outcome with the given chunk count
    pub fn indexed(chunks_indexed: usize) -> Self {
        Self {
            success: true,
            chunks_indexed,
            error_message: None,
        }
    }

    /// A failed outcome with the given message
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            chunks_indexed: 0,
            error_message: Some(error_message.into()),
        }
    }
}

/// External collaborator that extracts, embeds, and indexes one page
///
/// Implementations must be safe to call from multiple workers at once.
#[async_trait]
pub trait PageProcessor: Send + Sync {
    /// Process one fetched page
    async fn process(&self, page: &FetchedPage) -> ProcessOutcome;
}

/// Aggregated result of one crawl
#[derive(Debug, Clone, Serialize)]
pub struct CrawlOutcome {
    /// Root sitemap the crawl started from
    pub sitemap_url: String,

    /// Entries discovered across the whole sitemap tree
    pub total_discovered: usize,

    /// Entries removed by deduplication or policy
    pub total_filtered: usize,

    /// Pages processed successfully
    pub total_ingested: usize,

    /// Pages that failed to fetch or process
    pub total_failed: usize,

    /// One message per failed page, in completion order
    pub errors: Vec<String>,

    /// Wall-clock duration of the crawl
    pub duration: Duration,
}

/// Orchestrates sitemap discovery, selection, and page processing
pub struct CrawlScheduler {
    fetcher: SitemapFetcher,
    filter: UrlFilterPolicy,
    heuristic: ChangeFrequencyHeuristic,
    processor: Arc<dyn PageProcessor>,
    defaults: CrawlerDefaults,
    page_client: ReqwestClient,
}

impl CrawlScheduler {
    /// Create a scheduler with the given defaults and page processor
    pub fn new(defaults: CrawlerDefaults, processor: Arc<dyn PageProcessor>) -> Self {
        let client = ReqwestClient::builder()
            .timeout(defaults.fetch_timeout())
            .user_agent(&defaults.user_agent)
            .build()
            .expect("Failed to create HTTP client");

        let robots = Arc::new(RobotsPolicyCache::new(
            client.clone(),
            defaults.user_agent.clone(),
            defaults.robots_cache_ttl(),
        ));

        Self {
            fetcher: SitemapFetcher::with_client(client.clone(), defaults.max_sitemap_bytes),
            filter: UrlFilterPolicy::new(robots),
            heuristic: ChangeFrequencyHeuristic::from_defaults(&defaults),
            processor,
            defaults,
            page_client: client,
        }
    }

    /// Run one crawl to completion
    pub async fn crawl(&self, request: CrawlRequest) -> Result<CrawlOutcome> {
        self.crawl_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Run one crawl with cancellation support
    ///
    /// Cancellation during discovery fails the crawl with
    /// [`Error::Cancelled`]; cancellation during page processing shuts the
    /// workers down gracefully and the partial outcome is still returned.
    #[instrument(skip(self, request, cancel), fields(sitemap = %request.sitemap_uri))]
    pub async fn crawl_with_cancellation(
        &self,
        request: CrawlRequest,
        cancel: CancellationToken,
    ) -> Result<CrawlOutcome> {
        if !matches!(request.sitemap_uri.scheme(), "http" | "https") {
            return Err(Error::InvalidRequest(format!(
                "sitemap URI must be http(s), got {}",
                request.sitemap_uri
            )));
        }

        let context = CrawlContext::new(&request, &self.defaults);
        let started = Instant::now();
        info!("Starting crawl of {}", context.root_sitemap);

        let discovered = self.discover(&context, &cancel).await?;
        let total_discovered = discovered.len();
        info!("Discovered {} entries", total_discovered);

        let candidates = self.filter_and_score(discovered, &context).await;
        let total_filtered = total_discovered - candidates.len();
        debug!(
            "{} candidates after dedup and policy ({} filtered)",
            candidates.len(),
            total_filtered
        );

        let selected = select_entries(candidates, context.settings.max_pages);
        info!("Selected {} pages for processing", selected.len());

        let (total_ingested, total_failed, errors) =
            self.process_concurrently(selected, &context, &cancel).await;

        let outcome = CrawlOutcome {
            sitemap_url: context.root_sitemap.to_string(),
            total_discovered,
            total_filtered,
            total_ingested,
            total_failed,
            errors,
            duration: started.elapsed(),
        };
        info!(
            "Crawl finished: {} ingested, {} failed in {:?}",
            outcome.total_ingested, outcome.total_failed, outcome.duration
        );
        Ok(outcome)
    }

    /// Breadth-first expansion of the sitemap tree under the depth bound
    ///
    /// A fetch failure aborts only that branch; cycles are broken by a
    /// case-insensitive visited set.
    async fn discover(
        &self,
        context: &CrawlContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<(SitemapEntry, Option<String>)>> {
        let mut queue: VecDeque<(Url, u32)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut entries: Vec<(SitemapEntry, Option<String>)> = Vec::new();

        visited.insert(context.root_sitemap.as_str().to_ascii_lowercase());
        queue.push_back((context.root_sitemap.clone(), 0));

        while let Some((uri, depth)) = queue.pop_front() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let document = match self.fetcher.fetch(&uri, cancel).await {
                Ok(document) => document,
                Err(e) if e.is_cancelled() => return Err(Error::Cancelled),
                Err(e) => {
                    warn!("Skipping sitemap branch {}: {}", uri, e);
                    continue;
                }
            };

            let parsed = parse_sitemap(&document.source_uri, &document.raw_content);
            debug!(
                "Parsed {}: {} entries, {} children at depth {}",
                uri,
                parsed.entries.len(),
                parsed.child_sitemaps.len(),
                depth
            );
            // each entry remembers which host listed it, for the allowlist
            let source_host = document.source_uri.host_str().map(|h| h.to_string());
            entries.extend(
                parsed
                    .entries
                    .into_iter()
                    .map(|entry| (entry, source_host.clone())),
            );

            if depth < context.settings.max_depth {
                for child in parsed.child_sitemaps {
                    if visited.insert(child.as_str().to_ascii_lowercase()) {
                        queue.push_back((child, depth + 1));
                    }
                }
            } else if !parsed.child_sitemaps.is_empty() {
                debug!(
                    "Dropping {} children of {}: depth bound {} reached",
                    parsed.child_sitemaps.len(),
                    uri,
                    context.settings.max_depth
                );
            }
        }

        Ok(entries)
    }

    /// Dedup (first occurrence wins), apply policy, and score survivors
    async fn filter_and_score(
        &self,
        discovered: Vec<(SitemapEntry, Option<String>)>,
        context: &CrawlContext,
    ) -> Vec<SitemapEntry> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for (entry, source_host) in discovered {
            if !seen.insert(entry.dedup_key()) {
                continue;
            }
            if !self
                .filter
                .should_include(&entry, source_host.as_deref(), context)
                .await
            {
                continue;
            }
            let score = self.heuristic.score(&entry);
            candidates.push(entry.with_score(score));
        }

        candidates
    }

    /// Fan selected entries out over a bounded worker pool
    ///
    /// Each worker fetches one page, delegates to the processor, then idles
    /// the throttle delay before releasing its slot. Per-entry failures are
    /// recorded and never abort sibling workers.
    async fn process_concurrently(
        &self,
        selected: Vec<SitemapEntry>,
        context: &CrawlContext,
        cancel: &CancellationToken,
    ) -> (usize, usize, Vec<String>) {
        let semaphore = Arc::new(Semaphore::new(self.defaults.max_concurrency.max(1)));
        let ingested = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let throttle = context.settings.throttle;

        let workers: Vec<_> = selected
            .into_iter()
            .map(|entry| {
                let semaphore = semaphore.clone();
                let ingested = ingested.clone();
                let failed = failed.clone();
                let errors = errors.clone();
                let cancel = cancel.clone();
                let client = self.page_client.clone();
                let processor = self.processor.clone();

                tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };
                    if cancel.is_cancelled() {
                        debug!("Skipping {}: crawl cancelled", entry.location);
                        return;
                    }

                    match fetch_and_process(&client, processor.as_ref(), &entry, &cancel).await {
                        WorkerResult::Ingested(chunks) => {
                            debug!("Ingested {} ({} chunks)", entry.location, chunks);
                            ingested.fetch_add(1, AtomicOrdering::Relaxed);
                        }
                        WorkerResult::Failed(message) => {
                            warn!("Failed to process {}: {}", entry.location, message);
                            failed.fetch_add(1, AtomicOrdering::Relaxed);
                            errors
                                .lock()
                                .await
                                .push(format!("{}: {}", entry.location, message));
                        }
                        WorkerResult::Cancelled => {
                            debug!("Worker for {} cancelled", entry.location);
                            return;
                        }
                    }

                    // throttle is per completed unit of work; the permit is
                    // held through the delay so the slot stays occupied
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sleep(throttle) => {}
                    }
                })
            })
            .collect();

        let mut join_failures = Vec::new();
        for result in future::join_all(workers).await {
            if let Err(e) = result {
                join_failures.push(format!("worker task failed: {}", e));
            }
        }

        let mut errors = std::mem::take(&mut *errors.lock().await);
        let failed = failed.load(AtomicOrdering::Relaxed) + join_failures.len();
        errors.extend(join_failures);

        (ingested.load(AtomicOrdering::Relaxed), failed, errors)
    }
}

enum WorkerResult {
    Ingested(usize),
    Failed(String),
    Cancelled,
}

/// Fetch one page and hand it to the processor
async fn fetch_and_process(
    client: &ReqwestClient,
    processor: &dyn PageProcessor,
    entry: &SitemapEntry,
    cancel: &CancellationToken,
) -> WorkerResult {
    let response = tokio::select! {
        _ = cancel.cancelled() => return WorkerResult::Cancelled,
        result = client.get(entry.location.clone()).send() => match result {
            Ok(response) => response,
            Err(e) => return WorkerResult::Failed(format!("fetch failed: {}", e)),
        },
    };

    let status = response.status();
    if !status.is_success() {
        return WorkerResult::Failed(format!("fetch returned status {}", status.as_u16()));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let body = tokio::select! {
        _ = cancel.cancelled() => return WorkerResult::Cancelled,
        result = response.text() => match result {
            Ok(body) => body,
            Err(e) => return WorkerResult::Failed(format!("body read failed: {}", e)),
        },
    };

    let page = FetchedPage {
        uri: entry.location.clone(),
        content_type,
        body,
        fetched_at: Utc::now(),
    };

    let outcome = processor.process(&page).await;
    if outcome.success {
        WorkerResult::Ingested(outcome.chunks_indexed)
    } else {
        WorkerResult::Failed(
            outcome
                .error_message
                .unwrap_or_else(|| "processing failed".to_string()),
        )
    }
}

/// Order candidates and take the crawl budget
///
/// Deterministic and stable: score descending, then last-modified descending
/// with missing timestamps last, then discovery order.
pub(crate) fn select_entries(
    mut candidates: Vec<SitemapEntry>,
    max_pages: usize,
) -> Vec<SitemapEntry> {
    // sort_by is stable, so equal keys keep discovery order
    candidates.sort_by(|a, b| {
        b.heuristic_score
            .partial_cmp(&a.heuristic_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| compare_last_modified(a.last_modified, b.last_modified))
    });
    candidates.truncate(max_pages);
    candidates
}

fn compare_last_modified(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CrawlSettings;
    use mockito::{Matcher, Server};
    use std::collections::HashSet;

    /// Test double for the external page processor
    struct StubProcessor {
        calls: Mutex<Vec<String>>,
        fail_path_suffix: Option<String>,
    }

    impl StubProcessor {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_path_suffix: None,
            }
        }

        fn failing_on(suffix: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_path_suffix: Some(suffix.to_string()),
            }
        }

        async fn attempted(&self) -> Vec<String> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl PageProcessor for StubProcessor {
        async fn process(&self, page: &FetchedPage) -> ProcessOutcome {
            self.calls.lock().await.push(page.uri.path().to_string());
            match &self.fail_path_suffix {
                Some(suffix) if page.uri.path().ends_with(suffix.as_str()) => {
                    ProcessOutcome::failed("simulated processing failure")
                }
                _ => ProcessOutcome::indexed(3),
            }
        }
    }

    fn entry_with(uri: &str, score: f64, last_modified: Option<DateTime<Utc>>) -> SitemapEntry {
        let mut entry = SitemapEntry::new(Url::parse(uri).unwrap());
        entry.last_modified = last_modified;
        entry.with_score(score)
    }

    fn test_defaults() -> CrawlerDefaults {
        CrawlerDefaults::builder()
            .throttle_ms(0)
            .fetch_timeout_secs(5)
            .build()
    }

    #[test]
    fn test_select_takes_budget_of_highest_scores() {
        let now = Utc::now();
        let candidates: Vec<SitemapEntry> = (0..500)
            .map(|i| {
                entry_with(
                    &format!("https://example.com/page/{}", i),
                    (i as f64 * 7.0 % 500.0) / 500.0,
                    Some(now),
                )
            })
            .collect();

        // oracle: full sort by score descending
        let mut oracle: Vec<f64> = candidates.iter().map(|e| e.heuristic_score).collect();
        oracle.sort_by(|a, b| b.partial_cmp(a).unwrap());
        oracle.truncate(50);

        let selected = select_entries(candidates, 50);
        assert_eq!(selected.len(), 50);
        let scores: Vec<f64> = selected.iter().map(|e| e.heuristic_score).collect();
        assert_eq!(scores, oracle);
    }

    #[test]
    fn test_select_is_stable_on_ties() {
        let now = Utc::now();
        let candidates: Vec<SitemapEntry> = (0..10)
            .map(|i| entry_with(&format!("https://example.com/tied/{}", i), 0.5, Some(now)))
            .collect();

        let selected = select_entries(candidates, 5);
        let paths: Vec<&str> = selected.iter().map(|e| e.location.path()).collect();
        assert_eq!(paths, vec!["/tied/0", "/tied/1", "/tied/2", "/tied/3", "/tied/4"]);
    }

    #[test]
    fn test_select_orders_missing_lastmod_last() {
        let now = Utc::now();
        let candidates = vec![
            entry_with("https://example.com/no-lastmod", 0.5, None),
            entry_with("https://example.com/old", 0.5, Some(now - chrono::Duration::days(30))),
            entry_with("https://example.com/new", 0.5, Some(now)),
        ];

        let selected = select_entries(candidates, 3);
        let paths: Vec<&str> = selected.iter().map(|e| e.location.path()).collect();
        assert_eq!(paths, vec!["/new", "/old", "/no-lastmod"]);
    }

    #[test]
    fn test_select_smaller_input_than_budget() {
        let candidates = vec![entry_with("https://example.com/only", 0.9, None)];
        assert_eq!(select_entries(candidates, 50).len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_non_http_root() {
        let scheduler = CrawlScheduler::new(test_defaults(), Arc::new(StubProcessor::new()));
        let request = CrawlRequest::new(Url::parse("ftp://example.com/sitemap.xml").unwrap());

        let err = scheduler.crawl(request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_cancellation_during_discovery_fails_crawl() {
        let scheduler = CrawlScheduler::new(test_defaults(), Arc::new(StubProcessor::new()));
        let request = CrawlRequest::new(Url::parse("https://example.com/sitemap.xml").unwrap());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = scheduler
            .crawl_with_cancellation(request, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_end_to_end_index_crawl() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/robots.txt")
            .with_status(404)
            .create_async()
            .await;

        let base = server.url();
        let now = Utc::now().to_rfc3339();
        server
            .mock("GET", "/sitemap.xml")
            .with_status(200)
            .with_body(format!(
                "<sitemapindex>\
                 <sitemap><loc>{base}/a.xml</loc></sitemap>\
                 <sitemap><loc>{base}/b.xml</loc></sitemap>\
                 </sitemapindex>"
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/a.xml")
            .with_status(200)
            .with_body(format!(
                "<urlset>\
                 <url><loc>{base}/a1</loc><changefreq>daily</changefreq></url>\
                 <url><loc>{base}/a2</loc><changefreq>daily</changefreq></url>\
                 <url><loc>{base}/a3</loc><changefreq>never</changefreq></url>\
                 </urlset>"
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/b.xml")
            .with_status(200)
            .with_body(format!(
                "<urlset>\
                 <url><loc>{base}/b1</loc><priority>0.9</priority><lastmod>{now}</lastmod></url>\
                 </urlset>"
            ))
            .create_async()
            .await;
        server
            .mock("GET", Matcher::Regex(r"^/(a\d|b\d)$".to_string()))
            .with_status(200)
            .with_body("<html>page body</html>")
            .create_async()
            .await;

        let processor = Arc::new(StubProcessor::new());
        let scheduler = CrawlScheduler::new(test_defaults(), processor.clone());
        let request = CrawlRequest::new(Url::parse(&format!("{base}/sitemap.xml")).unwrap())
            .with_settings(CrawlSettings {
                max_depth: Some(1),
                max_pages: Some(2),
                ..Default::default()
            });

        let outcome = scheduler.crawl(request).await.unwrap();

        assert_eq!(outcome.total_discovered, 4);
        assert_eq!(outcome.total_ingested, 2);
        assert_eq!(outcome.total_failed, 0);
        assert!(outcome.errors.is_empty());

        // b1 carries priority 0.9 and a fresh lastmod, so it ranks first
        let attempted = processor.attempted().await;
        assert_eq!(attempted.len(), 2);
        assert!(attempted.contains(&"/b1".to_string()));
        assert!(attempted.contains(&"/a1".to_string()));
    }

    #[tokio::test]
    async fn test_children_at_depth_bound_are_not_expanded() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/robots.txt")
            .with_status(404)
            .create_async()
            .await;

        let base = server.url();
        server
            .mock("GET", "/sitemap.xml")
            .with_status(200)
            .with_body(format!(
                "<sitemapindex><sitemap><loc>{base}/child.xml</loc></sitemap></sitemapindex>"
            ))
            .expect(1)
            .create_async()
            .await;
        let child = server
            .mock("GET", "/child.xml")
            .with_status(200)
            .with_body(format!(
                "<sitemapindex><sitemap><loc>{base}/grandchild.xml</loc></sitemap></sitemapindex>"
            ))
            .expect(1)
            .create_async()
            .await;
        let grandchild = server
            .mock("GET", "/grandchild.xml")
            .expect(0)
            .create_async()
            .await;

        let scheduler = CrawlScheduler::new(test_defaults(), Arc::new(StubProcessor::new()));
        let request = CrawlRequest::new(Url::parse(&format!("{base}/sitemap.xml")).unwrap())
            .with_settings(CrawlSettings {
                max_depth: Some(1),
                ..Default::default()
            });

        let outcome = scheduler.crawl(request).await.unwrap();
        assert_eq!(outcome.total_discovered, 0);

        child.assert_async().await;
        grandchild.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_branch_does_not_abort_crawl() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/robots.txt")
            .with_status(404)
            .create_async()
            .await;

        let base = server.url();
        server
            .mock("GET", "/sitemap.xml")
            .with_status(200)
            .with_body(format!(
                "<sitemapindex>\
                 <sitemap><loc>{base}/missing.xml</loc></sitemap>\
                 <sitemap><loc>{base}/present.xml</loc></sitemap>\
                 </sitemapindex>"
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/missing.xml")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/present.xml")
            .with_status(200)
            .with_body(format!(
                "<urlset><url><loc>{base}/page</loc></url></urlset>"
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/page")
            .with_status(200)
            .with_body("body")
            .create_async()
            .await;

        let processor = Arc::new(StubProcessor::new());
        let scheduler = CrawlScheduler::new(test_defaults(), processor.clone());
        let request = CrawlRequest::new(Url::parse(&format!("{base}/sitemap.xml")).unwrap());

        let outcome = scheduler.crawl(request).await.unwrap();
        assert_eq!(outcome.total_discovered, 1);
        assert_eq!(outcome.total_ingested, 1);
    }

    #[tokio::test]
    async fn test_partial_failures_are_aggregated() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/robots.txt")
            .with_status(404)
            .create_async()
            .await;

        let base = server.url();
        let urls: String = (1..=50)
            .map(|i| format!("<url><loc>{base}/page/{i}</loc></url>"))
            .collect();
        server
            .mock("GET", "/sitemap.xml")
            .with_status(200)
            .with_body(format!("<urlset>{urls}</urlset>"))
            .create_async()
            .await;
        server
            .mock("GET", Matcher::Regex(r"^/page/\d+$".to_string()))
            .with_status(200)
            .with_body("body")
            .expect(50)
            .create_async()
            .await;

        // paths ending in "0" fail: 10, 20, 30, 40, 50
        let processor = Arc::new(StubProcessor::failing_on("0"));
        let scheduler = CrawlScheduler::new(test_defaults(), processor.clone());
        let request = CrawlRequest::new(Url::parse(&format!("{base}/sitemap.xml")).unwrap())
            .with_settings(CrawlSettings {
                max_pages: Some(50),
                ..Default::default()
            });

        let outcome = scheduler.crawl(request).await.unwrap();

        assert_eq!(outcome.total_ingested, 45);
        assert_eq!(outcome.total_failed, 5);
        assert_eq!(outcome.errors.len(), 5);
        assert!(outcome
            .errors
            .iter()
            .all(|e| e.contains("simulated processing failure")));
        assert_eq!(processor.attempted().await.len(), 50);
    }

    #[tokio::test]
    async fn test_duplicate_entries_processed_once() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/robots.txt")
            .with_status(404)
            .create_async()
            .await;

        let base = server.url();
        server
            .mock("GET", "/sitemap.xml")
            .with_status(200)
            .with_body(format!(
                "<urlset>\
                 <url><loc>{base}/page</loc></url>\
                 <url><loc>{base}/page</loc><changefreq>daily</changefreq></url>\
                 <url><loc>{base}/page</loc></url>\
                 </urlset>"
            ))
            .create_async()
            .await;
        let page = server
            .mock("GET", "/page")
            .with_status(200)
            .with_body("body")
            .expect(1)
            .create_async()
            .await;

        let processor = Arc::new(StubProcessor::new());
        let scheduler = CrawlScheduler::new(test_defaults(), processor.clone());
        let request = CrawlRequest::new(Url::parse(&format!("{base}/sitemap.xml")).unwrap());

        let outcome = scheduler.crawl(request).await.unwrap();

        assert_eq!(outcome.total_discovered, 3);
        assert_eq!(outcome.total_filtered, 2);
        assert_eq!(outcome.total_ingested, 1);
        assert_eq!(processor.attempted().await.len(), 1);
        page.assert_async().await;
    }

    #[tokio::test]
    async fn test_repeat_crawl_discovers_identical_set() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/robots.txt")
            .with_status(404)
            .create_async()
            .await;

        let base = server.url();
        server
            .mock("GET", "/sitemap.xml")
            .with_status(200)
            .with_body(format!(
                "<urlset>\
                 <url><loc>{base}/x</loc></url>\
                 <url><loc>{base}/y</loc></url>\
                 </urlset>"
            ))
            .create_async()
            .await;
        server
            .mock("GET", Matcher::Regex(r"^/(x|y)$".to_string()))
            .with_status(200)
            .with_body("body")
            .create_async()
            .await;

        let request = CrawlRequest::new(Url::parse(&format!("{base}/sitemap.xml")).unwrap());

        let first_processor = Arc::new(StubProcessor::new());
        let first = CrawlScheduler::new(test_defaults(), first_processor.clone())
            .crawl(request.clone())
            .await
            .unwrap();
        let second_processor = Arc::new(StubProcessor::new());
        let second = CrawlScheduler::new(test_defaults(), second_processor.clone())
            .crawl(request)
            .await
            .unwrap();

        assert_eq!(first.total_discovered, second.total_discovered);
        let first_set: HashSet<String> = first_processor.attempted().await.into_iter().collect();
        let second_set: HashSet<String> = second_processor.attempted().await.into_iter().collect();
        assert_eq!(first_set, second_set);
    }

    /// Processor that cancels the crawl from inside its first page
    struct CancellingProcessor {
        cancel: CancellationToken,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageProcessor for CancellingProcessor {
        async fn process(&self, _page: &FetchedPage) -> ProcessOutcome {
            self.cancel.cancel();
            self.calls.fetch_add(1, AtomicOrdering::Relaxed);
            ProcessOutcome::indexed(1)
        }
    }

    #[tokio::test]
    async fn test_cancellation_during_processing_is_graceful() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/robots.txt")
            .with_status(404)
            .create_async()
            .await;

        let base = server.url();
        let urls: String = (1..=20)
            .map(|i| format!("<url><loc>{base}/page/{i}</loc></url>"))
            .collect();
        server
            .mock("GET", "/sitemap.xml")
            .with_status(200)
            .with_body(format!("<urlset>{urls}</urlset>"))
            .create_async()
            .await;
        server
            .mock("GET", Matcher::Regex(r"^/page/\d+$".to_string()))
            .with_status(200)
            .with_body("body")
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let processor = Arc::new(CancellingProcessor {
            cancel: cancel.clone(),
            calls: AtomicUsize::new(0),
        });
        let scheduler = CrawlScheduler::new(test_defaults(), processor.clone());
        // a real throttle keeps the first workers' slots occupied long
        // enough for the cancellation to reach the waiting ones
        let request = CrawlRequest::new(Url::parse(&format!("{base}/sitemap.xml")).unwrap())
            .with_settings(CrawlSettings {
                max_pages: Some(20),
                throttle_ms: Some(200),
                ..Default::default()
            });

        let outcome = scheduler
            .crawl_with_cancellation(request, cancel)
            .await
            .unwrap();

        // graceful shutdown: skipped pages are neither failures nor errors
        assert_eq!(outcome.total_failed, 0);
        assert!(outcome.errors.is_empty());
        let attempted = processor.calls.load(AtomicOrdering::Relaxed);
        assert!(attempted < 20, "expected early stop, processed {}", attempted);
        assert_eq!(outcome.total_ingested, attempted);
    }

    #[tokio::test]
    async fn test_filtering_honors_each_entry_source_host() {
        let defaults = CrawlerDefaults::builder()
            .respect_robots_txt(false)
            .build();
        let scheduler = CrawlScheduler::new(defaults.clone(), Arc::new(StubProcessor::new()));
        let request = CrawlRequest::new(Url::parse("https://example.com/sitemap.xml").unwrap());
        let context = CrawlContext::new(&request, &defaults);

        // same cross-host page, once listed by its own host's sitemap and
        // once without provenance (falls back to the root host)
        let cross = SitemapEntry::new(Url::parse("https://cdn.example.net/asset").unwrap());
        let discovered = vec![
            (cross.clone(), Some("cdn.example.net".to_string())),
            (
                SitemapEntry::new(Url::parse("https://cdn.example.net/other").unwrap()),
                None,
            ),
        ];

        let candidates = scheduler.filter_and_score(discovered, &context).await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].location, cross.location);
    }
}
