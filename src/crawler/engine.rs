//! The sequential crawl loop

use super::config::CrawlerConfig;
use super::content_extraction::extract_page;
use super::error::CrawlError;
use super::fetcher::{FetchedPage, Fetcher};
use super::frontier::{Frontier, UrlStatus, normalize_url};
use super::session::CrawlSession;
use super::storage::{FetchLogEntry, SessionStore};
use super::PageRecord;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Snapshot passed to the progress callback after every fetch attempt
#[derive(Debug, Clone)]
pub struct CrawlProgress {
    pub url: String,
    pub fetched: usize,
    pub failed: usize,
    pub pending: usize,
    pub max_pages: usize,
}

pub type ProgressCallback = Arc<dyn Fn(CrawlProgress) + Send + Sync>;

/// Cooperative stop request, honored between fetches
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Polite single-site crawler
pub struct Crawler<F: Fetcher> {
    fetcher: F,
    config: CrawlerConfig,
    progress: Option<ProgressCallback>,
    stop: StopSignal,
}

impl<F: Fetcher> Crawler<F> {
    pub fn new(fetcher: F, config: CrawlerConfig) -> Self {
        Self {
            fetcher,
            config,
            progress: None,
            stop: StopSignal::new(),
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Crawl the site rooted at `seed`, persisting records as they are produced
    ///
    /// Per-page failures become failed stubs and the crawl continues. An
    /// invalid or unresolvable seed and storage failures abort the run.
    #[instrument(skip(self))]
    pub async fn run(&self, seed: &str, max_pages: usize) -> Result<CrawlSession, CrawlError> {
        let seed = Url::parse(seed)?;
        if !matches!(seed.scheme(), "http" | "https") || seed.host_str().is_none() {
            return Err(CrawlError::Other(format!("unsupported seed URL: {}", seed)));
        }
        self.fetcher.check_seed(&seed).await?;

        let seed = normalize_url(&seed);
        let mut session = CrawlSession::new(seed.clone(), max_pages);
        let mut store =
            SessionStore::create(&self.config.output_dir, &session.domain, session.started_at).await?;
        session.output_dir = Some(store.dir().to_path_buf());

        let mut frontier = Frontier::new(&seed, max_pages);
        if let Some(depth) = self.config.max_depth {
            frontier = frontier.with_max_depth(depth);
        }
        frontier.enqueue(&seed, 0);

        let limiter = Quota::with_period(self.config.delay()).map(RateLimiter::direct);
        info!(seed = %seed, max_pages, dir = %store.dir().display(), "crawl started");

        let mut attempts = 0usize;
        let mut completed = true;
        loop {
            if self.stop.is_stopped() {
                info!(pages = session.page_count(), "stop requested");
                completed = false;
                break;
            }
            let Some(next) = frontier.next() else {
                break;
            };

            let sequence = session.next_sequence();
            let started = Instant::now();
            let result = self.fetch_with_retry(&next.url, limiter.as_ref()).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            attempts += 1;

            let outcome = match result {
                Ok(fetched) => {
                    self.handle_page(fetched, &next.url, next.depth, sequence, &mut frontier, &mut session, &mut store)
                        .await
                }
                Err(e) => Err(e),
            };

            if let Err(e) = outcome {
                if !e.is_recoverable() {
                    return Err(e);
                }
                warn!(url = %next.url, error = %e, "page failed");
                store
                    .append_log(&FetchLogEntry {
                        url: next.url.as_str(),
                        status: e.status(),
                        duration_ms: elapsed_ms,
                        outcome: &e.to_string(),
                    })
                    .await?;
                frontier.mark(&next.url, UrlStatus::Failed);
                session.add_failure(PageRecord::failed(
                    next.url.as_str(),
                    sequence,
                    e.status(),
                    elapsed_ms,
                    e.to_string(),
                ));
            }

            if let Some(progress) = &self.progress {
                progress(CrawlProgress {
                    url: next.url.to_string(),
                    fetched: session.page_count(),
                    failed: session.failures.len(),
                    pending: frontier.pending_count(),
                    max_pages,
                });
            }

            if attempts % self.config.summary_interval.max(1) == 0 {
                store.write_summary(&session.summary()).await?;
            }
        }

        if completed {
            frontier.discard_pending();
        }
        session.finish(completed, frontier.discarded_count());
        store.write_summary(&session.summary()).await?;

        info!(
            pages = session.page_count(),
            errors = session.failures.len(),
            discarded = session.discarded,
            completed,
            "crawl finished"
        );
        Ok(session)
    }

    async fn fetch_with_retry(
        &self,
        url: &Url,
        limiter: Option<&DefaultDirectRateLimiter>,
    ) -> Result<FetchedPage, CrawlError> {
        let mut retries = 0;
        loop {
            if let Some(limiter) = limiter {
                limiter.until_ready().await;
            }
            match self.fetcher.fetch(url).await {
                Err(e) if e.is_retryable() && retries < self.config.fetch_retries => {
                    retries += 1;
                    debug!(url = %url, error = %e, retries, "retrying fetch");
                }
                result => return result,
            }
        }
    }

    /// Extract, persist and expand one fetched page
    #[allow(clippy::too_many_arguments)]
    async fn handle_page(
        &self,
        fetched: FetchedPage,
        requested: &Url,
        depth: u32,
        sequence: usize,
        frontier: &mut Frontier,
        session: &mut CrawlSession,
        store: &mut SessionStore,
    ) -> Result<(), CrawlError> {
        let final_url = normalize_url(&fetched.url);
        let log = |status, outcome: &'static str| FetchLogEntry {
            url: requested.as_str(),
            status,
            duration_ms: fetched.elapsed.as_millis() as u64,
            outcome,
        };

        if !frontier.is_internal(&final_url) {
            info!(url = %requested, target = %final_url, "redirect leaves the site, skipping");
            store.append_log(&log(fetched.status, "skipped: off-domain redirect")).await?;
            frontier.mark(requested, UrlStatus::Skipped);
            return Ok(());
        }

        if final_url != *requested && frontier.status(&final_url) == Some(UrlStatus::Fetched) {
            debug!(url = %requested, target = %final_url, "redirect to an already fetched page");
            store.append_log(&log(fetched.status, "skipped: duplicate redirect target")).await?;
            frontier.mark(requested, UrlStatus::Skipped);
            return Ok(());
        }

        let extracted = extract_page(&fetched, &session.domain, sequence)?;
        let mut record = extracted.record;
        record.url = final_url.to_string();

        let file_name = store.write_page(&record).await?;
        store.append_log(&log(fetched.status, "ok")).await?;

        frontier.mark(requested, UrlStatus::Fetched);
        if final_url != *requested {
            frontier.mark_alias(&final_url);
        }
        for link in &extracted.discovered {
            frontier.enqueue(link, depth + 1);
        }

        debug!(url = %record.url, language = %record.language, file = %file_name, "page stored");
        session.add_page(record, file_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::storage::{SUMMARY_FILE, load_session_dir};
    use crate::crawler::{Language, SessionSummary};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MockFetcher {
        pages: HashMap<String, String>,
        statuses: HashMap<String, u16>,
        redirects: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
        unresolvable: bool,
    }

    impl MockFetcher {
        fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        fn status(mut self, url: &str, status: u16) -> Self {
            self.statuses.insert(url.to_string(), status);
            self
        }

        fn redirect(mut self, from: &str, to: &str) -> Self {
            self.redirects.insert(from.to_string(), to.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Fetcher for MockFetcher {
        async fn fetch(&self, url: &Url) -> Result<FetchedPage, CrawlError> {
            self.calls.lock().unwrap().push(url.to_string());
            if let Some(status) = self.statuses.get(url.as_str()) {
                return Err(CrawlError::HttpStatus(*status));
            }
            let final_url = self
                .redirects
                .get(url.as_str())
                .map(|to| Url::parse(to).unwrap())
                .unwrap_or_else(|| url.clone());
            let body = self
                .pages
                .get(final_url.as_str())
                .ok_or_else(|| CrawlError::HttpStatus(404))?;
            Ok(FetchedPage {
                url: final_url,
                status: 200,
                content_type: Some("text/html".to_string()),
                headers: HashMap::new(),
                body: body.clone(),
                elapsed: Duration::from_millis(5),
            })
        }

        async fn check_seed(&self, seed: &Url) -> Result<(), CrawlError> {
            if self.unresolvable {
                Err(CrawlError::UnresolvableHost(seed.host_str().unwrap_or_default().to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn html(title: &str, links: &[&str]) -> String {
        let anchors: String = links
            .iter()
            .map(|href| format!("<a href=\"{}\">{}</a>", href, href))
            .collect();
        format!(
            "<html lang=\"en\"><head><title>{}</title></head><body><h1>{}</h1><p>The shop and the studio are open for visitors.</p>{}</body></html>",
            title, title, anchors
        )
    }

    fn config(dir: &TempDir) -> CrawlerConfig {
        CrawlerConfig::builder()
            .delay_ms(0)
            .summary_interval(1)
            .output_dir(dir.path())
            .build()
    }

    fn three_page_site() -> MockFetcher {
        MockFetcher::default()
            .page(
                "https://example.com/",
                &html("Home", &["/a", "/b", "/d", "https://elsewhere.org/"]),
            )
            .page("https://example.com/a", &html("A", &["/d", "https://elsewhere.org/a"]))
            .page("https://example.com/b", &html("B", &["/d", "https://elsewhere.org/b"]))
            .page("https://example.com/d", &html("D", &[]))
    }

    #[tokio::test]
    async fn test_three_page_limit_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let crawler = Crawler::new(three_page_site(), config(&tmp));

        let session = crawler.run("https://example.com", 3).await.unwrap();

        assert_eq!(session.page_count(), 3);
        assert!(session.completed);
        assert_eq!(session.discarded, 1);
        assert_eq!(
            crawler.fetcher.calls(),
            vec!["https://example.com/", "https://example.com/a", "https://example.com/b"]
        );

        let dir = session.output_dir.clone().unwrap();
        let loaded = load_session_dir(&dir, None).await.unwrap();
        assert_eq!(loaded.pages.len(), 3);
        assert!(loaded.pages.iter().all(|p| !p.url.contains("elsewhere.org")));
        assert!(loaded.pages.iter().all(|p| p.url != "https://example.com/d"));
        assert!(loaded.pages.iter().all(|p| p.language == Language::En));

        let summary: SessionSummary =
            serde_json::from_str(&std::fs::read_to_string(dir.join(SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(summary.total_pages, 3);
        assert_eq!(summary.languages.values().map(|l| l.pages).sum::<usize>(), 3);
        assert_eq!(summary.discarded_urls, 1);
    }

    #[tokio::test]
    async fn test_failed_pages_become_stubs() {
        let tmp = TempDir::new().unwrap();
        let fetcher = three_page_site().status("https://example.com/a", 500);
        let crawler = Crawler::new(fetcher, config(&tmp));

        let session = crawler.run("https://example.com/", 10).await.unwrap();

        assert_eq!(session.page_count(), 3);
        assert_eq!(session.failures.len(), 1);
        assert_eq!(session.failures[0].status, 500);
        assert!(session.failures[0].is_failed());

        let summary = session.summary();
        assert_eq!(summary.error_count, 1);

        let log = std::fs::read_to_string(session.output_dir.unwrap().join("crawl.log")).unwrap();
        assert_eq!(log.lines().count(), 4);
        assert!(log.contains("https://example.com/a\t500"));
    }

    #[tokio::test]
    async fn test_duplicate_links_fetched_once() {
        let tmp = TempDir::new().unwrap();
        let fetcher = MockFetcher::default()
            .page("https://example.com/", &html("Home", &["/a", "/a/", "/a#top", "/a?utm_source=x"]))
            .page("https://example.com/a", &html("A", &["/"]));
        let crawler = Crawler::new(fetcher, config(&tmp));

        let session = crawler.run("https://example.com/", 10).await.unwrap();

        assert_eq!(session.page_count(), 2);
        let calls = crawler.fetcher.calls();
        assert_eq!(calls.iter().filter(|c| c.ends_with("/a")).count(), 1);
    }

    #[tokio::test]
    async fn test_redirect_to_fetched_page_is_not_stored_twice() {
        let tmp = TempDir::new().unwrap();
        let fetcher = MockFetcher::default()
            .page("https://example.com/", &html("Home", &["/old"]))
            .redirect("https://example.com/old", "https://example.com/");
        let crawler = Crawler::new(fetcher, config(&tmp));

        let session = crawler.run("https://example.com/", 10).await.unwrap();

        assert_eq!(session.page_count(), 1);
        assert!(session.failures.is_empty());
    }

    #[tokio::test]
    async fn test_off_domain_redirect_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let fetcher = MockFetcher::default()
            .page("https://example.com/", &html("Home", &["/old"]))
            .page("https://elsewhere.org/", &html("Elsewhere", &["https://elsewhere.org/more"]))
            .redirect("https://example.com/old", "https://elsewhere.org/");
        let crawler = Crawler::new(fetcher, config(&tmp));

        let session = crawler.run("https://example.com/", 10).await.unwrap();

        let stored: Vec<&str> = session.all_pages().iter().map(|p| p.url.as_str()).collect();
        assert_eq!(stored, vec!["https://example.com/"]);
        assert!(session.failures.is_empty());
        assert!(crawler.fetcher.calls().iter().all(|c| !c.contains("elsewhere.org/more")));

        let log = std::fs::read_to_string(session.output_dir.unwrap().join("crawl.log")).unwrap();
        assert!(log.contains("https://example.com/old\t200\t"));
        assert!(log.contains("skipped: off-domain redirect"));
    }

    #[tokio::test]
    async fn test_unresolvable_seed_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let fetcher = MockFetcher {
            unresolvable: true,
            ..Default::default()
        };
        let crawler = Crawler::new(fetcher, config(&tmp));

        let err = crawler.run("https://nowhere.invalid/", 5).await.unwrap_err();
        assert!(matches!(err, CrawlError::UnresolvableHost(_)));
        assert!(crawler.fetcher.calls().is_empty());
        assert!(!tmp.path().join("nowhere.invalid").exists());
    }

    #[tokio::test]
    async fn test_invalid_seed_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let crawler = Crawler::new(MockFetcher::default(), config(&tmp));
        assert!(matches!(
            crawler.run("not a url", 5).await,
            Err(CrawlError::InvalidUrl(_))
        ));
        assert!(crawler.run("ftp://example.com/", 5).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_signal_flushes_partial_summary() {
        let tmp = TempDir::new().unwrap();
        let stop = StopSignal::new();
        let trigger = stop.clone();
        let crawler = Crawler::new(three_page_site(), config(&tmp))
            .with_stop_signal(stop)
            .with_progress_callback(Arc::new(move |progress: CrawlProgress| {
                if progress.fetched == 1 {
                    trigger.stop();
                }
            }));

        let session = crawler.run("https://example.com/", 10).await.unwrap();

        assert_eq!(session.page_count(), 1);
        assert!(!session.completed);
        let dir = session.output_dir.unwrap();
        let summary: SessionSummary =
            serde_json::from_str(&std::fs::read_to_string(dir.join(SUMMARY_FILE)).unwrap()).unwrap();
        assert!(!summary.completed);
        assert_eq!(summary.total_pages, 1);
    }
}
