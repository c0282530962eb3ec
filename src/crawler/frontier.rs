//! URL frontier with normalization, scope checks and deduplication
//!
//! The frontier owns every URL discovered during a crawl session. URLs are
//! normalized before they are used as keys, so two spellings of the same page
//! are fetched at most once. Pending URLs are handed out breadth-first.

use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace};
use url::{Url, form_urlencoded};

/// Query parameters that never change page content
pub const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "_ga"];

/// Static assets that are never worth fetching as pages
pub const SKIP_EXTENSIONS: &[&str] = &[
    ".pdf", ".zip", ".tar", ".gz", ".rar", ".7z", ".png", ".jpg", ".jpeg", ".gif", ".svg",
    ".webp", ".ico", ".bmp", ".css", ".js", ".woff", ".woff2", ".ttf", ".eot", ".xml", ".json",
    ".txt", ".rss", ".atom", ".mp3", ".mp4", ".avi", ".mov", ".doc", ".docx", ".xls", ".xlsx",
    ".ppt", ".pptx", ".exe", ".dmg",
];

/// Lifecycle of a frontier entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlStatus {
    Pending,
    Fetched,
    Failed,
    Skipped,
}

/// A URL known to the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    pub url: Url,
    pub depth: u32,
    pub status: UrlStatus,
}

/// Outcome of [`Frontier::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Added,
    Duplicate,
    /// Host outside the seed's site
    OutOfScope,
    /// Non-HTTP scheme or static asset
    Unsupported,
    /// Deeper than the configured maximum depth
    TooDeep,
}

/// Normalize a URL into its deduplication key form
///
/// Lower-cases scheme and host, strips default ports, fragments, tracking
/// parameters, duplicate slashes and a trailing slash on non-root paths.
/// Normalizing an already normalized URL returns it unchanged.
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    if let Some(host) = normalized.host_str() {
        let lower = host.to_ascii_lowercase();
        // Host case only differs for non-special schemes
        if lower != host {
            if let Err(e) = normalized.set_host(Some(&lower)) {
                trace!(url = %url, error = %e, "host left as is");
            }
        }
    }
    if normalized.port().is_some()
        && normalized.port() == default_port(normalized.scheme())
        && normalized.set_port(None).is_err()
    {
        trace!(url = %url, "port left as is");
    }

    let mut path = String::with_capacity(normalized.path().len());
    for c in normalized.path().chars() {
        if c == '/' && path.ends_with('/') {
            continue;
        }
        path.push(c);
    }
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path.is_empty() {
        path.push('/');
    }
    normalized.set_path(&path);

    // Segments are kept verbatim so `?flag` does not turn into `?flag=`
    if let Some(query) = normalized.query().map(str::to_owned) {
        let kept = query
            .split('&')
            .filter(|segment| !segment.is_empty())
            .filter(|segment| {
                form_urlencoded::parse(segment.as_bytes())
                    .next()
                    .is_none_or(|(key, _)| !is_tracking_param(&key))
            })
            .collect::<Vec<_>>()
            .join("&");
        normalized.set_query((!kept.is_empty()).then_some(kept.as_str()));
    }

    normalized
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Strip a leading `www.` so `www.example.com` and `example.com` share a site
fn base_host(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Whether `host` belongs to the site rooted at `seed_host`
pub fn in_scope(host: &str, seed_host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let seed = seed_host.to_ascii_lowercase();
    let base = base_host(&seed);
    let candidate = base_host(&host);
    candidate == base || candidate.ends_with(&format!(".{}", base))
}

/// Whether a URL can be fetched as an HTML page at all
pub fn is_crawlable(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let path = url.path().to_ascii_lowercase();
    !SKIP_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Breadth-first frontier for one crawl session
#[derive(Debug)]
pub struct Frontier {
    seed_host: String,
    max_pages: usize,
    max_depth: Option<u32>,
    queue: VecDeque<String>,
    records: HashMap<String, UrlRecord>,
    fetched: usize,
    discarded: usize,
}

impl Frontier {
    /// Create a frontier scoped to the seed's site
    pub fn new(seed: &Url, max_pages: usize) -> Self {
        Self {
            seed_host: seed.host_str().unwrap_or_default().to_ascii_lowercase(),
            max_pages,
            max_depth: None,
            queue: VecDeque::new(),
            records: HashMap::new(),
            fetched: 0,
            discarded: 0,
        }
    }

    /// Limit discovery depth; the seed is depth 0
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Whether a URL belongs to the crawled site
    pub fn is_internal(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| in_scope(host, &self.seed_host))
            .unwrap_or(false)
    }

    /// Add a candidate URL discovered at `depth`
    pub fn enqueue(&mut self, url: &Url, depth: u32) -> Enqueue {
        let url = normalize_url(url);
        let key = url.to_string();

        if self.records.contains_key(&key) {
            return Enqueue::Duplicate;
        }
        if !matches!(url.scheme(), "http" | "https") {
            return Enqueue::Unsupported;
        }
        if !self.is_internal(&url) {
            trace!(url = %url, "out of scope");
            return Enqueue::OutOfScope;
        }
        if let Some(max_depth) = self.max_depth {
            if depth > max_depth {
                return Enqueue::TooDeep;
            }
        }
        if !is_crawlable(&url) {
            self.records.insert(
                key,
                UrlRecord {
                    url,
                    depth,
                    status: UrlStatus::Skipped,
                },
            );
            return Enqueue::Unsupported;
        }

        debug!(url = %url, depth, "enqueued");
        self.queue.push_back(key.clone());
        self.records.insert(
            key,
            UrlRecord {
                url,
                depth,
                status: UrlStatus::Pending,
            },
        );
        Enqueue::Added
    }

    /// Next URL to fetch, or `None` once the frontier is exhausted
    ///
    /// Reaching the page limit discards every URL still pending.
    pub fn next(&mut self) -> Option<UrlRecord> {
        if self.limit_reached() {
            self.discard_pending();
            return None;
        }
        while let Some(key) = self.queue.pop_front() {
            if let Some(record) = self.records.get(&key) {
                if record.status == UrlStatus::Pending {
                    return Some(record.clone());
                }
            }
        }
        None
    }

    /// Record the outcome of a fetch
    pub fn mark(&mut self, url: &Url, outcome: UrlStatus) {
        let url = normalize_url(url);
        let key = url.to_string();
        let depth = self.records.get(&key).map(|r| r.depth).unwrap_or_default();
        let previous = self.records.insert(
            key,
            UrlRecord {
                url,
                depth,
                status: outcome,
            },
        );
        if outcome == UrlStatus::Fetched
            && previous.map(|r| r.status) != Some(UrlStatus::Fetched)
        {
            self.fetched += 1;
        }
    }

    /// Record a redirect target as fetched without counting it twice
    pub fn mark_alias(&mut self, url: &Url) {
        let url = normalize_url(url);
        let key = url.to_string();
        let depth = self.records.get(&key).map(|r| r.depth).unwrap_or_default();
        self.records.insert(
            key,
            UrlRecord {
                url,
                depth,
                status: UrlStatus::Fetched,
            },
        );
    }

    /// Status of a URL, if the frontier has seen it
    pub fn status(&self, url: &Url) -> Option<UrlStatus> {
        self.records
            .get(normalize_url(url).as_str())
            .map(|r| r.status)
    }

    pub fn limit_reached(&self) -> bool {
        self.fetched >= self.max_pages
    }

    pub fn fetched_count(&self) -> usize {
        self.fetched
    }

    pub fn pending_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.status == UrlStatus::Pending)
            .count()
    }

    /// URLs dropped because the page limit was reached first
    pub fn discarded_count(&self) -> usize {
        self.discarded
    }

    /// Drop every pending URL; they are not retried later
    pub fn discard_pending(&mut self) {
        for key in self.queue.drain(..) {
            if let Some(record) = self.records.get_mut(&key) {
                if record.status == UrlStatus::Pending {
                    record.status = UrlStatus::Skipped;
                    self.discarded += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_normalize_variants_collapse() {
        let expected = "https://example.com/blog/post";
        for variant in [
            "https://EXAMPLE.com/blog/post/",
            "https://example.com:443/blog//post",
            "https://example.com/blog/post#comments",
            "https://example.com/blog/post?utm_source=news&utm_medium=email",
            "HTTPS://example.com/blog/post?fbclid=abc",
        ] {
            assert_eq!(normalize_url(&url(variant)).as_str(), expected, "{}", variant);
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in [
            "https://example.com/",
            "https://example.com",
            "http://example.com:8080/a//b/?page=2&utm_campaign=x#top",
            "https://example.com/search?q=ceramic+bowls",
        ] {
            let once = normalize_url(&url(raw));
            let twice = normalize_url(&once);
            assert_eq!(once, twice, "{}", raw);
        }
    }

    #[test]
    fn test_normalize_keeps_meaningful_query() {
        let normalized = normalize_url(&url("https://example.com/list?page=2&utm_source=x"));
        assert_eq!(normalized.as_str(), "https://example.com/list?page=2");
        let flag = normalize_url(&url("https://example.com/list?preview&fbclid=1&sort=a%20b"));
        assert_eq!(flag.as_str(), "https://example.com/list?preview&sort=a%20b");
        assert_eq!(normalize_url(&flag), flag);
        let root = normalize_url(&url("http://example.com:80"));
        assert_eq!(root.as_str(), "http://example.com/");
    }

    #[test]
    fn test_scope() {
        assert!(in_scope("example.com", "example.com"));
        assert!(in_scope("www.example.com", "example.com"));
        assert!(in_scope("example.com", "www.example.com"));
        assert!(in_scope("shop.example.com", "example.com"));
        assert!(!in_scope("notexample.com", "example.com"));
        assert!(!in_scope("example.org", "example.com"));
    }

    #[test]
    fn test_enqueue_dedups_normalized_urls() {
        let seed = url("https://example.com/");
        let mut frontier = Frontier::new(&seed, 10);

        assert_eq!(frontier.enqueue(&seed, 0), Enqueue::Added);
        assert_eq!(frontier.enqueue(&url("https://EXAMPLE.com/#top"), 1), Enqueue::Duplicate);
        assert_eq!(frontier.enqueue(&url("https://example.com/about/"), 1), Enqueue::Added);
        assert_eq!(frontier.enqueue(&url("https://example.com/about"), 1), Enqueue::Duplicate);

        let mut fetched = Vec::new();
        while let Some(next) = frontier.next() {
            frontier.mark(&next.url, UrlStatus::Fetched);
            fetched.push(next.url.to_string());
        }
        assert_eq!(fetched, vec!["https://example.com/", "https://example.com/about"]);
    }

    #[test]
    fn test_enqueue_rejections() {
        let seed = url("https://example.com/");
        let mut frontier = Frontier::new(&seed, 10).with_max_depth(1);

        assert_eq!(frontier.enqueue(&url("https://other.org/"), 1), Enqueue::OutOfScope);
        assert_eq!(frontier.enqueue(&url("mailto:hi@example.com"), 1), Enqueue::Unsupported);
        assert_eq!(frontier.enqueue(&url("https://example.com/brochure.pdf"), 1), Enqueue::Unsupported);
        assert_eq!(frontier.enqueue(&url("https://example.com/deep"), 2), Enqueue::TooDeep);
        assert_eq!(frontier.status(&url("https://example.com/brochure.pdf")), Some(UrlStatus::Skipped));
        assert!(frontier.next().is_none());
    }

    #[test]
    fn test_breadth_first_order() {
        let seed = url("https://example.com/");
        let mut frontier = Frontier::new(&seed, 10);
        frontier.enqueue(&seed, 0);
        let root = frontier.next().unwrap();
        frontier.mark(&root.url, UrlStatus::Fetched);

        frontier.enqueue(&url("https://example.com/a"), 1);
        frontier.enqueue(&url("https://example.com/b"), 1);
        let a = frontier.next().unwrap();
        frontier.mark(&a.url, UrlStatus::Fetched);
        frontier.enqueue(&url("https://example.com/a/child"), 2);

        let b = frontier.next().unwrap();
        assert_eq!(b.url.path(), "/b");
        assert_eq!(b.depth, 1);
    }

    #[test]
    fn test_limit_discards_pending() {
        let seed = url("https://example.com/");
        let mut frontier = Frontier::new(&seed, 1);
        frontier.enqueue(&seed, 0);
        frontier.enqueue(&url("https://example.com/a"), 1);
        frontier.enqueue(&url("https://example.com/b"), 1);

        let first = frontier.next().unwrap();
        frontier.mark(&first.url, UrlStatus::Fetched);

        assert!(frontier.next().is_none());
        assert_eq!(frontier.discarded_count(), 2);
        assert_eq!(frontier.pending_count(), 0);
        assert_eq!(frontier.status(&url("https://example.com/a")), Some(UrlStatus::Skipped));
    }

    #[test]
    fn test_alias_blocks_refetch_without_counting() {
        let seed = url("https://example.com/");
        let mut frontier = Frontier::new(&seed, 5);
        frontier.enqueue(&seed, 0);
        frontier.enqueue(&url("https://example.com/new"), 1);

        let first = frontier.next().unwrap();
        frontier.mark(&first.url, UrlStatus::Fetched);
        frontier.mark_alias(&url("https://example.com/new"));

        assert!(frontier.next().is_none());
        assert_eq!(frontier.fetched_count(), 1);
        assert_eq!(frontier.enqueue(&url("https://example.com/new/"), 2), Enqueue::Duplicate);
    }

    #[test]
    fn test_failures_do_not_count_toward_limit() {
        let seed = url("https://example.com/");
        let mut frontier = Frontier::new(&seed, 1);
        frontier.enqueue(&seed, 0);
        frontier.enqueue(&url("https://example.com/a"), 1);

        let first = frontier.next().unwrap();
        frontier.mark(&first.url, UrlStatus::Failed);
        let second = frontier.next().unwrap();
        assert_eq!(second.url.path(), "/a");
    }
}
