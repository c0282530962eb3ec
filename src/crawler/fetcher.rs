//! HTTP fetching behind a mockable seam

use super::config::CrawlerConfig;
use super::error::CrawlError;
use reqwest::Client;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use url::Url;

/// A successful HTTP response ready for extraction
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    /// Response headers with lower-cased names
    pub headers: HashMap<String, String>,
    pub body: String,
    pub elapsed: Duration,
}

/// Largest response body read into memory
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

fn is_html_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml+xml")
        })
        .unwrap_or(false)
}

impl FetchedPage {
    pub fn is_html(&self) -> bool {
        is_html_content_type(self.content_type.as_deref())
    }
}

/// Source of pages for the crawler
///
/// Implementations return [`CrawlError::HttpStatus`] for 4xx/5xx responses.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<FetchedPage, CrawlError>> + Send;

    /// Validate the seed before the crawl starts; failure is fatal
    fn check_seed(&self, _seed: &Url) -> impl Future<Output = Result<(), CrawlError>> + Send {
        async { Ok(()) }
    }
}

/// reqwest-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| CrawlError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout_secs: config.timeout_secs,
        })
    }

    fn classify(&self, err: reqwest::Error) -> CrawlError {
        if err.is_timeout() {
            CrawlError::Timeout(self.timeout_secs)
        } else {
            CrawlError::from(err)
        }
    }
}

impl Fetcher for HttpFetcher {
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, CrawlError> {
        let start = Instant::now();
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            debug!(status = status.as_u16(), "error status");
            return Err(CrawlError::HttpStatus(status.as_u16()));
        }

        let final_url = response.url().clone();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let content_type = headers.get("content-type").cloned();

        // Non-HTML bodies are never downloaded
        if !is_html_content_type(content_type.as_deref()) {
            debug!(content_type = ?content_type, "not html, body skipped");
            return Err(CrawlError::NotHtml(
                content_type.unwrap_or_else(|| "missing content type".to_string()),
            ));
        }
        if response.content_length().is_some_and(|length| length > MAX_BODY_BYTES as u64) {
            return Err(CrawlError::BodyTooLarge(MAX_BODY_BYTES));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
            if bytes.len() + chunk.len() > MAX_BODY_BYTES {
                debug!(read = bytes.len(), "body exceeds the size cap");
                return Err(CrawlError::BodyTooLarge(MAX_BODY_BYTES));
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes).into_owned();

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            content_type,
            headers,
            body,
            elapsed: start.elapsed(),
        })
    }

    async fn check_seed(&self, seed: &Url) -> Result<(), CrawlError> {
        let host = seed
            .host_str()
            .ok_or_else(|| CrawlError::UnresolvableHost(seed.to_string()))?;
        let port = seed.port_or_known_default().unwrap_or(80);

        let mut addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| CrawlError::UnresolvableHost(format!("{}: {}", host, e)))?;
        if addrs.next().is_none() {
            return Err(CrawlError::UnresolvableHost(host.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&CrawlerConfig::builder().timeout_secs(5).build()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_html_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/about")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_header("X-Frame-Options", "DENY")
            .with_body("<html><title>About</title></html>")
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/about", server.url())).unwrap();
        let page = fetcher().fetch(&url).await.unwrap();

        mock.assert_async().await;
        assert_eq!(page.status, 200);
        assert!(page.is_html());
        assert_eq!(page.headers.get("x-frame-options").map(String::as_str), Some("DENY"));
        assert!(page.body.contains("<title>About</title>"));
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/missing", server.url())).unwrap();
        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, CrawlError::HttpStatus(404)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_fetch_follows_redirects() {
        let mut server = mockito::Server::new_async().await;
        let _old = server
            .mock("GET", "/old")
            .with_status(301)
            .with_header("location", "/new")
            .create_async()
            .await;
        let _new = server
            .mock("GET", "/new")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html></html>")
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/old", server.url())).unwrap();
        let page = fetcher().fetch(&url).await.unwrap();
        assert_eq!(page.url.path(), "/new");
    }

    #[tokio::test]
    async fn test_non_html_body_is_not_downloaded() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/brochure.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(vec![0u8; 1024])
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/brochure.pdf", server.url())).unwrap();
        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(&err, CrawlError::NotHtml(ct) if ct == "application/pdf"));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/huge")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("a".repeat(MAX_BODY_BYTES + 1))
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/huge", server.url())).unwrap();
        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, CrawlError::BodyTooLarge(MAX_BODY_BYTES)));
        assert!(err.is_recoverable());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_check_seed_rejects_unresolvable_host() {
        let seed = Url::parse("https://does-not-exist.invalid/").unwrap();
        let err = fetcher().check_seed(&seed).await.unwrap_err();
        assert!(matches!(err, CrawlError::UnresolvableHost(_)));
        assert!(!err.is_recoverable());
    }
}
