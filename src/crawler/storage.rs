//! On-disk crawl session layout
//!
//! ```text
//! <output>/<domain>/<timestamp>/
//!     _summary.json
//!     crawl.log
//!     <lang>/<slug>.json
//! ```
//!
//! Page files are written as soon as a page is extracted, the summary is
//! rewritten periodically and `crawl.log` receives one tab separated line per
//! fetch attempt.

use super::language::{DetectionInput, Language, detect_language};
use super::session::SessionSummary;
use super::PageRecord;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

pub const SUMMARY_FILE: &str = "_summary.json";
pub const LOG_FILE: &str = "crawl.log";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const MAX_SLUG_LEN: usize = 95;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for crate::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => crate::Error::Io(e),
            other => crate::Error::Storage(other.to_string()),
        }
    }
}

type Result<T> = std::result::Result<T, StorageError>;

/// File name for a page URL, `homepage.json` for the site root
pub fn page_slug(url: &Url) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    static REPEATED: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r"[^\w\-.]").expect("valid slug regex"));
    let repeated = REPEATED.get_or_init(|| Regex::new(r"_+").expect("valid slug regex"));

    let path = url.path().trim_matches('/');
    if path.is_empty() {
        return "homepage.json".to_string();
    }

    let flat = path.replace('/', "_");
    let safe = unsafe_chars.replace_all(&flat, "_");
    let mut slug = repeated.replace_all(&safe, "_").into_owned();
    if slug.chars().count() > MAX_SLUG_LEN {
        slug = slug.chars().take(MAX_SLUG_LEN).collect();
    }
    format!("{}.json", slug)
}

/// One line of `crawl.log`
#[derive(Debug, Clone)]
pub struct FetchLogEntry<'a> {
    pub url: &'a str,
    pub status: u16,
    pub duration_ms: u64,
    /// `ok`, `skipped` or the failure description
    pub outcome: &'a str,
}

/// Writer for one crawl session directory
#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    used: HashSet<(Language, String)>,
}

impl SessionStore {
    /// Create `<base>/<domain>/<timestamp>` for a new session
    pub async fn create(base: &Path, domain: &str, started_at: DateTime<Utc>) -> Result<Self> {
        let dir = base
            .join(domain)
            .join(started_at.format(TIMESTAMP_FORMAT).to_string());
        fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "session directory created");
        Ok(Self {
            dir,
            used: HashSet::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a page record under its language directory, returning the file name
    pub async fn write_page(&mut self, record: &PageRecord) -> Result<String> {
        let url = Url::parse(&record.url)
            .map_err(|e| StorageError::NotFound(format!("unparseable page URL {}: {}", record.url, e)))?;
        let base = page_slug(&url);

        let mut file_name = base.clone();
        let mut suffix = 2;
        while self.used.contains(&(record.language, file_name.clone())) {
            file_name = format!("{}-{}.json", base.trim_end_matches(".json"), suffix);
            suffix += 1;
        }

        let lang_dir = self.dir.join(record.language.code());
        fs::create_dir_all(&lang_dir).await?;
        let path = lang_dir.join(&file_name);
        let json = serde_json::to_string_pretty(record).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).await?;

        self.used.insert((record.language, file_name.clone()));
        Ok(file_name)
    }

    /// Rewrite `_summary.json`
    pub async fn write_summary(&self, summary: &SessionSummary) -> Result<()> {
        let path = self.dir.join(SUMMARY_FILE);
        let json = serde_json::to_string_pretty(summary).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(path, json).await?;
        Ok(())
    }

    /// Append one fetch attempt to `crawl.log`
    pub async fn append_log(&self, entry: &FetchLogEntry<'_>) -> Result<()> {
        let line = format!(
            "{}\t{}\t{}\t{}ms\t{}\n",
            Utc::now().to_rfc3339(),
            entry.url,
            entry.status,
            entry.duration_ms,
            entry.outcome.replace(['\n', '\t'], " "),
        );
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(LOG_FILE))
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

/// A session read back from disk
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub dir: PathBuf,
    pub summary: Option<SessionSummary>,
    /// Page records sorted by crawl sequence
    pub pages: Vec<PageRecord>,
    /// Language the pages were restricted to
    pub language: Option<Language>,
}

impl LoadedSession {
    /// Page records followed by stubs for the failed fetches of the summary
    ///
    /// A failed fetch has no content, so its language comes from the URL
    /// alone. With a language restriction only stubs whose URL names that
    /// language are kept.
    pub fn audit_records(&self) -> Vec<PageRecord> {
        let mut records = self.pages.clone();
        let failures = self.summary.iter().flat_map(|s| s.errors.iter());
        let mut sequence = self.pages.iter().map(|p| p.sequence + 1).max().unwrap_or(0);
        for failed in failures {
            let language = Url::parse(&failed.url)
                .map(|url| {
                    detect_language(&DetectionInput {
                        lang_attribute: None,
                        url: &url,
                        text: "",
                    })
                })
                .unwrap_or(Language::Other);
            if self.language.is_some_and(|wanted| wanted != language) {
                continue;
            }
            let mut stub = PageRecord::failed(
                failed.url.as_str(),
                sequence,
                failed.status,
                0,
                failed.error.as_str(),
            );
            stub.language = language;
            records.push(stub);
            sequence += 1;
        }
        records
    }
}

/// Read a single page record file
pub async fn load_page_file(path: &Path) -> Result<PageRecord> {
    if !fs::try_exists(path).await? {
        return Err(StorageError::NotFound(path.display().to_string()));
    }
    let json = fs::read_to_string(path).await?;
    serde_json::from_str(&json).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Languages with a page directory in the session
pub async fn available_languages(dir: &Path) -> Result<Vec<Language>> {
    let mut languages = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if let Some(lang) = entry.file_name().to_str().and_then(|n| n.parse::<Language>().ok()) {
            languages.push(lang);
        }
    }
    languages.sort();
    Ok(languages)
}

/// Read a session directory, optionally restricted to one language
///
/// Unreadable page files are logged and skipped.
pub async fn load_session_dir(dir: &Path, language: Option<Language>) -> Result<LoadedSession> {
    if !fs::try_exists(dir).await? {
        return Err(StorageError::NotFound(dir.display().to_string()));
    }

    let summary_path = dir.join(SUMMARY_FILE);
    let summary = if fs::try_exists(&summary_path).await? {
        let json = fs::read_to_string(&summary_path).await?;
        match serde_json::from_str(&json) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(path = %summary_path.display(), error = %e, "ignoring unreadable summary");
                None
            }
        }
    } else {
        None
    };

    let languages = match language {
        Some(lang) => vec![lang],
        None => available_languages(dir).await?,
    };

    let mut pages = Vec::new();
    for lang in languages {
        let lang_dir = dir.join(lang.code());
        if !fs::try_exists(&lang_dir).await? {
            continue;
        }
        let mut entries = fs::read_dir(&lang_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match load_page_file(&path).await {
                Ok(page) => pages.push(page),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping page file"),
            }
        }
    }
    pages.sort_by_key(|p| p.sequence);

    Ok(LoadedSession {
        dir: dir.to_path_buf(),
        summary,
        pages,
        language,
    })
}
