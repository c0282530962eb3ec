//! # Audit Invocation Settings
//!
//! `AuditOptions` carries the raw settings of one audit run as they come from
//! the command line. [`AuditOptions::validate`] turns them into
//! [`AuditSettings`] before any page is loaded or any model is called, so a
//! missing API key or a language that was never crawled fails fast.
//!
//! ## Rules
//!
//! - the audit path must exist; a file means a single-page audit
//! - the language must be one of the supported codes and, for a session
//!   directory, must have been crawled
//! - the cloud provider needs an API key, falling back to `OPENAI_API_KEY`

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::context::{AuditMode, ContextBudget, ContextConfig};
use crate::crawler::{Language, StorageError};
use crate::crawler::storage::available_languages;
use crate::error::Error as CrateError;
use crate::model::health::{ModelAvailability, HealthError, check_cloud, check_local};
use crate::model::{
    DEFAULT_CLOUD_MODEL, DEFAULT_CLOUD_URL, DEFAULT_LOCAL_MODEL, DEFAULT_LOCAL_URL, ProviderKind,
};
use crate::report::GeneratorConfig;

/// Environment variable consulted when no cloud API key is given
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the cloud provider needs an API key (--api-key or {API_KEY_ENV})")]
    MissingCredential,

    #[error("{0}")]
    UnsupportedLanguage(String),

    #[error("no pages in language '{language}' (crawled: {})", crawled.join(", "))]
    LanguageNotCrawled { language: Language, crawled: Vec<String> },

    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("provider check failed: {0}")]
    UnreachableProvider(#[from] HealthError),

    #[error("invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ConfigError> for CrateError {
    fn from(err: ConfigError) -> Self {
        CrateError::Config(err.to_string())
    }
}

/// Completion backend of an audit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    Local {
        url: String,
        model: String,
    },
    Cloud {
        api_key: String,
        base_url: String,
        model: String,
    },
}

impl ProviderConfig {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderConfig::Local { .. } => ProviderKind::Local,
            ProviderConfig::Cloud { .. } => ProviderKind::Cloud,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::Local { model, .. } | ProviderConfig::Cloud { model, .. } => model,
        }
    }

    fn with_model(mut self, replacement: String) -> Self {
        match &mut self {
            ProviderConfig::Local { model, .. } | ProviderConfig::Cloud { model, .. } => {
                *model = replacement;
            }
        }
        self
    }

    /// Check the provider and switch to the fallback model it offers
    #[instrument(skip_all, fields(provider = %self.kind(), model = self.model()))]
    pub async fn check(self, http: &reqwest::Client) -> Result<Self, ConfigError> {
        let availability = match &self {
            ProviderConfig::Local { url, model } => check_local(http, url, model).await?,
            ProviderConfig::Cloud {
                api_key,
                base_url,
                model,
            } => check_cloud(http, base_url, api_key, model).await?,
        };
        Ok(match availability {
            ModelAvailability::Listed => self,
            ModelAvailability::Fallback(model) => {
                info!(fallback = %model, "using fallback model");
                self.with_model(model)
            }
        })
    }
}

/// What an audit reads its pages from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditSource {
    /// A crawl session directory
    Session(PathBuf),
    /// A single page record file
    Page(PathBuf),
}

impl AuditSource {
    pub fn path(&self) -> &Path {
        match self {
            AuditSource::Session(path) | AuditSource::Page(path) => path,
        }
    }
}

/// Raw settings of one audit run
#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub path: PathBuf,
    pub mode: AuditMode,
    /// Language code, `None` for all crawled languages
    pub language: Option<String>,
    pub provider: ProviderKind,
    /// Model name, `None` for the provider default
    pub model: Option<String>,
    pub local_url: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub output: Option<PathBuf>,
    pub budget_bytes: Option<usize>,
    pub chunk_bytes: Option<usize>,
    pub page_cap: Option<usize>,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            mode: AuditMode::Full,
            language: None,
            provider: ProviderKind::Local,
            model: None,
            local_url: DEFAULT_LOCAL_URL.to_string(),
            api_key: None,
            base_url: DEFAULT_CLOUD_URL.to_string(),
            timeout_secs: GeneratorConfig::default().timeout.as_secs(),
            output: None,
            budget_bytes: None,
            chunk_bytes: None,
            page_cap: None,
        }
    }
}

/// Validated settings of one audit run
#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub source: AuditSource,
    pub mode: AuditMode,
    pub language: Option<Language>,
    pub provider: ProviderConfig,
    pub budget: ContextBudget,
    pub context: ContextConfig,
    pub generator: GeneratorConfig,
    pub output: Option<PathBuf>,
}

impl AuditOptions {
    /// Validate against the filesystem and the process environment
    pub async fn validate(self) -> Result<AuditSettings, ConfigError> {
        let env_key = std::env::var(API_KEY_ENV).ok();
        self.validate_with_key(env_key).await
    }

    /// Validate with `env_key` standing in for the environment variable
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn validate_with_key(
        self,
        env_key: Option<String>,
    ) -> Result<AuditSettings, ConfigError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|_| ConfigError::PathNotFound(self.path.clone()))?;

        let language = self
            .language
            .as_deref()
            .map(|code| code.parse::<Language>().map_err(ConfigError::UnsupportedLanguage))
            .transpose()?;

        let (source, mode) = if metadata.is_file() {
            (AuditSource::Page(self.path.clone()), AuditMode::Single)
        } else {
            if self.mode == AuditMode::Single {
                return Err(ConfigError::Invalid {
                    field: "mode",
                    message: "single mode needs a page file, not a session directory".to_string(),
                });
            }
            if let Some(language) = language {
                let crawled = available_languages(&self.path).await?;
                if !crawled.contains(&language) {
                    return Err(ConfigError::LanguageNotCrawled {
                        language,
                        crawled: crawled.iter().map(|l| l.code().to_string()).collect(),
                    });
                }
            }
            (AuditSource::Session(self.path.clone()), self.mode)
        };

        let provider = match self.provider {
            ProviderKind::Local => ProviderConfig::Local {
                url: self.local_url.trim_end_matches('/').to_string(),
                model: self.model.unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string()),
            },
            ProviderKind::Cloud => {
                let api_key = self
                    .api_key
                    .or(env_key)
                    .filter(|key| !key.trim().is_empty())
                    .ok_or(ConfigError::MissingCredential)?;
                ProviderConfig::Cloud {
                    api_key,
                    base_url: self.base_url.trim_end_matches('/').to_string(),
                    model: self.model.unwrap_or_else(|| DEFAULT_CLOUD_MODEL.to_string()),
                }
            }
        };

        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout",
                message: "must be at least one second".to_string(),
            });
        }
        let mut context = ContextConfig::builder();
        if let Some(bytes) = self.chunk_bytes {
            context = context.chunk_threshold_bytes(bytes);
        }
        if let Some(cap) = self.page_cap {
            context = context.page_detail_cap(cap);
        }
        let context = context.build();

        // without an explicit budget the primary payload may fill one chunk
        let budget = match self.budget_bytes {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    field: "budget",
                    message: "must be positive".to_string(),
                });
            }
            Some(bytes) => ContextBudget::from_bytes(bytes),
            None => ContextBudget::from_bytes(context.chunk_threshold_bytes),
        };

        let generator = GeneratorConfig::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .source(source.path().display().to_string())
            .build();

        debug!(mode = %mode, provider = %provider.kind(), model = provider.model(), "audit settings validated");
        Ok(AuditSettings {
            source,
            mode,
            language,
            provider,
            budget,
            context,
            generator,
            output: self.output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use tempfile::TempDir;

    async fn session_dir(languages: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for lang in languages {
            tokio::fs::create_dir(dir.path().join(lang)).await.unwrap();
        }
        dir
    }

    fn options(path: &Path) -> AuditOptions {
        AuditOptions {
            path: path.to_path_buf(),
            ..AuditOptions::default()
        }
    }

    #[tokio::test]
    async fn test_missing_path() {
        let err = options(Path::new("/definitely/not/here"))
            .validate_with_key(None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::PathNotFound(_)));
    }

    #[tokio::test]
    async fn test_file_implies_single_mode() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("index.json");
        tokio::fs::write(&file, "{}").await.unwrap();

        let settings = options(&file).validate_with_key(None).await.unwrap();
        assert_eq!(settings.mode, AuditMode::Single);
        assert_eq!(settings.source, AuditSource::Page(file.clone()));
        assert_eq!(settings.generator.source.as_deref(), Some(file.display().to_string().as_str()));
    }

    #[tokio::test]
    async fn test_single_mode_rejects_directory() {
        let dir = session_dir(&["en"]).await;
        let opts = AuditOptions {
            mode: AuditMode::Single,
            ..options(dir.path())
        };
        let err = opts.validate_with_key(None).await.unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "mode", .. }));
    }

    #[tokio::test]
    async fn test_language_must_be_supported_and_crawled() {
        let dir = session_dir(&["el", "en"]).await;

        let unsupported = AuditOptions {
            language: Some("jp".to_string()),
            ..options(dir.path())
        };
        let err = unsupported.validate_with_key(None).await.unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedLanguage(_)));

        let missing = AuditOptions {
            language: Some("fr".to_string()),
            ..options(dir.path())
        };
        let err = missing.validate_with_key(None).await.unwrap_err();
        assert!(err.to_string().contains("crawled: el, en"));

        let greek = AuditOptions {
            language: Some("EL".to_string()),
            ..options(dir.path())
        };
        let settings = greek.validate_with_key(None).await.unwrap();
        assert_eq!(settings.language, Some(Language::El));
        assert_eq!(settings.mode, AuditMode::Full);
    }

    #[tokio::test]
    async fn test_cloud_needs_credential_with_env_fallback() {
        let dir = session_dir(&["en"]).await;
        let cloud = AuditOptions {
            provider: ProviderKind::Cloud,
            ..options(dir.path())
        };

        let err = cloud.clone().validate_with_key(None).await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential));

        let settings = cloud
            .clone()
            .validate_with_key(Some("sk-env".to_string()))
            .await
            .unwrap();
        assert_eq!(
            settings.provider,
            ProviderConfig::Cloud {
                api_key: "sk-env".to_string(),
                base_url: DEFAULT_CLOUD_URL.to_string(),
                model: DEFAULT_CLOUD_MODEL.to_string(),
            }
        );

        let explicit = AuditOptions {
            api_key: Some("sk-flag".to_string()),
            ..cloud
        };
        let settings = explicit
            .validate_with_key(Some("sk-env".to_string()))
            .await
            .unwrap();
        assert!(matches!(settings.provider, ProviderConfig::Cloud { ref api_key, .. } if api_key == "sk-flag"));
    }

    #[tokio::test]
    async fn test_context_overrides() {
        let dir = session_dir(&["en"]).await;
        let opts = AuditOptions {
            budget_bytes: Some(9000),
            chunk_bytes: Some(3000),
            page_cap: Some(2),
            timeout_secs: 30,
            ..options(dir.path())
        };
        let settings = opts.validate_with_key(None).await.unwrap();
        assert_eq!(settings.budget.bytes(), 9000);
        assert_eq!(settings.context.chunk_threshold_bytes, 3000);
        assert_eq!(settings.context.page_detail_cap, 2);
        assert_eq!(settings.generator.timeout, Duration::from_secs(30));

        let derived = AuditOptions {
            chunk_bytes: Some(8000),
            ..options(dir.path())
        };
        let settings = derived.validate_with_key(None).await.unwrap();
        assert_eq!(settings.budget.bytes(), 8000);

        let zero = AuditOptions {
            budget_bytes: Some(0),
            ..options(dir.path())
        };
        assert!(zero.validate_with_key(None).await.is_err());
    }

    #[tokio::test]
    async fn test_check_applies_fallback_model() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"llama3.1:latest"}]}"#)
            .create_async()
            .await;

        let provider = ProviderConfig::Local {
            url: server.url(),
            model: "missing-model".to_string(),
        };
        let checked = provider.check(&reqwest::Client::new()).await.unwrap();
        assert_eq!(checked.model(), "llama3.1:latest");
        assert_eq!(checked.kind(), ProviderKind::Local);
    }

    #[tokio::test]
    async fn test_check_reports_unreachable_provider() {
        let provider = ProviderConfig::Local {
            url: "http://127.0.0.1:9".to_string(),
            model: "llama3.1".to_string(),
        };
        let err = provider.check(&reqwest::Client::new()).await.unwrap_err();
        assert!(matches!(err, ConfigError::UnreachableProvider(_)));
        assert!(CrateError::from(err).to_string().starts_with("Configuration error"));
    }
}
