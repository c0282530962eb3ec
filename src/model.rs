//! # Completion Model Module
//!
//! This module provides the completion backends used to write audit reports,
//! with built-in rate limiting so long multi-chunk audits do not flood the
//! provider.
//!
//! ## Key Components
//!
//! - `AuditClient`: a completion model plus the provider and model name it talks to
//! - `RateLimitedCompletionModel`: a wrapper that adds rate limiting to any completion model
//! - `health`: connection checks run before an audit starts
//!
//! ## Providers
//!
//! - local: an Ollama compatible model server (`rig::providers::ollama`)
//! - cloud: an OpenAI compatible API (`rig::providers::openai`) with a configurable base URL

use std::fmt;
use std::num::NonZeroU32;

use governor::{Quota, RateLimiter};
use ratelimited_completion::RateLimitedCompletionModel;
use rig::{
    completion::{AssistantContent, CompletionError, CompletionModel},
    one_or_many::OneOrMany,
    providers::{ollama, openai},
};
use tracing::{debug, instrument};

pub mod health;
#[cfg(test)]
pub mod mock_model;
pub mod ratelimited_completion;

/// Default local model server
pub const DEFAULT_LOCAL_URL: &str = "http://localhost:11434";
/// Default local model
pub const DEFAULT_LOCAL_MODEL: &str = "deepseek-coder:6.7b";
/// Default cloud API
pub const DEFAULT_CLOUD_URL: &str = "https://api.openai.com/v1";
/// Default cloud model
pub const DEFAULT_CLOUD_MODEL: &str = "gpt-3.5-turbo";

const LOCAL_REQUESTS_PER_MINUTE: u32 = 120;
const CLOUD_REQUESTS_PER_MINUTE: u32 = 60;

/// Sampling temperature of audit completions
pub const TEMPERATURE: f64 = 0.3;
/// Upper bound of generated tokens per completion
pub const MAX_TOKENS: u64 = 2000;

pub struct RateLimitResponse<T> {
    #[allow(dead_code)]
    response: T,
}

/// Which provider family a client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Local,
    Cloud,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Cloud => "cloud",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider and model shown in the report metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub provider: ProviderKind,
    pub model: String,
    pub endpoint: String,
}

impl fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.model, self.provider, self.endpoint)
    }
}

#[derive(Debug, Clone)]
pub struct AuditClient<M>
where
    M: CompletionModel,
{
    completion_model: M,
    info: ModelInfo,
}

fn limiter(per_minute: u32) -> governor::DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_minute(
        NonZeroU32::new(per_minute).expect("must create rate limit"),
    ))
}

impl AuditClient<RateLimitedCompletionModel<ollama::CompletionModel>> {
    /// Client for a local model server such as Ollama
    pub fn local(url: &str, model: &str) -> Self {
        let url = url.trim_end_matches('/');
        let client = ollama::Client::from_url(url);
        let completion_model = RateLimitedCompletionModel::new(
            client.completion_model(model),
            limiter(LOCAL_REQUESTS_PER_MINUTE),
        );
        Self::new(
            completion_model,
            ModelInfo {
                provider: ProviderKind::Local,
                model: model.to_string(),
                endpoint: url.to_string(),
            },
        )
    }
}

impl AuditClient<RateLimitedCompletionModel<openai::CompletionModel>> {
    /// Client for an OpenAI compatible API
    pub fn cloud(api_key: &str, base_url: &str, model: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let client = openai::Client::from_url(api_key, base_url);
        let completion_model = RateLimitedCompletionModel::new(
            client.completion_model(model),
            limiter(CLOUD_REQUESTS_PER_MINUTE),
        );
        Self::new(
            completion_model,
            ModelInfo {
                provider: ProviderKind::Cloud,
                model: model.to_string(),
                endpoint: base_url.to_string(),
            },
        )
    }
}

impl<M> AuditClient<M>
where
    M: CompletionModel,
{
    pub fn new(completion_model: M, info: ModelInfo) -> Self {
        Self {
            completion_model,
            info,
        }
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Send one prompt with a system preamble and return the text of the answer
    #[instrument(skip_all, fields(model = %self.info.model, prompt_bytes = prompt.len()))]
    pub async fn complete(&self, preamble: &str, prompt: &str) -> Result<String, CompletionError> {
        let response = self
            .completion_model
            .completion_request(prompt.to_string())
            .preamble(preamble.to_string())
            .temperature(TEMPERATURE)
            .max_tokens(MAX_TOKENS)
            .send()
            .await?;
        let text = response_text(&response.choice);
        debug!(response_bytes = text.len(), "completion received");
        Ok(text)
    }
}

/// Join the text parts of a completion choice
pub fn response_text(choice: &OneOrMany<AssistantContent>) -> String {
    choice
        .iter()
        .filter_map(|c| match c {
            AssistantContent::Text(t) => Some(t.text.clone()),
            _ => None,
        })
        .collect::<Vec<String>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock_model::{MockCompletionModel, MockReply};

    fn test_info() -> ModelInfo {
        ModelInfo {
            provider: ProviderKind::Local,
            model: "mock".to_string(),
            endpoint: "memory".to_string(),
        }
    }

    #[tokio::test]
    async fn test_complete_returns_text_and_records_prompt() {
        let model = MockCompletionModel::new();
        model.push(MockReply::text("## Findings\nAll good")).await;
        let client = AuditClient::new(model.clone(), test_info());

        let text = client.complete("You are an auditor", "Audit this").await.unwrap();
        assert_eq!(text, "## Findings\nAll good");

        let calls = model.calls().await;
        assert_eq!(calls.len(), 1);
        assert!(calls[0].prompt.contains("Audit this"));
        assert_eq!(calls[0].preamble.as_deref(), Some("You are an auditor"));
    }

    #[tokio::test]
    async fn test_complete_propagates_provider_errors() {
        let model = MockCompletionModel::new();
        model.push(MockReply::error("HTTP 500")).await;
        let client = AuditClient::new(model, test_info());
        let err = client.complete("p", "q").await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_response_text_joins_parts() {
        let choice = OneOrMany::many(vec![AssistantContent::text("a"), AssistantContent::text("b")])
            .unwrap();
        assert_eq!(response_text(&choice), "a\nb");
    }

    #[test]
    fn test_model_info_display() {
        let info = ModelInfo {
            provider: ProviderKind::Cloud,
            model: "gpt-3.5-turbo".to_string(),
            endpoint: DEFAULT_CLOUD_URL.to_string(),
        };
        assert_eq!(info.to_string(), "gpt-3.5-turbo (cloud, https://api.openai.com/v1)");
    }
}
