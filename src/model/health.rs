//! Connection checks run before an audit
//!
//! The local check lists the models of the server (`GET /api/tags`), the cloud
//! check lists the models of the account (`GET /models`). Either one reports
//! whether the requested model is available and, when it is not, which listed
//! model can stand in for it.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::DEFAULT_CLOUD_MODEL;

const LOCAL_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const CLOUD_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("cannot reach {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("model '{model}' is not available (available: {})", available.join(", "))]
    ModelMissing { model: String, available: Vec<String> },
}

/// Result of a successful check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelAvailability {
    Listed,
    /// The requested model is missing; this listed model replaces it
    Fallback(String),
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

async fn get_json<T: for<'de> Deserialize<'de>>(
    request: reqwest::RequestBuilder,
    url: &str,
) -> Result<T, HealthError> {
    let unreachable = |e: reqwest::Error| HealthError::Unreachable {
        url: url.to_string(),
        message: e.to_string(),
    };
    let response = request.send().await.map_err(unreachable)?;
    let status = response.status();
    if !status.is_success() {
        return Err(HealthError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    response.json::<T>().await.map_err(unreachable)
}

/// Check a local model server
///
/// A model matches a listed tag by name, with or without the `:tag` suffix.
/// When it is missing the first listed model is offered as fallback.
#[instrument(skip(http))]
pub async fn check_local(
    http: &reqwest::Client,
    base_url: &str,
    model: &str,
) -> Result<ModelAvailability, HealthError> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let tags: TagList = get_json(http.get(&url).timeout(LOCAL_CHECK_TIMEOUT), &url).await?;
    let names: Vec<String> = tags.models.into_iter().map(|t| t.name).collect();
    info!(models = names.len(), "local model server reachable");

    let listed = names
        .iter()
        .any(|name| name == model || name.split(':').next() == Some(model));
    if listed {
        return Ok(ModelAvailability::Listed);
    }
    match names.first() {
        Some(first) => {
            warn!(requested = model, fallback = %first, "model not found, using first available");
            Ok(ModelAvailability::Fallback(first.clone()))
        }
        None => Err(HealthError::ModelMissing {
            model: model.to_string(),
            available: names,
        }),
    }
}

/// Check an OpenAI compatible API
///
/// Falls back to the default cloud model when the requested one is not listed
/// for the account.
#[instrument(skip(http, api_key))]
pub async fn check_cloud(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    model: &str,
) -> Result<ModelAvailability, HealthError> {
    let url = format!("{}/models", base_url.trim_end_matches('/'));
    let request = http
        .get(&url)
        .bearer_auth(api_key)
        .timeout(CLOUD_CHECK_TIMEOUT);
    let models: ModelList = get_json(request, &url).await?;
    let ids: Vec<String> = models.data.into_iter().map(|m| m.id).collect();
    info!(models = ids.len(), "cloud API reachable");

    if ids.iter().any(|id| id == model) {
        Ok(ModelAvailability::Listed)
    } else if ids.iter().any(|id| id == DEFAULT_CLOUD_MODEL) {
        warn!(requested = model, fallback = DEFAULT_CLOUD_MODEL, "model not found, using default");
        Ok(ModelAvailability::Fallback(DEFAULT_CLOUD_MODEL.to_string()))
    } else {
        Err(HealthError::ModelMissing {
            model: model.to_string(),
            available: ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_local_check_matches_tag_prefix() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"models":[{"name":"llama3.1:latest"},{"name":"mistral:7b"}]}"#)
            .expect(2)
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let found = check_local(&http, &server.url(), "mistral").await.unwrap();
        assert_eq!(found, ModelAvailability::Listed);

        let fallback = check_local(&http, &format!("{}/", server.url()), "qwen2").await.unwrap();
        assert_eq!(fallback, ModelAvailability::Fallback("llama3.1:latest".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_local_check_without_models() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[]}"#)
            .create_async()
            .await;

        let err = check_local(&reqwest::Client::new(), &server.url(), "llama3.1")
            .await
            .unwrap_err();
        assert!(matches!(err, HealthError::ModelMissing { .. }));
    }

    #[tokio::test]
    async fn test_cloud_check_sends_key_and_reports_status() {
        let mut server = Server::new_async().await;
        let ok = server
            .mock("GET", "/v1/models")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_body(r#"{"data":[{"id":"gpt-4o-mini"},{"id":"gpt-3.5-turbo"}]}"#)
            .expect(2)
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let base = format!("{}/v1", server.url());
        assert_eq!(
            check_cloud(&http, &base, "sk-test", "gpt-4o-mini").await.unwrap(),
            ModelAvailability::Listed
        );
        assert_eq!(
            check_cloud(&http, &base, "sk-test", "gpt-9").await.unwrap(),
            ModelAvailability::Fallback("gpt-3.5-turbo".to_string())
        );
        ok.assert_async().await;

        let err = check_cloud(&http, &base, "sk-wrong", "gpt-4o-mini").await.unwrap_err();
        assert!(matches!(err, HealthError::Status { status: 501, .. }));
    }

    #[tokio::test]
    async fn test_check_unreachable_server() {
        let err = check_local(&reqwest::Client::new(), "http://127.0.0.1:9", "llama3.1")
            .await
            .unwrap_err();
        assert!(matches!(err, HealthError::Unreachable { .. }));
    }
}
