//! Shared plumbing for the Gemini REST API.

use crate::error::UpstreamError;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// `{base}/v1beta/models/{model}:{method}`. Accepts `models/x` or bare `x`.
    pub fn method_url(&self, model: &str, method: &str) -> Result<Url, UpstreamError> {
        let model = model.strip_prefix("models/").unwrap_or(model);
        let base = Url::parse(self.base_url.trim_end_matches('/'))?;
        Ok(base.join(&format!("/v1beta/models/{model}:{method}"))?)
    }
}

pub(crate) async fn post_json<B, R>(
    client: &Client,
    config: &GeminiConfig,
    url: Url,
    service: &'static str,
    body: &B,
) -> Result<R, UpstreamError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = client
        .post(url)
        .header("x-goog-api-key", &config.api_key)
        .json(body)
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        return response
            .json::<R>()
            .await
            .map_err(|error| UpstreamError::InvalidResponse {
                service,
                details: error.to_string(),
            });
    }

    let details = response.text().await.unwrap_or_default();
    Err(classify_failure(service, status, details))
}

/// 429s and `RESOURCE_EXHAUSTED` bodies are rate limits; anything else is permanent.
pub(crate) fn classify_failure(
    service: &'static str,
    status: StatusCode,
    details: String,
) -> UpstreamError {
    if status == StatusCode::TOO_MANY_REQUESTS || details.contains("RESOURCE_EXHAUSTED") {
        UpstreamError::RateLimited { service, details }
    } else {
        UpstreamError::Failed {
            service,
            status: status.as_u16(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_url_accepts_prefixed_and_bare_models() -> Result<(), UpstreamError> {
        let config = GeminiConfig::new("key").with_base_url("http://localhost:8080/");
        let prefixed = config.method_url("models/text-embedding-004", "embedContent")?;
        let bare = config.method_url("text-embedding-004", "embedContent")?;
        assert_eq!(
            prefixed.as_str(),
            "http://localhost:8080/v1beta/models/text-embedding-004:embedContent"
        );
        assert_eq!(prefixed, bare);
        Ok(())
    }

    #[test]
    fn resource_exhausted_is_a_rate_limit() {
        let error = classify_failure(
            "generation",
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#.to_string(),
        );
        assert!(error.is_rate_limited());

        let error = classify_failure("generation", StatusCode::UNAUTHORIZED, "nope".to_string());
        assert!(matches!(error, UpstreamError::Failed { status: 401, .. }));
    }
}
