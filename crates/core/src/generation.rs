use crate::error::UpstreamError;
use crate::gemini::{post_json, GeminiConfig};
use crate::retry::{call_with_retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_GENERATION_MODEL: &str = "models/gemini-2.5-flash";

const SERVICE: &str = "generation";

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError>;
}

pub struct GeminiGenerator {
    config: GeminiConfig,
    model: String,
    client: Client,
    policy: RetryPolicy,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text = content
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl GeminiGenerator {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            model: DEFAULT_GENERATION_MODEL.to_string(),
            client: Client::new(),
            policy: RetryPolicy::for_generation(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, UpstreamError> {
        let url = self.config.method_url(&self.model, "generateContent")?;
        let request = GenerateContentRequest {
            contents: [RequestContent {
                role: "user",
                parts: [RequestPart { text: prompt }],
            }],
        };

        let response: GenerateContentResponse =
            post_json(&self.client, &self.config, url, SERVICE, &request).await?;

        response.into_text().ok_or(UpstreamError::InvalidResponse {
            service: SERVICE,
            details: "response had no text candidates".to_string(),
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        call_with_retry(&self.policy, SERVICE, || self.generate_once(prompt)).await
    }
}
