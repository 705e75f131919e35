//! Client for the Gemini `generateContent` endpoint
//!
//! The pipeline only needs "system instruction + prompt in, text out", so
//! the endpoint sits behind the `TextGenerator` trait and tests swap in
//! scripted generators.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::infrastructure::config::EnrichmentConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid response body: {0}")]
    InvalidResponse(String),
}

/// Text returned by one generation call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedText {
    /// `None` when the endpoint answered without any text part
    pub text: Option<String>,
    pub total_tokens: Option<u64>,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<GeneratedText, GenerationError>;
}

/// Gemini client configuration
#[derive(Debug, Clone)]
pub struct GeminiClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl GeminiClientConfig {
    /// Build from enrichment settings; `None` when no API key is available
    pub fn from_enrichment_config(config: &EnrichmentConfig) -> Option<Self> {
        Self::from_enrichment_config_with(config, |name| std::env::var(name).ok())
    }

    /// Like [`Self::from_enrichment_config`], reading variables through `env`
    pub fn from_enrichment_config_with(
        config: &EnrichmentConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<Self> {
        Some(Self {
            api_key: config.resolve_api_key_with(env)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout_seconds: config.request_timeout_secs,
            user_agent: format!("catalog-curator/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

pub struct GeminiClient {
    client: Client,
    config: GeminiClientConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );
        let mut api_key = HeaderValue::from_str(&config.api_key).context("Invalid API key")?;
        api_key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, api_key);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    /// Client for the configured model, or `None` when credentials are missing
    pub fn from_config(config: &EnrichmentConfig) -> Result<Option<Self>> {
        GeminiClientConfig::from_enrichment_config(config)
            .map(Self::new)
            .transpose()
    }

    pub const fn config(&self) -> &GeminiClientConfig {
        &self.config
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<GeneratedText, GenerationError> {
        let body = GenerateContentRequest::new(system_instruction, prompt, self.config.temperature);
        let url = self.config.endpoint();
        debug!(%url, prompt_bytes = prompt.len(), "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(error_from_body(status, &text));
        }

        parse_generate_response(&text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(system_instruction: &'a str, prompt: &'a str, temperature: f32) -> Self {
        Self {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: system_instruction }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig { temperature },
        }
    }
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u64>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Concatenate the text parts of the first candidate
fn parse_generate_response(body: &str) -> Result<GeneratedText, GenerationError> {
    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

    let text: Option<String> = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .filter(|t| !t.is_empty());

    Ok(GeneratedText {
        text,
        total_tokens: response.usage_metadata.and_then(|u| u.total_token_count),
    })
}

fn error_from_body(status: StatusCode, body: &str) -> GenerationError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if envelope.error.status.is_empty() => envelope.error.message,
        Ok(envelope) => format!("{} ({})", envelope.error.message, envelope.error.status),
        Err(_) => body.chars().take(500).collect(),
    };
    GenerationError::Http {
        status: status.as_u16(),
        message,
    }
}
