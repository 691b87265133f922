//! Anthropic Messages API backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::backend::{Backend, Completion, CompletionRequest};
use super::error::ProviderError;
use crate::config::ProviderConfig;

pub const DEFAULT_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";
const API_VERSION: &str = "2023-06-01";
/// Selection is a ranking task; keep sampling tight.
const TEMPERATURE: f32 = 0.3;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Backend for Claude models.
pub struct AnthropicBackend {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl AnthropicBackend {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("http client: {e}")))?;

        Ok(Self {
            http,
            url: config.base_url.clone().unwrap_or_else(|| DEFAULT_URL.to_owned()),
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: TEMPERATURE,
            system: request.system.as_deref(),
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
        }
    }
}

fn into_completion(response: MessagesResponse) -> Completion {
    let text = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");
    Completion {
        text,
        prompt_tokens: response.usage.as_ref().map(|u| u.input_tokens),
        completion_tokens: response.usage.as_ref().map(|u| u.output_tokens),
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("ANTHROPIC_API_KEY is not set".into()))?;

        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let parsed: MessagesResponse = response.json().await?;
        let completion = into_completion(parsed);
        debug!(
            model = %self.model,
            prompt_tokens = ?completion.prompt_tokens,
            completion_tokens = ?completion.completion_tokens,
            "anthropic completion received"
        );
        Ok(completion)
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}
