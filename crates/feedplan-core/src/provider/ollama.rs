//! Local Ollama backend (`/api/generate`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::backend::{Backend, Completion, CompletionRequest};
use super::error::ProviderError;
use crate::config::ProviderConfig;

pub const DEFAULT_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    format: &'static str,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Strip trailing slashes so paths can be appended.
fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_owned()
}

/// Backend for a model served by a local Ollama daemon.
pub struct OllamaBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: normalize_base_url(config.base_url.as_deref().unwrap_or(DEFAULT_URL)),
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
        })
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
            format: "json",
            options: GenerateOptions {
                num_predict: request.max_tokens,
                temperature: 0.3,
            },
        }
    }

    fn has_model(&self, tags: &TagsResponse) -> bool {
        let tagged = format!("{}:latest", self.model);
        tags.models
            .iter()
            .any(|m| m.name == self.model || m.name == tagged)
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(Completion {
            text: parsed.response,
            prompt_tokens: parsed.prompt_eval_count,
            completion_tokens: parsed.eval_count,
        })
    }

    async fn is_available(&self) -> bool {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        match response {
            Ok(r) if r.status().is_success() => match r.json::<TagsResponse>().await {
                Ok(tags) => self.has_model(&tags),
                Err(_) => false,
            },
            _ => false,
        }
    }
}
