//! Provider gateway: one primary backend wrapped in retry, with a
//! deterministic fallback that cannot fail.

pub mod anthropic;
pub mod backend;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod observability;
pub mod ollama;
pub mod prompt;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

pub use anthropic::AnthropicBackend;
pub use backend::{Backend, Completion, CompletionRequest};
pub use error::{PayloadParseError, ProviderError};
pub use fallback::StaticPlanner;
pub use observability::{InvocationRecord, NoopSink, ObservabilitySink, RecordingSink};
pub use ollama::OllamaBackend;

use crate::config::{ProviderConfig, ProviderKind};
use crate::context::RequestContext;
use crate::types::{Candidate, SelectedAction};

/// Actions (and optionally a motivation line) produced by a backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Payload {
    pub actions: Vec<SelectedAction>,
    pub motivation: Option<String>,
    /// Actions in the backend output that could not be decoded.
    #[serde(skip)]
    pub dropped: usize,
}

/// Gateway output: the payload and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub payload: Payload,
    pub backend: String,
    pub model: String,
    /// `true` when the static planner produced the payload.
    pub fallback: bool,
    /// Primary attempts made (0 when there is no primary).
    pub attempts: u32,
}

/// Calls the primary backend with retry and falls back to [`StaticPlanner`].
pub struct Gateway {
    primary: Option<Box<dyn Backend>>,
    fallback: StaticPlanner,
    sink: Arc<dyn ObservabilitySink>,
    config: ProviderConfig,
}

impl Gateway {
    /// Gateway over an explicit primary backend (`None` for fallback only).
    pub fn new(primary: Option<Box<dyn Backend>>, config: ProviderConfig) -> Self {
        Self {
            primary,
            fallback: StaticPlanner,
            sink: Arc::new(NoopSink),
            config,
        }
    }

    /// Build the primary backend named by `config.kind`.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let primary: Option<Box<dyn Backend>> = match config.kind {
            ProviderKind::Anthropic => Some(Box::new(AnthropicBackend::new(config)?)),
            ProviderKind::Ollama => Some(Box::new(OllamaBackend::new(config)?)),
            ProviderKind::Static => None,
        };
        Ok(Self::new(primary, config.clone()))
    }

    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Name of the primary backend, or the fallback's when there is none.
    pub fn primary_name(&self) -> &str {
        self.primary
            .as_deref()
            .map(|b| b.name())
            .unwrap_or(StaticPlanner::NAME)
    }

    /// Whether the primary backend is ready. The fallback is always ready,
    /// so a gateway without a primary reports `false`.
    pub async fn is_available(&self) -> bool {
        match &self.primary {
            Some(primary) => primary.is_available().await,
            None => false,
        }
    }

    /// Produce a payload of (ideally) `count` actions.
    ///
    /// Never fails: retryable primary errors are retried up to
    /// `max_attempts` times with the configured backoff, and anything left
    /// over is answered by the static planner. The payload is not checked
    /// against the plan shape here; the orchestrator repairs it.
    pub async fn generate(
        &self,
        ctx: &RequestContext,
        candidates: &[Candidate],
        count: usize,
    ) -> Generation {
        let mut attempts = 0;

        if let Some(primary) = self.primary.as_deref() {
            let request = prompt::selection_request(ctx, candidates, count, self.config.max_tokens);
            let max_attempts = self.config.max_attempts.max(1);

            for attempt in 1..=max_attempts {
                attempts = attempt;
                let started = Instant::now();
                let (completion, outcome) = match primary.complete(&request).await {
                    Ok(completion) => {
                        let parsed = extract::parse_payload(&completion.text).map_err(ProviderError::from);
                        (Some(completion), parsed)
                    }
                    Err(e) => (None, Err(e)),
                };
                let latency_ms = elapsed_ms(started);

                match outcome {
                    Ok(payload) => {
                        self.emit(primary, attempt, latency_ms, completion.as_ref(), None);
                        info!(
                            backend = primary.name(),
                            attempt,
                            latency_ms,
                            actions = payload.actions.len(),
                            "backend produced plan"
                        );
                        return Generation {
                            payload,
                            backend: primary.name().to_owned(),
                            model: primary.model().to_owned(),
                            fallback: false,
                            attempts,
                        };
                    }
                    Err(err) => {
                        self.emit(primary, attempt, latency_ms, completion.as_ref(), Some(&err));
                        let retryable = err.is_retryable();
                        warn!(
                            backend = primary.name(),
                            attempt,
                            max_attempts,
                            latency_ms,
                            retryable,
                            error = %err,
                            "backend call failed"
                        );
                        if !retryable {
                            break;
                        }
                        if attempt < max_attempts {
                            tokio::time::sleep(self.config.delay_after(attempt)).await;
                        }
                    }
                }
            }
        }

        let started = Instant::now();
        let payload = self.fallback.plan(ctx, candidates, count);
        let latency_ms = elapsed_ms(started);
        self.sink.record(InvocationRecord {
            backend: StaticPlanner::NAME.to_owned(),
            model: StaticPlanner::NAME.to_owned(),
            attempt: attempts + 1,
            latency_ms,
            prompt_tokens: None,
            completion_tokens: None,
            cost_usd: Some(0.0),
            error: None,
            fallback: true,
        });
        info!(
            primary = self.primary_name(),
            attempts,
            actions = payload.actions.len(),
            "using fallback planner"
        );

        Generation {
            payload,
            backend: StaticPlanner::NAME.to_owned(),
            model: StaticPlanner::NAME.to_owned(),
            fallback: true,
            attempts,
        }
    }

    fn emit(
        &self,
        backend: &dyn Backend,
        attempt: u32,
        latency_ms: u64,
        completion: Option<&Completion>,
        error: Option<&ProviderError>,
    ) {
        let prompt_tokens = completion.and_then(|c| c.prompt_tokens);
        let completion_tokens = completion.and_then(|c| c.completion_tokens);
        self.sink.record(InvocationRecord {
            backend: backend.name().to_owned(),
            model: backend.model().to_owned(),
            attempt,
            latency_ms,
            prompt_tokens,
            completion_tokens,
            cost_usd: observability::estimate_cost(
                backend.name(),
                backend.model(),
                prompt_tokens,
                completion_tokens,
            ),
            error: error.map(|e| e.to_string()),
            fallback: false,
        });
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("primary", &self.primary_name())
            .field("config", &self.config)
            .finish()
    }
}
