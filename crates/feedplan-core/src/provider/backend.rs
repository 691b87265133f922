//! The `Backend` trait: one generative text endpoint.

use async_trait::async_trait;

use super::error::ProviderError;

/// A single prompt sent to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: u32,
}

/// Raw backend output plus token usage when the backend reports it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

/// Adapter interface for generative backends.
///
/// Object safe so the gateway can hold a `Box<dyn Backend>` chosen at
/// runtime from config.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short identity used in logs and invocation records (e.g. "anthropic").
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Send one request. Retrying is the caller's job.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;

    /// Cheap readiness check (credentials present, server reachable).
    async fn is_available(&self) -> bool;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Backend) {}
};
