//! Model provider seam.

use async_trait::async_trait;
use std::time::Duration;

use docbench_domain::Result;

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A single model completion.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// Abstract LLM transport.
///
/// Implementations map provider failures onto the harness error taxonomy
/// (`Transport`, `RateLimited`, `Timeout`, `BadRequest`). Invocations are
/// idempotent from the harness's perspective; the executor retries freely.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(
        &self,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<ModelResponse>;
}
