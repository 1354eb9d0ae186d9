//! LLM invoker abstraction and provider adapters.
//!
//! Operators that delegate work to a model go through the [`LlmInvoker`]
//! trait: one prompt, one JSON payload, one JSON object back. Invocations
//! are fail-fast — no retries — and carry a per-call timeout at the
//! transport layer so a hung provider surfaces as an ordinary per-item or
//! per-group failure. When an output schema is supplied, the invoker (not
//! the calling operator) is responsible for steering the provider toward a
//! structurally matching object.

use crate::config::{LlmProvider, get_config};
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod ollama;
pub mod openai;
pub mod simulated;

/// Model used when neither the operator nor the pipeline names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Errors surfaced by LLM providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider could not be reached (network failure, timeout).
    #[error("LLM provider unreachable: {0}")]
    ProviderUnavailable(String),
    /// Provider answered with an error response.
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    /// Provider answered, but not with a usable JSON object.
    #[error("Malformed LLM response: {0}")]
    InvalidResponse(String),
}

/// One invocation: a prompt applied to a JSON payload.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Instruction describing the transformation.
    pub prompt: String,
    /// Item or group the prompt operates on.
    pub data: Value,
    /// Fully qualified model identifier understood by the provider.
    pub model: String,
    /// Optional JSON-Schema-like shape the response should match.
    pub output_schema: Option<Value>,
}

/// Interface implemented by LLM backends.
#[async_trait]
pub trait LlmInvoker: Send + Sync {
    /// Apply the prompt to the payload and return the resulting object.
    async fn invoke(&self, request: LlmRequest) -> Result<Map<String, Value>, LlmError>;
}

/// Build an invoker matching the configured provider.
pub fn get_llm_invoker() -> Box<dyn LlmInvoker + Send + Sync> {
    let config = get_config();
    match config.llm_provider {
        LlmProvider::OpenAi => Box::new(openai::OpenAiInvoker::from_config()),
        LlmProvider::Ollama => Box::new(ollama::OllamaInvoker::from_config()),
        LlmProvider::Simulated => Box::new(simulated::SimulatedInvoker::new()),
    }
}

/// Render the payload section appended to provider prompts.
pub(crate) fn render_payload(data: &Value) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
}

/// Require a JSON object from a provider response.
pub(crate) fn expect_object(value: Value) -> Result<Map<String, Value>, LlmError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(LlmError::InvalidResponse(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}
