//! OpenAI-compatible chat-completions adapter.
//!
//! Works against the hosted OpenAI API or any endpoint speaking the same
//! protocol. Structured output uses the `json_schema` response format when
//! the caller supplies a schema, otherwise `json_object` with a prompt
//! instruction, and the returned message content is parsed as JSON.

use super::{LlmError, LlmInvoker, LlmRequest, expect_object, render_payload};
use crate::config::get_config;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenAI-compatible providers.
pub struct OpenAiInvoker {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiInvoker {
    /// Build a client from the process configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(
            config
                .openai_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            config.openai_api_key.clone().unwrap_or_default(),
            Duration::from_secs(config.llm_timeout_secs),
        )
    }

    /// Build a client against an explicit endpoint.
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Self {
        let http = Client::builder()
            .user_agent("docpipe/0.1")
            .timeout(timeout)
            .build()
            .expect("Failed to construct reqwest::Client for OpenAI invoker");
        Self {
            http,
            base_url,
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &LlmRequest) -> Value {
        let system = if request.output_schema.is_some() {
            format!(
                "{}\n\nRespond with a single JSON object matching the provided schema.",
                request.prompt
            )
        } else {
            format!("{}\n\nRespond with a single JSON object.", request.prompt)
        };
        let response_format = match &request.output_schema {
            Some(schema) => json!({
                "type": "json_schema",
                "json_schema": {"name": "operator_output", "schema": schema}
            }),
            None => json!({"type": "json_object"}),
        };

        json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": render_payload(&request.data)},
            ],
            "response_format": response_format,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmInvoker for OpenAiInvoker {
    async fn invoke(&self, request: LlmRequest) -> Result<Map<String, Value>, LlmError> {
        tracing::debug!(model = %request.model, "Dispatching chat completion");
        let body = self.build_body(&request);

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                LlmError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.endpoint()
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode completion envelope: {error}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("completion carried no content".into()))?;

        let value: Value = serde_json::from_str(&content).map_err(|error| {
            LlmError::InvalidResponse(format!("completion content is not JSON: {error}"))
        })?;
        expect_object(value)
    }
}
