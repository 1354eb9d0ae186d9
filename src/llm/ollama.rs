//! Ollama adapter for local model runtimes.
//!
//! Issues HTTP requests directly against the Ollama generate endpoint with
//! `format: "json"` so the runtime constrains its output to a JSON value;
//! the schema, when present, is embedded in the prompt since Ollama has no
//! structured-output parameter.

use super::{LlmError, LlmInvoker, LlmRequest, expect_object, render_payload};
use crate::config::get_config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Invoker backed by a local Ollama runtime.
pub struct OllamaInvoker {
    http: Client,
    base_url: String,
}

impl OllamaInvoker {
    /// Build a client from the process configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(
            config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            Duration::from_secs(config.llm_timeout_secs),
        )
    }

    /// Build a client against an explicit base URL.
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let http = Client::builder()
            .user_agent("docpipe/0.1")
            .timeout(timeout)
            .build()
            .expect("Failed to construct reqwest::Client for Ollama invoker");
        Self { http, base_url }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    fn build_prompt(request: &LlmRequest) -> String {
        let mut prompt = format!(
            "{}\n\nRespond with a single JSON object.",
            request.prompt.trim_end()
        );
        if let Some(schema) = &request.output_schema {
            prompt.push_str("\nThe object must match this JSON schema:\n");
            prompt.push_str(&render_payload(schema));
        }
        prompt.push_str("\n\nInput:\n");
        prompt.push_str(&render_payload(&request.data));
        prompt
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl LlmInvoker for OllamaInvoker {
    async fn invoke(&self, request: LlmRequest) -> Result<Map<String, Value>, LlmError> {
        let payload = json!({
            "model": request.model,
            "prompt": Self::build_prompt(&request),
            "stream": false,
            "format": "json",
            "options": {
                // Lower temperature keeps extraction output stable.
                "temperature": 0.1,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LlmError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LlmError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: GenerateResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(LlmError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        let value: Value = serde_json::from_str(body.response.trim()).map_err(|error| {
            LlmError::InvalidResponse(format!("Ollama output is not JSON: {error}"))
        })?;
        expect_object(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn request() -> LlmRequest {
        LlmRequest {
            prompt: "Classify the document".into(),
            data: json!({"content": "invoice #42"}),
            model: "llama3".into(),
            output_schema: None,
        }
    }

    #[tokio::test]
    async fn parses_json_object_output() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": "{\"kind\": \"invoice\"}",
                    "done": true
                }));
            })
            .await;

        let client = OllamaInvoker::new(server.base_url(), Duration::from_secs(5));
        let result = client.invoke(request()).await.expect("object");
        mock.assert();
        assert_eq!(result.get("kind"), Some(&json!("invoice")));
    }

    #[tokio::test]
    async fn incomplete_response_is_invalid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": "{}",
                    "done": false
                }));
            })
            .await;

        let client = OllamaInvoker::new(server.base_url(), Duration::from_secs(5));
        let error = client.invoke(request()).await.expect_err("incomplete");
        assert!(matches!(error, LlmError::InvalidResponse(_)));
    }

    #[test]
    fn schema_is_embedded_in_prompt() {
        let mut with_schema = request();
        with_schema.output_schema = Some(json!({"type": "object"}));
        let prompt = OllamaInvoker::build_prompt(&with_schema);
        assert!(prompt.contains("JSON schema"));
        assert!(prompt.contains("invoice #42"));
    }
}
