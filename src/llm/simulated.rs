//! Deterministic invoker standing in for a real model.
//!
//! Mirrors the simulation endpoints of the hosted product: instead of
//! calling out, it synthesizes a plausible JSON object from the prompt and
//! payload. Output is a pure function of the request, which makes it the
//! default provider for local development and tests.

use super::{LlmError, LlmInvoker, LlmRequest};
use async_trait::async_trait;
use serde_json::{Map, Value};

const EXCERPT_WORDS: usize = 12;

/// Invoker that fabricates deterministic output without network access.
#[derive(Debug, Default)]
pub struct SimulatedInvoker;

impl SimulatedInvoker {
    /// Construct a new simulated invoker.
    pub const fn new() -> Self {
        Self
    }

    fn simulate(request: &LlmRequest) -> Map<String, Value> {
        let excerpt = excerpt_of(&request.data);
        let properties = request
            .output_schema
            .as_ref()
            .and_then(|schema| schema.get("properties"))
            .and_then(Value::as_object);

        let mut output = Map::new();
        match properties {
            Some(properties) if !properties.is_empty() => {
                for (name, property) in properties {
                    output.insert(name.clone(), placeholder(name, property, &excerpt));
                }
            }
            _ => {
                output.insert("output".to_string(), Value::String(excerpt));
            }
        }
        output
    }
}

/// First words of the payload's string content, flattened in key order.
fn excerpt_of(data: &Value) -> String {
    let mut words = Vec::new();
    collect_words(data, &mut words);
    if words.is_empty() {
        return "(no textual content)".to_string();
    }
    words.truncate(EXCERPT_WORDS);
    words.join(" ")
}

fn collect_words(value: &Value, words: &mut Vec<String>) {
    if words.len() >= EXCERPT_WORDS {
        return;
    }
    match value {
        Value::String(text) => {
            words.extend(text.split_whitespace().map(str::to_string));
        }
        Value::Array(items) => {
            for item in items {
                collect_words(item, words);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_words(item, words);
            }
        }
        _ => {}
    }
}

fn placeholder(name: &str, property: &Value, excerpt: &str) -> Value {
    let kind = property
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("string");
    match kind {
        "number" | "integer" => Value::from(excerpt.len()),
        "boolean" => Value::Bool(true),
        "array" => Value::Array(Vec::new()),
        "object" => Value::Object(Map::new()),
        _ => Value::String(format!("{name}: {excerpt}")),
    }
}

#[async_trait]
impl LlmInvoker for SimulatedInvoker {
    async fn invoke(&self, request: LlmRequest) -> Result<Map<String, Value>, LlmError> {
        tracing::trace!(model = %request.model, "Simulating LLM invocation");
        Ok(Self::simulate(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(schema: Option<Value>) -> LlmRequest {
        LlmRequest {
            prompt: "Summarize".into(),
            data: json!({"content": "The quarterly report shows steady growth"}),
            model: "sim".into(),
            output_schema: schema,
        }
    }

    #[tokio::test]
    async fn output_is_deterministic() {
        let invoker = SimulatedInvoker::new();
        let first = invoker.invoke(request(None)).await.expect("object");
        let second = invoker.invoke(request(None)).await.expect("object");
        assert_eq!(first, second);
        assert!(first.contains_key("output"));
    }

    #[tokio::test]
    async fn schema_properties_shape_the_output() {
        let schema = json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string"},
                "word_count": {"type": "integer"},
                "reviewed": {"type": "boolean"}
            }
        });
        let result = SimulatedInvoker::new()
            .invoke(request(Some(schema)))
            .await
            .expect("object");
        assert!(result.get("summary").is_some_and(Value::is_string));
        assert!(result.get("word_count").is_some_and(Value::is_number));
        assert_eq!(result.get("reviewed"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn non_textual_payload_still_yields_output() {
        let invoker = SimulatedInvoker::new();
        let result = invoker
            .invoke(LlmRequest {
                prompt: "Summarize".into(),
                data: json!({"n": 4}),
                model: "sim".into(),
                output_schema: None,
            })
            .await
            .expect("object");
        assert_eq!(result.get("output"), Some(&json!("(no textual content)")));
    }
}
