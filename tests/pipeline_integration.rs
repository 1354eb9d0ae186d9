//! End-to-end tests driving the HTTP surface against a real engine with
//! in-memory stores and the simulated LLM provider.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use docpipe::api::create_router;
use docpipe::engine::{EngineSettings, ExecutionEngine};
use docpipe::llm::simulated::SimulatedInvoker;
use docpipe::store::PipelineStore;
use docpipe::store::memory::{MemoryPipelineStore, MemoryRunLedger};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    app: Router,
    pipelines: Arc<MemoryPipelineStore>,
}

fn harness() -> Harness {
    let pipelines = Arc::new(MemoryPipelineStore::new());
    let engine = ExecutionEngine::new(
        pipelines.clone(),
        Arc::new(MemoryRunLedger::new()),
        Box::new(SimulatedInvoker::new()),
        EngineSettings::default(),
    );
    Harness {
        app: create_router(Arc::new(engine)),
        pipelines,
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            builder.body(Body::from(value.to_string())).expect("request")
        }
        None => builder.body(Body::empty()).expect("request"),
    };
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, json)
}

#[tokio::test]
async fn register_execute_and_inspect_run() {
    let harness = harness();

    let (status, body) = send(
        &harness.app,
        Method::POST,
        "/pipelines",
        Some(json!({
            "id": "doc-digest",
            "name": "Document digest",
            "operators": [
                {
                    "id": "op-1",
                    "name": "chunk",
                    "type": "split",
                    "config": {}
                },
                {
                    "id": "op-2",
                    "name": "summarize",
                    "type": "map",
                    "config": {
                        "prompt": "Summarize this chunk",
                        "output_schema": {
                            "type": "object",
                            "properties": {"summary": {"type": "string"}}
                        }
                    }
                }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], json!("doc-digest"));

    let (status, body) = send(
        &harness.app,
        Method::POST,
        "/pipelines/doc-digest/execute",
        Some(json!({
            "input": [{"content": "First paragraph.\n\nSecond paragraph."}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let results = body["results"].as_array().expect("results array");
    assert_eq!(results.len(), 2);
    for (index, result) in results.iter().enumerate() {
        assert_eq!(result["_chunk_index"], json!(index));
        assert_eq!(result["_total_chunks"], json!(2));
        assert!(result["summary"].is_string());
    }

    let operator_metrics = body["metrics"]["operators"]
        .as_array()
        .expect("operator metrics");
    assert_eq!(operator_metrics.len(), 2);
    assert_eq!(operator_metrics[0]["operator"], json!("chunk"));
    assert_eq!(operator_metrics[1]["input_count"], json!(2));

    let execution_id = body["execution_id"].as_str().expect("execution id");
    let (status, run) = send(
        &harness.app,
        Method::GET,
        &format!("/runs/{execution_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], json!("completed"));
    assert!(run["completed_at"].is_string());
    assert_eq!(
        run["output_data"]["results"]
            .as_array()
            .expect("persisted results")
            .len(),
        2
    );

    let (status, metrics) = send(&harness.app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["runs_completed"], json!(1));
    assert_eq!(metrics["operators_executed"], json!(2));
}

#[tokio::test]
async fn unnest_then_gather_reconstructs_the_array() {
    let harness = harness();

    send(
        &harness.app,
        Method::POST,
        "/pipelines",
        Some(json!({
            "id": "tag-cycle",
            "name": "Tag round trip",
            "operators": [
                {
                    "id": "op-1",
                    "name": "expand-tags",
                    "type": "unnest",
                    "config": {"unnest_key": "tags"}
                },
                {
                    "id": "op-2",
                    "name": "regroup",
                    "type": "gather",
                    "config": {"gather_key": "id", "content_key": "tags"}
                }
            ]
        })),
    )
    .await;

    let (status, body) = send(
        &harness.app,
        Method::POST,
        "/pipelines/tag-cycle/execute",
        Some(json!({"input": [{"id": 1, "tags": ["x", "y"]}, {"id": 2, "tags": ["z"]}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let results = body["results"].as_array().expect("results array");
    assert_eq!(
        results,
        &vec![
            json!({"id": 1, "items": ["x", "y"]}),
            json!({"id": 2, "items": ["z"]}),
        ]
    );
}

#[tokio::test]
async fn split_is_idempotent_on_single_paragraph_input() {
    let harness = harness();

    send(
        &harness.app,
        Method::POST,
        "/pipelines",
        Some(json!({
            "id": "chunk-only",
            "name": "Chunk",
            "operators": [{
                "id": "op-1",
                "name": "chunk",
                "type": "split",
                "config": {}
            }]
        })),
    )
    .await;

    let (status, body) = send(
        &harness.app,
        Method::POST,
        "/pipelines/chunk-only/execute",
        Some(json!({"input": [{"id": 9, "content": "one block with no break"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["results"],
        json!([{
            "id": 9,
            "content": "one block with no break",
            "_chunk_index": 0,
            "_total_chunks": 1
        }])
    );
}

#[tokio::test]
async fn stored_definition_with_unknown_operator_fails_the_run() {
    let harness = harness();

    // Planted directly in the store, sidestepping registration validation,
    // the way a row written by another service revision would arrive.
    let definition = serde_json::from_value(json!({
        "id": "legacy",
        "name": "Legacy definition",
        "operators": [
            {"id": "op-1", "name": "chunk", "type": "split", "config": {}},
            {"id": "op-2", "name": "mystery", "type": "join", "config": {}}
        ]
    }))
    .expect("decodes");
    harness
        .pipelines
        .put_pipeline(definition)
        .await
        .expect("stored");

    let (status, body) = send(
        &harness.app,
        Method::POST,
        "/pipelines/legacy/execute",
        Some(json!({"input": [{"content": "text"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().expect("string").contains("mystery"));

    let (_, metrics) = send(&harness.app, Method::GET, "/metrics", None).await;
    assert_eq!(metrics["runs_failed"], json!(1));
}
