//! HTTP surface for the pipeline engine.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /pipelines` – Validate and register a pipeline definition.
//! - `GET /pipelines` – List registered pipeline definitions.
//! - `POST /pipelines/:id/execute` – Run a pipeline against caller input and
//!   return `{success, execution_id, results, metrics}`.
//! - `GET /runs/:id` – Fetch one run record from the ledger.
//! - `GET /metrics` – Observe engine counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery
//!   by tools/hosts.
//!
//! Failures surface as `{"success": false, "error": "..."}` with a status
//! code matching the failure class; callers never receive partial results.

use crate::engine::{EngineApi, EngineError};
use crate::model::{PipelineDefinition, Run};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

/// Build the HTTP router exposing the engine API surface.
pub fn create_router<S>(engine: Arc<S>) -> Router
where
    S: EngineApi + 'static,
{
    Router::new()
        .route(
            "/pipelines",
            get(list_pipelines::<S>).post(register_pipeline::<S>),
        )
        .route("/pipelines/:id/execute", post(execute_pipeline::<S>))
        .route("/runs/:id", get(get_run::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(engine)
}

/// Request body for `POST /pipelines/:id/execute`.
#[derive(Deserialize)]
struct ExecuteRequest {
    /// Input value or array of values seeding the record sequence.
    #[serde(default)]
    input: Value,
    /// Optional caller identity, recorded for observability only.
    #[serde(default)]
    user_id: Option<String>,
}

/// Success response for `POST /pipelines/:id/execute`.
#[derive(Serialize)]
struct ExecuteResponse {
    /// Always `true`; failures never reach this shape.
    success: bool,
    /// Identifier of the persisted run.
    execution_id: String,
    /// Final record sequence.
    results: Vec<Value>,
    /// Per-operator and aggregate metrics for the run.
    metrics: crate::model::RunMetrics,
}

/// Execute a pipeline against the submitted input.
async fn execute_pipeline<S>(
    State(engine): State<Arc<S>>,
    Path(pipeline_id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, AppError>
where
    S: EngineApi,
{
    if let Some(user_id) = &request.user_id {
        tracing::debug!(pipeline = %pipeline_id, user = %user_id, "Execution requested");
    }
    let outcome = engine.execute(&pipeline_id, request.input).await?;
    Ok(Json(ExecuteResponse {
        success: true,
        execution_id: outcome.run_id,
        results: outcome
            .results
            .into_iter()
            .map(crate::model::Record::into_value)
            .collect(),
        metrics: outcome.metrics,
    }))
}

/// Response body for `POST /pipelines`.
#[derive(Serialize)]
struct RegisterResponse {
    id: String,
}

/// Validate and store a pipeline definition.
async fn register_pipeline<S>(
    State(engine): State<Arc<S>>,
    Json(definition): Json<PipelineDefinition>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError>
where
    S: EngineApi,
{
    let id = definition.id.clone();
    engine.register_pipeline(definition).await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { id })))
}

/// Response body for `GET /pipelines`.
#[derive(Serialize)]
struct PipelinesResponse {
    pipelines: Vec<PipelineSummary>,
}

/// Compact listing entry for one pipeline.
#[derive(Serialize)]
struct PipelineSummary {
    id: String,
    name: String,
    operators: usize,
}

/// List registered pipelines.
async fn list_pipelines<S>(
    State(engine): State<Arc<S>>,
) -> Result<Json<PipelinesResponse>, AppError>
where
    S: EngineApi,
{
    let pipelines = engine
        .list_pipelines()
        .await?
        .into_iter()
        .map(|definition| PipelineSummary {
            id: definition.id,
            name: definition.name,
            operators: definition.operators.len(),
        })
        .collect();
    Ok(Json(PipelinesResponse { pipelines }))
}

/// Fetch one run record.
async fn get_run<S>(
    State(engine): State<Arc<S>>,
    Path(run_id): Path<String>,
) -> Result<Json<Run>, AppError>
where
    S: EngineApi,
{
    match engine.get_run(&run_id).await? {
        Some(run) => Ok(Json(run)),
        None => Err(AppError::not_found(format!("run '{run_id}' not found"))),
    }
}

/// Return the engine counters snapshot.
async fn get_metrics<S>(
    State(engine): State<Arc<S>>,
) -> Json<crate::metrics::MetricsSnapshot>
where
    S: EngineApi,
{
    Json(engine.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "register_pipeline",
                method: "POST",
                path: "/pipelines",
                description: "Validate and store a pipeline definition. Operator configs are checked up front; defective definitions are rejected whole.",
                request_example: Some(json!({
                    "id": "invoice-triage",
                    "name": "Invoice triage",
                    "operators": [
                        {
                            "id": "op-1",
                            "name": "keep-invoices",
                            "type": "filter",
                            "config": {"filter_condition": "item.kind == 'invoice'"}
                        },
                        {
                            "id": "op-2",
                            "name": "by-vendor",
                            "type": "reduce",
                            "config": {"reduce_key": "vendor"}
                        }
                    ]
                })),
            },
            CommandDescriptor {
                name: "execute",
                method: "POST",
                path: "/pipelines/:id/execute",
                description: "Run a pipeline. Response returns { \"success\": true, \"execution_id\", \"results\", \"metrics\" }.",
                request_example: Some(json!({
                    "input": [{"kind": "invoice", "vendor": "acme"}]
                })),
            },
            CommandDescriptor {
                name: "list_pipelines",
                method: "GET",
                path: "/pipelines",
                description: "Return the registered pipeline definitions.",
                request_example: None,
            },
            CommandDescriptor {
                name: "get_run",
                method: "GET",
                path: "/runs/:id",
                description: "Return one run record including status, output, and metrics.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return engine counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({"success": false, "error": self.message}));
        (self.status, body).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(error: EngineError) -> Self {
        let status = match &error {
            EngineError::PipelineNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidPipeline { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::OperatorFailed { .. } | EngineError::DeadlineExceeded(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            EngineError::Store(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RunOutcome;
    use crate::metrics::MetricsSnapshot;
    use crate::model::{RunMetrics, RunStatus};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct StubEngine {
        registered: Mutex<Vec<PipelineDefinition>>,
    }

    #[async_trait]
    impl EngineApi for StubEngine {
        async fn execute(
            &self,
            pipeline_id: &str,
            input: Value,
        ) -> Result<RunOutcome, EngineError> {
            if pipeline_id != "known" {
                return Err(EngineError::PipelineNotFound(pipeline_id.to_string()));
            }
            let results = crate::model::seed_records(input);
            Ok(RunOutcome {
                run_id: "run-1".into(),
                results,
                metrics: RunMetrics::default(),
            })
        }

        async fn register_pipeline(
            &self,
            definition: PipelineDefinition,
        ) -> Result<(), EngineError> {
            definition
                .validate()
                .map_err(|source| EngineError::InvalidPipeline {
                    pipeline: definition.id.clone(),
                    source,
                })?;
            self.registered.lock().await.push(definition);
            Ok(())
        }

        async fn list_pipelines(&self) -> Result<Vec<PipelineDefinition>, EngineError> {
            Ok(self.registered.lock().await.clone())
        }

        async fn get_run(&self, id: &str) -> Result<Option<Run>, EngineError> {
            if id != "run-1" {
                return Ok(None);
            }
            Ok(Some(Run {
                id: "run-1".into(),
                pipeline_id: "known".into(),
                status: RunStatus::Completed,
                input_data: json!([]),
                output_data: Some(json!({"results": []})),
                metrics: Some(RunMetrics::default()),
                started_at: "2026-01-01T00:00:00Z".into(),
                completed_at: Some("2026-01-01T00:00:01Z".into()),
                error: None,
            }))
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                runs_started: 1,
                runs_completed: 1,
                runs_failed: 0,
                operators_executed: 2,
            }
        }
    }

    async fn send(
        app: Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                builder.body(Body::from(value.to_string())).expect("request")
            }
            None => builder.body(Body::empty()).expect("request"),
        };
        let response = app.oneshot(request).await.expect("router response");
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
    async fn execute_returns_results_and_execution_id() {
        let app = create_router(Arc::new(StubEngine::default()));
        let (status, body) = send(
            app,
            Method::POST,
            "/pipelines/known/execute",
            Some(json!({"input": [{"a": 1}]})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["execution_id"], json!("run-1"));
        assert_eq!(body["results"], json!([{"a": 1}]));
    }

    #[tokio::test]
    async fn execute_unknown_pipeline_is_404_with_error_body() {
        let app = create_router(Arc::new(StubEngine::default()));
        let (status, body) = send(
            app,
            Method::POST,
            "/pipelines/ghost/execute",
            Some(json!({"input": []})),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].as_str().expect("string").contains("ghost"));
    }

    #[tokio::test]
    async fn register_then_list_round_trips() {
        let engine = Arc::new(StubEngine::default());
        let app = create_router(engine.clone());
        let definition = json!({
            "id": "p-1",
            "name": "demo",
            "operators": [{
                "id": "op-1",
                "name": "chunk",
                "type": "split",
                "config": {}
            }]
        });

        let (status, body) = send(
            app.clone(),
            Method::POST,
            "/pipelines",
            Some(definition),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], json!("p-1"));

        let (status, body) = send(app, Method::GET, "/pipelines", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pipelines"], json!([{"id": "p-1", "name": "demo", "operators": 1}]));
    }

    #[tokio::test]
    async fn invalid_definition_is_unprocessable() {
        let app = create_router(Arc::new(StubEngine::default()));
        let (status, body) = send(
            app,
            Method::POST,
            "/pipelines",
            Some(json!({
                "id": "p-bad",
                "name": "bad",
                "operators": [{
                    "id": "op-1",
                    "name": "mystery",
                    "type": "join",
                    "config": {}
                }]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn run_lookup_returns_record_or_404() {
        let app = create_router(Arc::new(StubEngine::default()));
        let (status, body) = send(app.clone(), Method::GET, "/runs/run-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("completed"));

        let (status, _body) = send(app, Method::GET, "/runs/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_and_commands_are_served() {
        let app = create_router(Arc::new(StubEngine::default()));
        let (status, body) = send(app.clone(), Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["operators_executed"], json!(2));

        let (status, body) = send(app, Method::GET, "/commands", None).await;
        assert_eq!(status, StatusCode::OK);
        let commands = body["commands"].as_array().expect("commands array");
        assert!(commands.len() >= 4);
        assert!(
            commands
                .iter()
                .any(|command| command["name"] == json!("execute"))
        );
    }
}
