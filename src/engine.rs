//! Execution engine: runs a pipeline's operators over a record sequence.
//!
//! One call to [`ExecutionEngine::execute`] is one run. The engine loads
//! the definition, persists a `running` run record, folds the operator
//! list over the evolving sequence, and persists exactly one terminal
//! update — `completed` with output and metrics, or `failed` with the
//! error. Operators execute strictly in list order; when one fails, no
//! later operator runs and its absence is visible in the metrics.
//!
//! The engine owns the run-scoped state exclusively. The pipeline store is
//! read-only and the ledger is append/update-once per unique run id, so
//! concurrent runs never contend on shared mutable state.

use crate::llm::LlmInvoker;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::model::{
    OperatorMetrics, OperatorStatus, PipelineDefinition, PipelineError, Record, Run, RunMetrics,
    RunPatch, RunStatus, seed_records,
};
use crate::operators::{self, OperatorContext, OperatorError};
use crate::store::{PipelineStore, RunLedger, StoreError};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors surfaced to callers of the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested pipeline id resolves to nothing.
    #[error("pipeline '{0}' not found")]
    PipelineNotFound(String),
    /// A definition failed validation at registration.
    #[error("pipeline '{pipeline}' rejected: {source}")]
    InvalidPipeline {
        /// Identifier of the rejected pipeline.
        pipeline: String,
        /// Validation failure detail.
        #[source]
        source: PipelineError,
    },
    /// An operator raised a pipeline-fatal error.
    #[error("operator '{operator}' failed: {source}")]
    OperatorFailed {
        /// Name of the failing operator.
        operator: String,
        /// The operator's error.
        #[source]
        source: OperatorError,
    },
    /// The run exceeded its configured wall-clock budget.
    #[error("run exceeded deadline of {0} seconds")]
    DeadlineExceeded(u64),
    /// A persistence call failed.
    #[error("store request failed: {0}")]
    Store(#[from] StoreError),
}

/// Result of a successful run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Identifier of the persisted run record.
    pub run_id: String,
    /// Final record sequence.
    pub results: Vec<Record>,
    /// Per-operator and aggregate metrics.
    pub metrics: RunMetrics,
}

/// Engine tunables, decoupled from the global config for testability.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Model applied when neither operator nor pipeline names one.
    pub default_model: String,
    /// Upper bound on concurrent per-item LLM calls inside map.
    pub map_concurrency: usize,
    /// Optional wall-clock budget for a whole run.
    pub run_deadline: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_model: crate::llm::DEFAULT_MODEL.to_string(),
            map_concurrency: 4,
            run_deadline: None,
        }
    }
}

impl EngineSettings {
    /// Derive settings from the loaded process configuration.
    pub fn from_config() -> Self {
        let config = crate::config::get_config();
        Self {
            default_model: config.default_model.clone(),
            map_concurrency: config.map_concurrency,
            run_deadline: config.run_deadline_secs.map(Duration::from_secs),
        }
    }
}

/// Abstraction over the engine used by external surfaces (HTTP).
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Execute a pipeline against caller-provided input.
    async fn execute(&self, pipeline_id: &str, input: Value) -> Result<RunOutcome, EngineError>;

    /// Validate and persist a pipeline definition.
    async fn register_pipeline(&self, definition: PipelineDefinition) -> Result<(), EngineError>;

    /// Enumerate stored pipeline definitions.
    async fn list_pipelines(&self) -> Result<Vec<PipelineDefinition>, EngineError>;

    /// Fetch one run record from the ledger.
    async fn get_run(&self, id: &str) -> Result<Option<Run>, EngineError>;

    /// Retrieve the current engine counters for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Coordinates pipeline loading, operator execution, and run persistence.
///
/// Construct the engine once near process start and share it through an
/// `Arc`; it owns long-lived handles to the stores and the LLM invoker.
pub struct ExecutionEngine {
    pipelines: Arc<dyn PipelineStore>,
    ledger: Arc<dyn RunLedger>,
    invoker: Box<dyn LlmInvoker + Send + Sync>,
    settings: EngineSettings,
    metrics: Arc<EngineMetrics>,
}

enum StageFailure {
    Operator(OperatorError),
    Deadline,
}

enum Budget {
    Unlimited,
    Remaining(Duration),
    Expired,
}

impl ExecutionEngine {
    /// Build an engine over explicit collaborators.
    pub fn new(
        pipelines: Arc<dyn PipelineStore>,
        ledger: Arc<dyn RunLedger>,
        invoker: Box<dyn LlmInvoker + Send + Sync>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            pipelines,
            ledger,
            invoker,
            settings,
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    /// Build an engine wired from the loaded process configuration.
    pub fn from_config() -> Self {
        let (pipelines, ledger) = crate::store::build_stores();
        Self::new(
            pipelines,
            ledger,
            crate::llm::get_llm_invoker(),
            EngineSettings::from_config(),
        )
    }

    /// Execute the pipeline's operators in order over the seeded sequence.
    pub async fn execute(
        &self,
        pipeline_id: &str,
        input: Value,
    ) -> Result<RunOutcome, EngineError> {
        let definition = self
            .pipelines
            .get_pipeline(pipeline_id)
            .await?
            .ok_or_else(|| EngineError::PipelineNotFound(pipeline_id.to_string()))?;

        let run_id = Uuid::new_v4().to_string();
        let run = Run {
            id: run_id.clone(),
            pipeline_id: pipeline_id.to_string(),
            status: RunStatus::Running,
            input_data: input.clone(),
            output_data: None,
            metrics: None,
            started_at: current_timestamp_rfc3339(),
            completed_at: None,
            error: None,
        };
        self.ledger.create_run(&run).await?;
        self.metrics.record_run_started();
        tracing::info!(
            run_id = %run_id,
            pipeline = %definition.name,
            operators = definition.operators.len(),
            "Run started"
        );

        let default_model = definition
            .default_model
            .as_deref()
            .unwrap_or(&self.settings.default_model);
        let ctx = OperatorContext {
            invoker: self.invoker.as_ref(),
            default_model,
            map_concurrency: self.settings.map_concurrency,
        };

        let run_started = Instant::now();
        let mut records = seed_records(input);
        let mut metrics = RunMetrics::default();

        for operator in &definition.operators {
            let input_count = records.len();
            let stage_started = Instant::now();
            let sequence = std::mem::take(&mut records);

            let outcome = match remaining_budget(self.settings.run_deadline, run_started) {
                Budget::Expired => Err(StageFailure::Deadline),
                Budget::Remaining(remaining) => {
                    match tokio::time::timeout(
                        remaining,
                        operators::apply(operator, sequence, &ctx),
                    )
                    .await
                    {
                        Ok(result) => result.map_err(StageFailure::Operator),
                        Err(_) => Err(StageFailure::Deadline),
                    }
                }
                Budget::Unlimited => operators::apply(operator, sequence, &ctx)
                    .await
                    .map_err(StageFailure::Operator),
            };
            let duration_ms = stage_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    tracing::debug!(
                        run_id = %run_id,
                        operator = %operator.name,
                        input_count,
                        output_count = output.len(),
                        duration_ms,
                        "Operator completed"
                    );
                    metrics.operators.push(OperatorMetrics {
                        operator: operator.name.clone(),
                        duration_ms,
                        input_count,
                        output_count: output.len(),
                        status: OperatorStatus::Completed,
                        error: None,
                    });
                    metrics.total_duration_ms += duration_ms;
                    metrics.operators_executed += 1;
                    records = output;
                }
                Err(failure) => {
                    let error = match &failure {
                        StageFailure::Operator(source) => source.to_string(),
                        StageFailure::Deadline => format!(
                            "run deadline of {}s exceeded",
                            self.settings
                                .run_deadline
                                .map(|deadline| deadline.as_secs())
                                .unwrap_or_default()
                        ),
                    };
                    tracing::error!(
                        run_id = %run_id,
                        operator = %operator.name,
                        error = %error,
                        "Operator failed; aborting run"
                    );
                    metrics.operators.push(OperatorMetrics {
                        operator: operator.name.clone(),
                        duration_ms,
                        input_count,
                        output_count: input_count,
                        status: OperatorStatus::Failed,
                        error: Some(error.clone()),
                    });
                    metrics.total_duration_ms += duration_ms;

                    let completed = metrics.operators_executed as u64;
                    self.ledger
                        .update_run(
                            &run_id,
                            RunPatch {
                                status: Some(RunStatus::Failed),
                                metrics: Some(metrics),
                                completed_at: Some(current_timestamp_rfc3339()),
                                error: Some(error),
                                ..RunPatch::default()
                            },
                        )
                        .await?;
                    self.metrics.record_run_failed(completed);

                    return Err(match failure {
                        StageFailure::Operator(source) => EngineError::OperatorFailed {
                            operator: operator.name.clone(),
                            source,
                        },
                        StageFailure::Deadline => EngineError::DeadlineExceeded(
                            self.settings
                                .run_deadline
                                .map(|deadline| deadline.as_secs())
                                .unwrap_or_default(),
                        ),
                    });
                }
            }
        }

        let output_values: Vec<Value> = records.iter().cloned().map(Record::into_value).collect();
        self.ledger
            .update_run(
                &run_id,
                RunPatch {
                    status: Some(RunStatus::Completed),
                    output_data: Some(json!({"results": output_values})),
                    metrics: Some(metrics.clone()),
                    completed_at: Some(current_timestamp_rfc3339()),
                    ..RunPatch::default()
                },
            )
            .await?;
        self.metrics
            .record_run_completed(metrics.operators_executed as u64);
        tracing::info!(
            run_id = %run_id,
            results = records.len(),
            total_duration_ms = metrics.total_duration_ms,
            "Run completed"
        );

        Ok(RunOutcome {
            run_id,
            results: records,
            metrics,
        })
    }
}

#[async_trait]
impl EngineApi for ExecutionEngine {
    async fn execute(&self, pipeline_id: &str, input: Value) -> Result<RunOutcome, EngineError> {
        ExecutionEngine::execute(self, pipeline_id, input).await
    }

    async fn register_pipeline(&self, definition: PipelineDefinition) -> Result<(), EngineError> {
        definition
            .validate()
            .map_err(|source| EngineError::InvalidPipeline {
                pipeline: definition.id.clone(),
                source,
            })?;
        tracing::info!(
            pipeline = %definition.id,
            operators = definition.operators.len(),
            "Pipeline registered"
        );
        self.pipelines.put_pipeline(definition).await?;
        Ok(())
    }

    async fn list_pipelines(&self) -> Result<Vec<PipelineDefinition>, EngineError> {
        Ok(self.pipelines.list_pipelines().await?)
    }

    async fn get_run(&self, id: &str) -> Result<Option<Run>, EngineError> {
        Ok(self.ledger.get_run(id).await?)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn remaining_budget(deadline: Option<Duration>, started: Instant) -> Budget {
    match deadline {
        None => Budget::Unlimited,
        Some(total) => {
            let elapsed = started.elapsed();
            if elapsed >= total {
                Budget::Expired
            } else {
                Budget::Remaining(total - elapsed)
            }
        }
    }
}

/// Current timestamp formatted for run records.
fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
