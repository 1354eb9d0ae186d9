//! In-process store implementations for development and tests.

use super::{PipelineStore, RunLedger, StoreError};
use crate::model::{PipelineDefinition, Run, RunPatch};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Pipeline store backed by a process-local map.
#[derive(Default)]
pub struct MemoryPipelineStore {
    pipelines: RwLock<HashMap<String, PipelineDefinition>>,
}

impl MemoryPipelineStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineStore for MemoryPipelineStore {
    async fn get_pipeline(&self, id: &str) -> Result<Option<PipelineDefinition>, StoreError> {
        Ok(self.pipelines.read().await.get(id).cloned())
    }

    async fn put_pipeline(&self, definition: PipelineDefinition) -> Result<(), StoreError> {
        self.pipelines
            .write()
            .await
            .insert(definition.id.clone(), definition);
        Ok(())
    }

    async fn list_pipelines(&self) -> Result<Vec<PipelineDefinition>, StoreError> {
        let mut pipelines: Vec<PipelineDefinition> =
            self.pipelines.read().await.values().cloned().collect();
        pipelines.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(pipelines)
    }
}

/// Run ledger backed by a process-local map.
#[derive(Default)]
pub struct MemoryRunLedger {
    runs: RwLock<HashMap<String, Run>>,
}

impl MemoryRunLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryRunLedger {
    /// Identifiers of every stored run, for test assertions.
    pub(crate) async fn get_run_ids(&self) -> Vec<String> {
        self.runs.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl RunLedger for MemoryRunLedger {
    async fn create_run(&self, run: &Run) -> Result<(), StoreError> {
        self.runs
            .write()
            .await
            .insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn update_run(&self, id: &str, patch: RunPatch) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        if let Some(run) = runs.get_mut(id) {
            if let Some(status) = patch.status {
                run.status = status;
            }
            if let Some(output_data) = patch.output_data {
                run.output_data = Some(output_data);
            }
            if let Some(metrics) = patch.metrics {
                run.metrics = Some(metrics);
            }
            if let Some(completed_at) = patch.completed_at {
                run.completed_at = Some(completed_at);
            }
            if let Some(error) = patch.error {
                run.error = Some(error);
            }
        }
        Ok(())
    }

    async fn get_run(&self, id: &str) -> Result<Option<Run>, StoreError> {
        Ok(self.runs.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunStatus;
    use serde_json::json;

    fn sample_run(id: &str) -> Run {
        Run {
            id: id.to_string(),
            pipeline_id: "p-1".into(),
            status: RunStatus::Running,
            input_data: json!([{"a": 1}]),
            output_data: None,
            metrics: None,
            started_at: "2026-01-01T00:00:00Z".into(),
            completed_at: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn pipelines_round_trip() {
        let store = MemoryPipelineStore::new();
        let definition: PipelineDefinition = serde_json::from_value(json!({
            "id": "p-1",
            "name": "demo",
            "operators": []
        }))
        .expect("decodes");

        store.put_pipeline(definition.clone()).await.expect("put");
        let fetched = store.get_pipeline("p-1").await.expect("get");
        assert_eq!(fetched, Some(definition));
        assert!(store.get_pipeline("missing").await.expect("get").is_none());
        assert_eq!(store.list_pipelines().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn run_patch_applies_terminal_fields() {
        let ledger = MemoryRunLedger::new();
        ledger.create_run(&sample_run("r-1")).await.expect("create");

        ledger
            .update_run(
                "r-1",
                RunPatch {
                    status: Some(RunStatus::Completed),
                    output_data: Some(json!({"results": []})),
                    completed_at: Some("2026-01-01T00:00:05Z".into()),
                    ..RunPatch::default()
                },
            )
            .await
            .expect("update");

        let run = ledger.get_run("r-1").await.expect("get").expect("present");
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.output_data, Some(json!({"results": []})));
        assert_eq!(run.completed_at.as_deref(), Some("2026-01-01T00:00:05Z"));
    }

    #[tokio::test]
    async fn patching_unknown_run_is_a_no_op() {
        let ledger = MemoryRunLedger::new();
        ledger
            .update_run("ghost", RunPatch::default())
            .await
            .expect("update");
        assert!(ledger.get_run("ghost").await.expect("get").is_none());
    }
}
