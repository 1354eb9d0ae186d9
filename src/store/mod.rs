//! Persistence boundaries: the pipeline store and the run ledger.
//!
//! The engine only ever reads pipeline definitions and writes run records,
//! so both collaborators are narrow traits. The in-memory implementations
//! back local development and tests; the REST implementation speaks the
//! PostgREST dialect of the managed-Postgres backend.

use crate::config::{StoreBackend, get_config};
use crate::model::{PipelineDefinition, Run, RunPatch};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

pub mod memory;
pub mod rest;

/// Errors returned by persistence backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend responded with an unexpected status code.
    #[error("Unexpected store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// A stored row could not be decoded into its model type.
    #[error("Failed to decode stored record: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Read/write access to pipeline definitions.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Fetch one definition by id, `None` when absent.
    async fn get_pipeline(&self, id: &str) -> Result<Option<PipelineDefinition>, StoreError>;

    /// Insert or replace a definition.
    async fn put_pipeline(&self, definition: PipelineDefinition) -> Result<(), StoreError>;

    /// Enumerate all stored definitions.
    async fn list_pipelines(&self) -> Result<Vec<PipelineDefinition>, StoreError>;
}

/// Durable record of executions; created once, patched once at terminal state.
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Persist a freshly created run.
    async fn create_run(&self, run: &Run) -> Result<(), StoreError>;

    /// Apply a partial update to an existing run.
    async fn update_run(&self, id: &str, patch: RunPatch) -> Result<(), StoreError>;

    /// Fetch one run by id, `None` when absent.
    async fn get_run(&self, id: &str) -> Result<Option<Run>, StoreError>;
}

/// Build the store pair matching the configured backend.
pub fn build_stores() -> (Arc<dyn PipelineStore>, Arc<dyn RunLedger>) {
    let config = get_config();
    match config.store_backend {
        StoreBackend::Memory => (
            Arc::new(memory::MemoryPipelineStore::new()),
            Arc::new(memory::MemoryRunLedger::new()),
        ),
        StoreBackend::Rest => {
            let store = Arc::new(rest::RestStore::from_config());
            (store.clone(), store)
        }
    }
}
