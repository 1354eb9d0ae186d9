//! PostgREST-backed store for the managed-Postgres deployment.
//!
//! Pipelines live in a `pipelines` table and runs in `pipeline_runs`, both
//! addressed through the REST layer with the service-role key. Rows are
//! stored in the same shape as the model types, so decoding is direct.

use super::{PipelineStore, RunLedger, StoreError};
use crate::config::get_config;
use crate::model::{PipelineDefinition, Run, RunPatch};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const PIPELINES_TABLE: &str = "pipelines";
const RUNS_TABLE: &str = "pipeline_runs";

/// HTTP client for the PostgREST persistence backend.
pub struct RestStore {
    client: Client,
    base_url: String,
    service_key: String,
}

impl RestStore {
    /// Build a client from the process configuration.
    ///
    /// The REST backend is only selected when both the URL and key are
    /// configured, so missing values are a bootstrap defect.
    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(
            config
                .rest_store_url
                .clone()
                .expect("REST store selected without DOCPIPE_REST_URL"),
            config
                .rest_store_key
                .clone()
                .expect("REST store selected without DOCPIPE_REST_KEY"),
        )
    }

    /// Build a client against an explicit endpoint.
    pub fn new(base_url: String, service_key: String) -> Self {
        let client = Client::builder()
            .user_agent("docpipe/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to construct reqwest::Client for REST store");
        Self {
            client,
            base_url,
            service_key,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url.trim_end_matches('/'))
    }

    async fn insert<T: Serialize>(&self, table: &str, row: &T) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.table_url(table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=minimal,resolution=merge-duplicates")
            .json(row)
            .send()
            .await?;
        ensure_success(response).await
    }

    async fn select<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Vec<T>, StoreError> {
        let url = format!("{}?{query}", self.table_url(table));
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::UnexpectedStatus { status, body });
        }

        let rows: Value = response.json().await?;
        Ok(serde_json::from_value(rows)?)
    }
}

async fn ensure_success(response: Response) -> Result<(), StoreError> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = StoreError::UnexpectedStatus { status, body };
    tracing::error!(error = %error, "Store request failed");
    Err(error)
}

#[async_trait]
impl PipelineStore for RestStore {
    async fn get_pipeline(&self, id: &str) -> Result<Option<PipelineDefinition>, StoreError> {
        let rows: Vec<PipelineDefinition> = self
            .select(PIPELINES_TABLE, &format!("id=eq.{id}&select=*"))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn put_pipeline(&self, definition: PipelineDefinition) -> Result<(), StoreError> {
        self.insert(PIPELINES_TABLE, &definition).await
    }

    async fn list_pipelines(&self) -> Result<Vec<PipelineDefinition>, StoreError> {
        self.select(PIPELINES_TABLE, "select=*&order=id.asc").await
    }
}

#[async_trait]
impl RunLedger for RestStore {
    async fn create_run(&self, run: &Run) -> Result<(), StoreError> {
        self.insert(RUNS_TABLE, run).await
    }

    async fn update_run(&self, id: &str, patch: RunPatch) -> Result<(), StoreError> {
        let url = format!("{}?id=eq.{id}", self.table_url(RUNS_TABLE));
        let response = self
            .client
            .patch(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=minimal")
            .json(&patch)
            .send()
            .await?;
        ensure_success(response).await
    }

    async fn get_run(&self, id: &str) -> Result<Option<Run>, StoreError> {
        let rows: Vec<Run> = self
            .select(RUNS_TABLE, &format!("id=eq.{id}&select=*"))
            .await?;
        Ok(rows.into_iter().next())
    }
}
