//! Per-item LLM transformation.
//!
//! Every record is sent through the invoker together with the configured
//! prompt; the returned object is shallow-merged into the record, with
//! returned keys overwriting existing ones. A failing invocation never
//! aborts the operator: the item is kept, annotated with `_error`, and
//! processing continues. Output cardinality therefore always equals input
//! cardinality.
//!
//! Items are independent, so calls fan out through a bounded,
//! order-preserving buffer; a concurrency of one reproduces strictly
//! sequential behavior.

use super::OperatorContext;
use crate::llm::{LlmInvoker, LlmRequest};
use crate::model::{MapConfig, Record};
use futures_util::{StreamExt, stream};
use serde_json::Value;

/// Transform each record through the LLM, preserving order and cardinality.
pub(crate) async fn apply(
    config: &MapConfig,
    records: Vec<Record>,
    ctx: &OperatorContext<'_>,
) -> Vec<Record> {
    let model = config.model.as_deref().unwrap_or(ctx.default_model);
    let concurrency = ctx.map_concurrency.max(1);

    stream::iter(
        records
            .into_iter()
            .map(|record| transform_one(config, record, model, ctx.invoker)),
    )
    .buffered(concurrency)
    .collect()
    .await
}

async fn transform_one(
    config: &MapConfig,
    mut record: Record,
    model: &str,
    invoker: &dyn LlmInvoker,
) -> Record {
    let request = LlmRequest {
        prompt: config.prompt.clone(),
        data: record.clone().into_value(),
        model: model.to_string(),
        output_schema: config.output_schema.clone(),
    };

    match invoker.invoke(request).await {
        Ok(result) => record.merge(result),
        Err(error) => {
            tracing::warn!(error = %error, "Map invocation failed; keeping item with _error");
            record.insert("_error", Value::String(error.to_string()));
        }
    }
    record
}
