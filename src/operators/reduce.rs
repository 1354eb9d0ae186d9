//! Group-by reduction with an optional LLM fold.
//!
//! Input records are partitioned by the value of `reduce_key`; a record
//! missing the key lands in the `null` group. Without a fold prompt the
//! operator is pure aggregation and never touches the invoker. With one,
//! each group is folded by a single LLM call; a failing call degrades that
//! group to its aggregation form annotated with `_error` rather than
//! failing the pipeline.

use super::{OperatorContext, OperatorError, group_by_field};
use crate::llm::{LlmInvoker, LlmRequest};
use crate::model::{Record, ReduceConfig};
use serde_json::{Value, json};

/// Collapse the sequence to one record per distinct `reduce_key` value.
pub(crate) async fn apply(
    config: &ReduceConfig,
    records: Vec<Record>,
    ctx: &OperatorContext<'_>,
) -> Result<Vec<Record>, OperatorError> {
    if config.reduce_key.is_empty() {
        return Err(OperatorError::InvalidConfig(
            "reduce requires a non-empty reduce_key".into(),
        ));
    }

    let model = config.model.as_deref().unwrap_or(ctx.default_model);
    let groups = group_by_field(records, &config.reduce_key);

    let mut output = Vec::with_capacity(groups.len());
    for (key, items) in groups {
        let record = match &config.fold_prompt {
            Some(prompt) => fold_group(prompt, key, items, model, ctx.invoker).await,
            None => aggregate_group(key, items),
        };
        output.push(record);
    }
    Ok(output)
}

/// Pure aggregation output: `{reduce_key, items, count}`.
fn aggregate_group(key: Value, items: Vec<Record>) -> Record {
    let count = items.len();
    let mut record = Record::new();
    record.insert("reduce_key", key);
    record.insert(
        "items",
        Value::Array(items.into_iter().map(Record::into_value).collect()),
    );
    record.insert("count", Value::from(count));
    record
}

async fn fold_group(
    prompt: &str,
    key: Value,
    items: Vec<Record>,
    model: &str,
    invoker: &dyn LlmInvoker,
) -> Record {
    let count = items.len();
    let item_values: Vec<Value> = items.iter().cloned().map(Record::into_value).collect();
    let request = LlmRequest {
        prompt: prompt.to_string(),
        data: json!({"key": key.clone(), "items": item_values}),
        model: model.to_string(),
        output_schema: None,
    };

    match invoker.invoke(request).await {
        Ok(result) => {
            let mut record = Record::new();
            record.insert("reduce_key", key);
            record.merge(result);
            record.insert("_original_count", Value::from(count));
            record
        }
        Err(error) => {
            tracing::warn!(error = %error, "Reduce fold failed; emitting aggregation for group");
            let mut record = aggregate_group(key, items);
            record.insert("_error", Value::String(error.to_string()));
            record
        }
    }
}
