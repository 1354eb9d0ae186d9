//! Duplicate resolution over exact-matching candidate groups.
//!
//! Candidates are found syntactically: a single left-to-right pass groups
//! each unprocessed record with every later record whose values at all
//! resolution keys are exactly equal. Semantic judgment only happens in the
//! optional LLM comparison step, which merges a group into one record. No
//! input record is ever silently dropped: singleton groups pass through
//! unchanged, merged groups carry `_resolved_from` with the group size, and
//! a failed comparison lets the whole group through unmerged.

use super::{OperatorContext, OperatorError};
use crate::llm::{LlmInvoker, LlmRequest};
use crate::model::{Record, ResolveConfig};
use serde_json::{Value, json};

/// Collapse exact-duplicate candidate groups, optionally via LLM merge.
pub(crate) async fn apply(
    config: &ResolveConfig,
    records: Vec<Record>,
    ctx: &OperatorContext<'_>,
) -> Result<Vec<Record>, OperatorError> {
    if config.resolution_keys.is_empty() {
        return Err(OperatorError::InvalidConfig(
            "resolve requires at least one resolution key".into(),
        ));
    }

    let model = config.model.as_deref().unwrap_or(ctx.default_model);
    let mut processed = vec![false; records.len()];
    let mut output = Vec::with_capacity(records.len());

    for i in 0..records.len() {
        if processed[i] {
            continue;
        }
        processed[i] = true;

        let mut group = vec![i];
        for j in (i + 1)..records.len() {
            if !processed[j] && keys_match(&records[i], &records[j], &config.resolution_keys) {
                processed[j] = true;
                group.push(j);
            }
        }

        if group.len() == 1 {
            output.push(records[i].clone());
            continue;
        }

        match &config.comparison_prompt {
            Some(prompt) => {
                let candidates: Vec<Record> =
                    group.iter().map(|&idx| records[idx].clone()).collect();
                match merge_group(prompt, &candidates, model, ctx.invoker).await {
                    Ok(merged) => output.push(merged),
                    Err(error) => {
                        tracing::warn!(
                            error = %error,
                            candidates = candidates.len(),
                            "Resolve comparison failed; passing group through unmerged"
                        );
                        output.extend(candidates);
                    }
                }
            }
            None => {
                // Exact duplicates on every key; keep the first record as
                // the representative and record how many it stands for.
                let mut representative = records[group[0]].clone();
                representative.insert("_resolved_from", Value::from(group.len()));
                output.push(representative);
            }
        }
    }

    Ok(output)
}

fn keys_match(left: &Record, right: &Record, keys: &[String]) -> bool {
    keys.iter()
        .all(|key| left.get_or_null(key) == right.get_or_null(key))
}

async fn merge_group(
    prompt: &str,
    candidates: &[Record],
    model: &str,
    invoker: &dyn LlmInvoker,
) -> Result<Record, crate::llm::LlmError> {
    let candidate_values: Vec<Value> = candidates
        .iter()
        .cloned()
        .map(Record::into_value)
        .collect();
    let request = LlmRequest {
        prompt: prompt.to_string(),
        data: json!({"candidates": candidate_values}),
        model: model.to_string(),
        output_schema: None,
    };

    let result = invoker.invoke(request).await?;
    let mut merged = Record::from(result);
    merged.insert("_resolved_from", Value::from(candidates.len()));
    Ok(merged)
}
