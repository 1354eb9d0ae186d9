//! The operator set: stateless transformations over the record sequence.
//!
//! Each operator maps `(config, input sequence)` to an output sequence.
//! Operators never share state; everything they need beyond their config
//! arrives through the [`OperatorContext`]. Errors returned from
//! [`apply`] are pipeline-fatal — item- and group-level failures are
//! absorbed inside the individual operators according to their own
//! failure policies.

use crate::llm::LlmInvoker;
use crate::model::{OperatorConfig, OperatorKind, Record};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

pub mod filter;
pub mod gather;
pub mod map;
pub mod predicate;
pub mod reduce;
pub mod resolve;
pub mod split;
pub mod unnest;

/// Pipeline-fatal errors raised by operators.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// The engine has no implementation for the declared operator type.
    #[error("unsupported operator type '{0}'")]
    UnsupportedKind(String),
    /// A filter condition failed to parse.
    #[error("invalid filter condition: {0}")]
    Predicate(#[from] predicate::PredicateError),
    /// A config decoded but cannot drive the operator.
    #[error("invalid operator configuration: {0}")]
    InvalidConfig(String),
}

/// Run-scoped collaborators shared by every operator of one run.
pub struct OperatorContext<'a> {
    /// LLM backend used by map, reduce folds, and resolve merges.
    pub invoker: &'a dyn LlmInvoker,
    /// Model applied when an operator does not name its own.
    pub default_model: &'a str,
    /// Upper bound on concurrent per-item LLM calls inside map.
    pub map_concurrency: usize,
}

/// Apply one operator to the record sequence.
pub async fn apply(
    operator: &OperatorConfig,
    records: Vec<Record>,
    ctx: &OperatorContext<'_>,
) -> Result<Vec<Record>, OperatorError> {
    match &operator.kind {
        OperatorKind::Map(config) => Ok(map::apply(config, records, ctx).await),
        OperatorKind::Filter(config) => filter::apply(config, records),
        OperatorKind::Reduce(config) => reduce::apply(config, records, ctx).await,
        OperatorKind::Resolve(config) => resolve::apply(config, records, ctx).await,
        OperatorKind::Gather(config) => gather::apply(config, records),
        OperatorKind::Unnest(config) => unnest::apply(config, records),
        OperatorKind::Split(config) => Ok(split::apply(config, records)),
        OperatorKind::Unknown(kind) => Err(OperatorError::UnsupportedKind(kind.clone())),
    }
}

/// Partition records by the value of `key`, first-occurrence order.
///
/// Records missing the key fall into the `null` group. Group keys are
/// compared by value equality via their canonical JSON rendering.
pub(crate) fn group_by_field(records: Vec<Record>, key: &str) -> Vec<(Value, Vec<Record>)> {
    let mut groups: Vec<(Value, Vec<Record>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let value = record.get_or_null(key);
        let canonical = value.to_string();
        match index.get(&canonical) {
            Some(&slot) => groups[slot].1.push(record),
            None => {
                index.insert(canonical, groups.len());
                groups.push((value, vec![record]));
            }
        }
    }

    groups
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use serde_json::json;

    fn records(values: Vec<serde_json::Value>) -> Vec<Record> {
        values.into_iter().map(Record::from_value).collect()
    }

    #[test]
    fn grouping_preserves_first_occurrence_order() {
        let groups = group_by_field(
            records(vec![
                json!({"k": "b"}),
                json!({"k": "a"}),
                json!({"k": "b"}),
            ]),
            "k",
        );
        let keys: Vec<_> = groups.iter().map(|(key, _)| key.clone()).collect();
        assert_eq!(keys, vec![json!("b"), json!("a")]);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn grouping_collects_missing_keys_under_null() {
        let groups = group_by_field(
            records(vec![json!({"k": 1}), json!({"other": 2}), json!({})]),
            "k",
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].0, serde_json::Value::Null);
        assert_eq!(groups[1].1.len(), 2);
    }

    #[tokio::test]
    async fn unknown_kind_is_pipeline_fatal() {
        let invoker = testing::StubInvoker::failing("unused");
        let ctx = testing::context(&invoker);
        let operator: crate::model::OperatorConfig = serde_json::from_value(json!({
            "id": "op-1",
            "name": "mystery",
            "type": "join",
            "config": {}
        }))
        .expect("decodes");
        let error = apply(&operator, Vec::new(), &ctx)
            .await
            .expect_err("unknown kinds fail");
        assert!(matches!(error, OperatorError::UnsupportedKind(kind) if kind == "join"));
    }
}
