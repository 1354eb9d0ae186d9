//! Predicate-based record exclusion.
//!
//! The condition is parsed into an expression AST (see [`super::predicate`])
//! and evaluated per record. Records whose evaluation raises an error — a
//! type-incompatible comparison, a non-boolean result — are excluded, the
//! same as an explicit `false`; only an unparseable condition is
//! pipeline-fatal.

use super::OperatorError;
use super::predicate::Predicate;
use crate::model::{FilterConfig, Record};

/// Keep the records satisfying the configured condition.
pub(crate) fn apply(
    config: &FilterConfig,
    records: Vec<Record>,
) -> Result<Vec<Record>, OperatorError> {
    let predicate = Predicate::parse(&config.filter_condition)?;

    let mut kept = Vec::with_capacity(records.len());
    for record in records {
        match predicate.matches(&record) {
            Ok(true) => kept.push(record),
            Ok(false) => {}
            Err(error) => {
                tracing::debug!(error = %error, "Filter evaluation failed; excluding record");
            }
        }
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Vec<serde_json::Value>) -> Vec<Record> {
        values.into_iter().map(Record::from_value).collect()
    }

    #[test]
    fn keeps_matching_records_in_order() {
        let config = FilterConfig {
            filter_condition: "item.score > 0.5".into(),
        };
        let output = apply(
            &config,
            records(vec![
                json!({"score": 0.9}),
                json!({"score": 0.1}),
                json!({"score": 0.7}),
            ]),
        )
        .expect("valid condition");
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].get("score"), Some(&json!(0.9)));
        assert_eq!(output[1].get("score"), Some(&json!(0.7)));
    }

    #[test]
    fn evaluation_errors_exclude_the_record() {
        let config = FilterConfig {
            filter_condition: "item.score > 0.5".into(),
        };
        // Second record has no score; ordering against null is an error.
        let output = apply(
            &config,
            records(vec![json!({"score": 0.9}), json!({"name": "x"})]),
        )
        .expect("valid condition");
        assert_eq!(output.len(), 1);
    }

    #[test]
    fn unparseable_condition_is_pipeline_fatal() {
        let config = FilterConfig {
            filter_condition: "item.score >>> 1".into(),
        };
        let error = apply(&config, records(vec![json!({"score": 1})]))
            .expect_err("bad syntax rejected");
        assert!(matches!(error, OperatorError::Predicate(_)));
    }

    #[test]
    fn empty_input_passes_through() {
        let config = FilterConfig {
            filter_condition: "item.a == 1".into(),
        };
        assert!(apply(&config, Vec::new()).expect("valid").is_empty());
    }
}
