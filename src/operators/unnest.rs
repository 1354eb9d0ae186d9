//! Expand an array field into one record per element.
//!
//! The inverse of gather at the field level: each output record is a
//! shallow copy of its source with the array field replaced by a single
//! element. Records whose field is not an array pass through unchanged, so
//! output cardinality is the sum over inputs of the array length (or one).

use super::OperatorError;
use crate::model::{Record, UnnestConfig};
use serde_json::Value;

/// Expand the configured array field across records.
pub(crate) fn apply(
    config: &UnnestConfig,
    records: Vec<Record>,
) -> Result<Vec<Record>, OperatorError> {
    if config.unnest_key.is_empty() {
        return Err(OperatorError::InvalidConfig(
            "unnest requires a non-empty unnest_key".into(),
        ));
    }

    let mut output = Vec::with_capacity(records.len());
    for record in records {
        match record.get(&config.unnest_key).cloned() {
            Some(Value::Array(elements)) => {
                for element in elements {
                    let mut copy = record.clone();
                    copy.insert(config.unnest_key.clone(), element);
                    output.push(copy);
                }
            }
            _ => output.push(record),
        }
    }
    Ok(output)
}
