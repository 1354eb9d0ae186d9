//! Group records under a key into one record per distinct value.
//!
//! Pure restructuring: no LLM, no item-level failure modes. The output
//! field carrying the group key is named after `gather_key` itself, so a
//! later consumer sees the same field it grouped on.

use super::{OperatorError, group_by_field};
use crate::model::{GatherConfig, Record};
use serde_json::Value;

/// Collect records into `{<gather_key>: key, items: [...]}` groups.
pub(crate) fn apply(
    config: &GatherConfig,
    records: Vec<Record>,
) -> Result<Vec<Record>, OperatorError> {
    if config.gather_key.is_empty() {
        return Err(OperatorError::InvalidConfig(
            "gather requires a non-empty gather_key".into(),
        ));
    }

    let groups = group_by_field(records, &config.gather_key);
    let mut output = Vec::with_capacity(groups.len());
    for (key, items) in groups {
        let items: Vec<Value> = items
            .into_iter()
            .map(|record| match &config.content_key {
                Some(content_key) => record.get_or_null(content_key),
                None => record.into_value(),
            })
            .collect();

        let mut record = Record::new();
        record.insert(config.gather_key.clone(), key);
        record.insert("items", Value::Array(items));
        output.push(record);
    }
    Ok(output)
}
