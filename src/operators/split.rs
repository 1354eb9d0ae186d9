//! Split string content on paragraph boundaries.
//!
//! Each record whose content field holds a string is fanned out into one
//! record per paragraph (blank-line-separated block), annotated with its
//! chunk index and the total chunk count. Empty fragments are dropped, and
//! non-string content passes through as a single untouched record.

use crate::model::{Record, SplitConfig};
use serde_json::Value;

/// Fan records out into one record per paragraph of their content.
pub(crate) fn apply(config: &SplitConfig, records: Vec<Record>) -> Vec<Record> {
    let mut output = Vec::with_capacity(records.len());
    for record in records {
        match record.get(&config.content_key) {
            Some(Value::String(text)) => {
                let fragments = split_paragraphs(text);
                let total = fragments.len();
                for (index, fragment) in fragments.into_iter().enumerate() {
                    let mut copy = record.clone();
                    copy.insert(config.content_key.clone(), Value::String(fragment));
                    copy.insert("_chunk_index", Value::from(index));
                    copy.insert("_total_chunks", Value::from(total));
                    output.push(copy);
                }
            }
            _ => output.push(record),
        }
    }
    output
}

/// Split text into paragraphs at blank lines, dropping empty blocks.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                fragments.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        fragments.push(current.join("\n"));
    }
    fragments
}
