//! Parsing of free-form model replies into product records
//!
//! Models are asked for a bare JSON array but regularly wrap it in prose
//! or a fenced code block. The parser accepts either shape.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::domain::ProductRecord;

#[derive(Error, Debug)]
pub enum ReplyParseError {
    #[error("Embedded JSON array is invalid: {source}")]
    InvalidEmbeddedArray {
        #[source]
        source: serde_json::Error,
    },

    #[error("Embedded JSON is not an array")]
    NotAnArray,
}

/// Extract product records from a reply.
///
/// - the whole text is a JSON array: use it
/// - otherwise the slice between the first `[` and the last `]` must parse
/// - no bracketed slice at all: `Ok(None)`, a soft failure
pub fn parse_reply(text: &str) -> Result<Option<Vec<ProductRecord>>, ReplyParseError> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(Some(records_from(items)));
    }

    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        return Ok(None);
    };
    if end < start {
        return Ok(None);
    }

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Array(items)) => Ok(Some(records_from(items))),
        Ok(_) => Err(ReplyParseError::NotAnArray),
        Err(source) => Err(ReplyParseError::InvalidEmbeddedArray { source }),
    }
}

fn records_from(items: Vec<Value>) -> Vec<ProductRecord> {
    let total = items.len();
    let records: Vec<ProductRecord> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(
                map.into_iter()
                    .map(|(key, value)| (key, value_to_text(value)))
                    .collect(),
            ),
            _ => None,
        })
        .collect();

    if records.len() < total {
        warn!(
            skipped = total - records.len(),
            "Reply array contained non-object items"
        );
    }
    records
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
