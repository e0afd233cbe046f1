//! Classifier response parsing
//!
//! Models wrap JSON in prose or code fences often enough that the parser first
//! isolates the JSON object, then reads facets leniently: strings are trimmed,
//! arrays of strings are joined with `|`, anything else reads as empty.

use crate::error::ClassifierError;
use crate::types::{ClassificationResult, FACET_DELIMITER};
use serde_json::Value;
use tracing::debug;

/// Isolate the JSON object in a model response
///
/// Code fences are unwrapped first; otherwise the slice runs from the first `{`
/// to the last `}`.
pub fn extract_json_block(response: &str) -> Result<&str, ClassifierError> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') {
                return Ok(block);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return Ok(&trimmed[start..=end]);
        }
    }

    Err(ClassifierError::MalformedResponse(
        "No JSON object found in classifier response".to_string(),
    ))
}

fn parse_object(response: &str) -> Result<Value, ClassifierError> {
    let block = extract_json_block(response)?;
    serde_json::from_str(block)
        .map_err(|e| ClassifierError::MalformedResponse(format!("Invalid JSON: {}", e)))
}

fn facet(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(&FACET_DELIMITER.to_string()),
        _ => String::new(),
    }
}

fn result_from(object: &Value) -> ClassificationResult {
    ClassificationResult::new(
        facet(object.get("category")),
        facet(object.get("product_type")),
        facet(object.get("product_on_pages")),
    )
}

/// Parse a single-product answer `{"category", "product_type", "product_on_pages"}`
pub fn parse_single(response: &str) -> Result<ClassificationResult, ClassifierError> {
    let object = parse_object(response)?;
    if !object.is_object() {
        return Err(ClassifierError::MalformedResponse(
            "Classifier response is not a JSON object".to_string(),
        ));
    }
    Ok(result_from(&object))
}

/// Parse a batch answer `{"classifications": [{"product_index": 1, ...}]}`
///
/// Returns `count` slots. Items are matched by 1-based `product_index`; slots
/// without a matching item stay `None`. Out-of-range and repeated indices are
/// ignored (first wins).
pub fn parse_batch(
    response: &str,
    count: usize,
) -> Result<Vec<Option<ClassificationResult>>, ClassifierError> {
    let object = parse_object(response)?;
    let items = object
        .get("classifications")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ClassifierError::MalformedResponse(
                "Batch response lacks a classifications array".to_string(),
            )
        })?;

    let mut slots: Vec<Option<ClassificationResult>> = vec![None; count];

    for item in items {
        let Some(index) = product_index(item) else {
            debug!("Skipping batch item without product_index");
            continue;
        };
        if index == 0 || index > count {
            debug!(index, count, "Skipping out-of-range product_index");
            continue;
        }
        let slot = &mut slots[index - 1];
        if slot.is_none() {
            *slot = Some(result_from(item));
        }
    }

    Ok(slots)
}

fn product_index(item: &Value) -> Option<usize> {
    match item.get("product_index")? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
