//! Response text handling shared by the tasks

use crate::submission::Submission;

/// Extract a JSON object from generated response text.
///
/// Generators sometimes wrap JSON in markdown code fences or surround
/// it with explanation text. This function tries, in order:
/// 1. Direct parse (response is pure JSON)
/// 2. Extract from ```json ... ``` or ``` ... ``` fenced block
/// 3. Find the first `{` to last `}` span and parse that
pub(super) fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();

    // Try 1: Direct parse
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if v.is_object() {
            return Some(v);
        }
    }

    // Try 2: Extract from fenced code block
    let fenced = if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        after.find("```").map(|end| &after[..end])
    } else if let Some(start) = trimmed.find("```\n") {
        let after = &trimmed[start + 4..];
        after.find("```").map(|end| &after[..end])
    } else {
        None
    };

    if let Some(block) = fenced {
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(block.trim()) {
            if v.is_object() {
                return Some(v);
            }
        }
    }

    // Try 3: Find first { to last }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<serde_json::Value>(&trimmed[start..=end]) {
                if v.is_object() {
                    return Some(v);
                }
            }
        }
    }

    None
}

/// Shared generation context: the record content every task grounds its
/// request in. Individual tasks add their own fields on top.
pub(super) fn record_context(record: &Submission) -> serde_json::Value {
    let answers: Vec<serde_json::Value> = record
        .answers
        .iter()
        .map(|a| {
            let mut entry = serde_json::json!({
                "question": a.question_text,
                "answer": a.label,
                "code": a.value,
            });
            if let Some(text) = &a.additional_text {
                entry["additional_text"] = serde_json::Value::String(text.clone());
            }
            entry
        })
        .collect();

    let mut payload = serde_json::json!({
        "segment_family": record.segment_family.as_str(),
        "contact": record.contact_details,
        "answers": answers,
    });

    if let Some(classification) = &record.classification {
        payload["classification"] =
            serde_json::to_value(classification).expect("classification serializes");
    }

    payload
}
