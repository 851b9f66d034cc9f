//! Turns whatever the classifier sent back into validated `(tag, score)` pairs.
//!
//! Order of preference: a structured payload, then the first balanced JSON
//! object found in the text once code fences are stripped. Anything else is
//! reported as malformed so the tagger can retry.

use broll_common::{ClassifierError, ScoredTag};
use serde_json::Value;
use std::collections::HashMap;
use crate::llm::ClassifierReply;
use crate::vocabulary::TagVocabulary;

pub fn parse_reply(reply: &ClassifierReply) -> Result<Value, ClassifierError> {
    if let Some(structured @ Value::Object(_)) = &reply.structured {
        return Ok(structured.clone());
    }

    let text = reply.text.as_deref()
        .ok_or_else(|| ClassifierError::Malformed("reply carried no usable payload".into()))?;

    let body = strip_fences(text);
    let object = first_json_object(body)
        .ok_or_else(|| ClassifierError::Malformed(format!("no JSON object in reply: {}", preview(text))))?;

    serde_json::from_str(object)
        .map_err(|e| ClassifierError::Malformed(format!("invalid JSON in reply: {} - {}", e, preview(object))))
}

/// Removes a leading ```json / ``` fence and a trailing ``` fence.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = match trimmed.get(..7) {
        Some(head) if head.eq_ignore_ascii_case("```json") => &trimmed[7..],
        _ => trimmed.strip_prefix("```").unwrap_or(trimmed),
    };
    without_open.trim().strip_suffix("```").unwrap_or(without_open).trim()
}

/// Slice of the first `{...}` whose braces balance, skipping braces that
/// appear inside string literals.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extracts `tags` from a parsed payload, keeping only entries whose id is in
/// the vocabulary and whose score is a number. Scores are clamped to [0, 1];
/// a repeated id keeps its best score. Result is sorted by score, descending.
pub fn validate_tags(payload: &Value, vocabulary: &TagVocabulary) -> Result<Vec<ScoredTag>, ClassifierError> {
    let entries = payload.get("tags")
        .and_then(Value::as_array)
        .ok_or_else(|| ClassifierError::Malformed("payload has no \"tags\" array".into()))?;

    let mut best: HashMap<&str, usize> = HashMap::new();
    let mut tags: Vec<ScoredTag> = Vec::with_capacity(entries.len());
    let mut dropped = 0usize;

    for entry in entries {
        let id = entry.get("id").and_then(Value::as_str);
        let score = entry.get("score").and_then(Value::as_f64);
        let (id, score) = match (id, score) {
            (Some(id), Some(score)) if vocabulary.contains(id) && score.is_finite() => (id, score.clamp(0.0, 1.0)),
            _ => {
                dropped += 1;
                continue;
            }
        };

        match best.get(id) {
            Some(&idx) => {
                if score > tags[idx].confidence {
                    tags[idx].confidence = score;
                }
            }
            None => {
                best.insert(id, tags.len());
                tags.push(ScoredTag::new(id, score));
            }
        }
    }

    if dropped > 0 {
        tracing::debug!("Dropped {} invalid tag entries from classifier reply", dropped);
    }

    tags.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    Ok(tags)
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
