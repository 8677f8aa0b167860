//! Best-effort normalization of serving-endpoint responses.
//!
//! The upstream endpoint does not fix its response envelope: the structured
//! payload may arrive as a top-level object, wrapped under `raw_response` /
//! `content` / `text` / `result`, buried inside an `output` list of
//! message-like items, or embedded as JSON inside free-form prose. This
//! module turns any of those into a [`ParsedResult`] and never fails: a
//! payload nothing recognizes degrades to a placeholder with the raw value
//! retained for inspection.
//!
//! Extraction is an ordered chain of matchers with first-success semantics.
//! Supporting a new upstream shape means adding one matcher to
//! [`extract_canonical`].

use serde_json::{Map, Value};

use crate::models::{DataProductEntry, ParsedResult};

/// Entries shown to the user; upstream order is preserved, never re-ranked.
pub const MAX_DISPLAY_RESULTS: usize = 3;

/// Envelope nesting levels walked before giving up.
const MAX_DEPTH: usize = 4;

/// Normalize a raw endpoint response into a [`ParsedResult`].
///
/// Pure and infallible: identical input yields identical output, and every
/// failure mode collapses into [`ParsedResult::placeholder`].
pub fn normalize(raw: &Value) -> ParsedResult {
    match extract_canonical(raw, 0) {
        Some(canonical) => from_canonical(&canonical, raw),
        None => {
            tracing::warn!("response matched no known envelope shape; returning placeholder");
            ParsedResult::placeholder(raw.clone())
        }
    }
}

/// True when a decoded object carries the recognized top-level keys.
fn is_canonical(map: &Map<String, Value>) -> bool {
    map.contains_key("query_understanding") || map.contains_key("results")
}

/// Walk the known envelope shapes looking for the canonical object.
fn extract_canonical(value: &Value, depth: usize) -> Option<Map<String, Value>> {
    if depth > MAX_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => {
            if is_canonical(map) {
                return Some(map.clone());
            }
            // Responses wrapped by an intermediate client layer
            if let Some(inner) = map.get("raw_response") {
                if let Some(found) = extract_canonical(inner, depth + 1) {
                    return Some(found);
                }
            }
            // Agent envelope: list of message-like items under "output"
            if let Some(Value::Array(items)) = map.get("output") {
                if let Some(found) = scan_message_list(items, depth + 1) {
                    return Some(found);
                }
            }
            for key in ["content", "text", "result"] {
                if let Some(inner) = map.get(key) {
                    if let Some(found) = extract_canonical(inner, depth + 1) {
                        return Some(found);
                    }
                }
            }
            None
        }
        Value::Array(items) => scan_message_list(items, depth),
        Value::String(text) => extract_from_text(text),
        _ => None,
    }
}

/// Scan a list of message-like items, newest first, for embedded JSON.
///
/// Items may be full messages (`role`/`content`) or bare content blocks
/// (`text`/`output_text`). Non-assistant messages are skipped.
fn scan_message_list(items: &[Value], depth: usize) -> Option<Map<String, Value>> {
    if depth > MAX_DEPTH {
        return None;
    }
    for item in items.iter().rev() {
        let Some(obj) = item.as_object() else {
            continue;
        };
        if let Some(role) = obj.get("role").and_then(Value::as_str) {
            if role != "assistant" {
                continue;
            }
        }
        for key in ["text", "output_text"] {
            if let Some(text) = obj.get(key).and_then(Value::as_str) {
                if let Some(found) = extract_from_text(text) {
                    return Some(found);
                }
            }
        }
        match obj.get("content") {
            Some(Value::String(text)) => {
                if let Some(found) = extract_from_text(text) {
                    return Some(found);
                }
            }
            Some(Value::Array(blocks)) => {
                if let Some(found) = scan_message_list(blocks, depth + 1) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}

// ─── Text extraction ─────────────────────────────────────

/// Pull the canonical object out of free-form text: direct decode first,
/// then the first balanced `{...}` span that decodes to recognized keys.
fn extract_from_text(text: &str) -> Option<Map<String, Value>> {
    let cleaned = strip_code_fences(text);
    let trimmed = cleaned.trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        if is_canonical(&map) {
            return Some(map);
        }
    }

    // Scan successive `{` positions so prose containing an unrelated object
    // before the real one still parses.
    let mut rest = trimmed;
    while let Some(pos) = rest.find('{') {
        let candidate = &rest[pos..];
        if let Some(span) = balanced_object_span(candidate) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(span) {
                if is_canonical(&map) {
                    return Some(map);
                }
            }
        }
        rest = &candidate[1..];
    }
    None
}

/// Return the first balanced `{...}` span of `text`, which must start at a
/// `{`. String literals and escapes are respected; no JSON parser involved.
fn balanced_object_span(text: &str) -> Option<&str> {
    let mut width = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => width += 1,
            b'}' => {
                width = width.checked_sub(1)?;
                if width == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove markdown code-fence markers the model wraps JSON in.
fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "")
}

// ─── Canonical object → ParsedResult ─────────────────────

fn from_canonical(map: &Map<String, Value>, raw: &Value) -> ParsedResult {
    let results = map
        .get("results")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .take(MAX_DISPLAY_RESULTS)
                .map(entry_from_value)
                .collect()
        })
        .unwrap_or_default();

    ParsedResult {
        query_understanding: string_field(map, "query_understanding"),
        results,
        recommended_action: string_field(map, "recommended_action"),
        raw_response: raw.clone(),
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Coerce one upstream result entry, defaulting every missing field.
fn entry_from_value(value: &Value) -> DataProductEntry {
    let Some(map) = value.as_object() else {
        return DataProductEntry::default();
    };

    let name = map
        .get("name")
        .or_else(|| map.get("data_product_name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    DataProductEntry {
        name,
        full_identifier: string_field(map, "full_identifier"),
        description: string_field(map, "description"),
        completeness_score: map.get("completeness_score").and_then(coerce_score),
        health_status: map
            .get("health_status")
            .and_then(Value::as_str)
            .map(str::to_string),
        table_names: coerce_table_names(map.get("table_names")),
    }
}

/// Accept a fraction in [0,1], a percentage, or a numeric string ("92%").
fn coerce_score(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok()?,
        _ => return None,
    };
    let n = if n > 1.0 { n / 100.0 } else { n };
    Some(n.clamp(0.0, 1.0))
}

/// Accept a list of names, a list of objects carrying a name key, or a
/// single string.
fn coerce_table_names(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(m) => ["table_name", "name"]
                    .iter()
                    .find_map(|k| m.get(*k).and_then(Value::as_str))
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
