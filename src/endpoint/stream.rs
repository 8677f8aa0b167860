use anyhow::{Context, Result};
use futures_util::stream::{Stream, StreamExt};
use serde_json::{json, Value};
use std::pin::Pin;

use crate::config::Config;
use crate::models::Message;

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Query the serving endpoint in streaming mode.
/// Returns a stream of text deltas (one per upstream chunk); the caller
/// accumulates them and normalizes the full text once the stream ends.
pub async fn query_endpoint_stream(
    client: &reqwest::Client,
    config: &Config,
    token: &str,
    messages: &[Message],
) -> Result<DeltaStream> {
    let url = config.invocations_url();

    let body = json!({
        "input": messages,
        "max_output_tokens": config.max_output_tokens,
        "stream": true,
    });

    let resp = client
        .post(&url)
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .context("Failed to reach the serving endpoint for streaming")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Serving endpoint returned {status}: {body}");
    }

    let stream = stream_lines(resp.bytes_stream()).filter_map(|line_result| async move {
        match line_result {
            Ok(line) => parse_sse_line(&line),
            Err(e) => Some(Err(e)),
        }
    });

    Ok(Box::pin(stream))
}

/// Parse a single SSE line from the endpoint. Returns:
/// - Some(Ok(text)) for content deltas
/// - Some(Err(e)) for undecodable chunks
/// - None to skip (non-data lines, [DONE], chunks with no text)
fn parse_sse_line(line: &str) -> Option<Result<String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let data = line.strip_prefix("data: ")?.trim();
    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(chunk) => {
            let text = extract_chunk_text(&chunk)?;
            if text.is_empty() {
                return None;
            }
            Some(Ok(text))
        }
        Err(e) => Some(Err(anyhow::anyhow!("Failed to parse stream chunk: {e}"))),
    }
}

/// Extract the text delta from one decoded stream chunk. The endpoint emits
/// several chunk shapes depending on task type; each is tried in turn.
pub fn extract_chunk_text(chunk: &Value) -> Option<String> {
    // OpenAI-style: choices[0].delta.content
    if let Some(content) = chunk
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        return Some(content.to_string());
    }

    // Direct content: a string or a list of text blocks
    if let Some(content) = chunk.get("content") {
        match content {
            Value::String(s) => return Some(s.clone()),
            Value::Array(blocks) => return Some(join_text_blocks(blocks)),
            _ => {}
        }
    }

    // Direct text field
    if let Some(text) = chunk.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }

    // Agent output: a string or a nested object with text/content
    if let Some(output) = chunk.get("output") {
        match output {
            Value::String(s) => return Some(s.clone()),
            Value::Object(map) => {
                for key in ["text", "content"] {
                    if let Some(text) = map.get(key).and_then(Value::as_str) {
                        return Some(text.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    // Bare delta: a string or an object carrying content
    if let Some(delta) = chunk.get("delta") {
        match delta {
            Value::String(s) => return Some(s.clone()),
            Value::Object(map) => {
                if let Some(content) = map.get("content").and_then(Value::as_str) {
                    return Some(content.to_string());
                }
            }
            _ => {}
        }
    }

    None
}

fn join_text_blocks(blocks: &[Value]) -> String {
    blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect()
}

// ─── Line buffering ──────────────────────────────────────

/// Convert a byte stream into a stream of complete lines.
fn stream_lines(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    futures_util::stream::unfold(
        (Box::pin(byte_stream), String::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                // First, try to extract a complete line from the buffer
                if let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].to_string();
                    buffer = buffer[newline_pos + 1..].to_string();
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer)));
                    }
                    continue;
                }

                // Buffer has no complete line — read more bytes
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(anyhow::anyhow!("Stream read error: {e}")),
                            (stream, buffer),
                        ));
                    }
                    None => {
                        // Stream ended — emit remaining buffer if non-empty
                        if !buffer.trim().is_empty() {
                            let remaining = std::mem::take(&mut buffer);
                            return Some((Ok(remaining), (stream, buffer)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ─── SSE line parsing ────────────────────────────────

    #[test]
    fn test_parse_data_line_openai_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap().unwrap(), "Hello");
    }

    #[test]
    fn test_parse_done_marker() {
        assert!(parse_sse_line("data: [DONE]").is_none());
    }

    #[test]
    fn test_parse_non_data_line_skipped() {
        assert!(parse_sse_line("event: message").is_none());
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line("   ").is_none());
    }

    #[test]
    fn test_parse_malformed_chunk_is_error() {
        let result = parse_sse_line("data: {broken json");
        assert!(result.unwrap().is_err());
    }

    #[test]
    fn test_parse_chunk_without_text_skipped() {
        assert!(parse_sse_line(r#"data: {"usage":{"tokens":12}}"#).is_none());
    }

    #[test]
    fn test_parse_empty_content_skipped() {
        assert!(parse_sse_line(r#"data: {"content":""}"#).is_none());
    }

    // ─── Chunk text extraction ───────────────────────────

    #[test]
    fn test_extract_direct_content_string() {
        let chunk = json!({"content": "partial text"});
        assert_eq!(extract_chunk_text(&chunk).unwrap(), "partial text");
    }

    #[test]
    fn test_extract_content_block_list() {
        let chunk = json!({"content": [
            {"type": "text", "text": "first "},
            {"type": "image", "url": "ignored"},
            {"type": "text", "text": "second"}
        ]});
        assert_eq!(extract_chunk_text(&chunk).unwrap(), "first second");
    }

    #[test]
    fn test_extract_direct_text_field() {
        let chunk = json!({"text": "plain"});
        assert_eq!(extract_chunk_text(&chunk).unwrap(), "plain");
    }

    #[test]
    fn test_extract_output_string() {
        let chunk = json!({"output": "agent text"});
        assert_eq!(extract_chunk_text(&chunk).unwrap(), "agent text");
    }

    #[test]
    fn test_extract_output_nested_object() {
        let chunk = json!({"output": {"text": "nested"}});
        assert_eq!(extract_chunk_text(&chunk).unwrap(), "nested");
        let chunk = json!({"output": {"content": "nested2"}});
        assert_eq!(extract_chunk_text(&chunk).unwrap(), "nested2");
    }

    #[test]
    fn test_extract_delta_string_and_object() {
        assert_eq!(extract_chunk_text(&json!({"delta": "d"})).unwrap(), "d");
        assert_eq!(
            extract_chunk_text(&json!({"delta": {"content": "dc"}})).unwrap(),
            "dc"
        );
    }

    #[test]
    fn test_extract_unknown_shape_is_none() {
        assert!(extract_chunk_text(&json!({"foo": "bar"})).is_none());
        assert!(extract_chunk_text(&json!(null)).is_none());
    }

    #[test]
    fn test_openai_shape_wins_over_others() {
        let chunk = json!({
            "choices": [{"delta": {"content": "from choices"}}],
            "text": "from text"
        });
        assert_eq!(extract_chunk_text(&chunk).unwrap(), "from choices");
    }
}
