use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::models::Message;

/// Task-type prefixes the query layer knows how to talk to.
const SUPPORTED_TASK_PREFIXES: &[&str] = &["agent/", "llm/v1/chat", "llm/v1/completions"];

/// Query the serving endpoint without streaming and return the raw,
/// uninterpreted response body.
///
/// The custom agent request format (`input` message list) is tried first;
/// if the endpoint rejects it, the chat-completions format (`messages`) is
/// sent as a fallback. Normalizing the response is the caller's concern.
pub async fn query_endpoint(
    client: &reqwest::Client,
    config: &Config,
    token: &str,
    messages: &[Message],
) -> Result<Value> {
    let url = config.invocations_url();

    let agent_body = json!({
        "input": input_messages(messages),
        "max_output_tokens": config.max_output_tokens,
        "stream": false,
    });

    match invoke(client, &url, token, &agent_body).await {
        Ok(raw) => Ok(raw),
        Err(agent_err) => {
            tracing::warn!("agent request format rejected, trying chat format: {agent_err:#}");

            let chat_body = json!({
                "messages": messages,
                "max_tokens": config.max_output_tokens,
            });

            invoke(client, &url, token, &chat_body)
                .await
                .with_context(|| {
                    format!(
                        "endpoint {} rejected both request formats (agent format error: {agent_err:#})",
                        config.serving_endpoint
                    )
                })
        }
    }
}

async fn invoke(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    body: &Value,
) -> Result<Value> {
    let resp = client
        .post(url)
        .bearer_auth(token)
        .json(body)
        .send()
        .await
        .context("Failed to reach the serving endpoint")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Serving endpoint returned {status}: {body}");
    }

    Ok(resp.json().await?)
}

/// Message list for the agent request body. The endpoint expects message
/// objects, never bare strings, and at least one of them.
fn input_messages(messages: &[Message]) -> Vec<Message> {
    if messages.is_empty() {
        vec![Message::user("")]
    } else {
        messages.to_vec()
    }
}

// ─── Endpoint task-type check ────────────────────────────

#[derive(Deserialize)]
struct EndpointInfo {
    #[serde(default)]
    task: String,
}

/// Check whether the configured endpoint serves a conversational task type.
/// When the lookup fails the endpoint is assumed supported so the query
/// path can surface a more specific error.
pub async fn is_endpoint_supported(
    client: &reqwest::Client,
    config: &Config,
    token: &str,
) -> bool {
    match endpoint_task_type(client, config, token).await {
        Ok(task) => {
            let supported = task_is_supported(&task);
            tracing::info!(
                "endpoint {} has task type {task:?}, supported: {supported}",
                config.serving_endpoint
            );
            supported
        }
        Err(e) => {
            tracing::warn!(
                "could not determine task type for endpoint {}: {e:#}",
                config.serving_endpoint
            );
            true
        }
    }
}

fn task_is_supported(task: &str) -> bool {
    SUPPORTED_TASK_PREFIXES
        .iter()
        .any(|prefix| task.starts_with(prefix))
}

async fn endpoint_task_type(
    client: &reqwest::Client,
    config: &Config,
    token: &str,
) -> Result<String> {
    let resp = client
        .get(config.endpoint_info_url())
        .bearer_auth(token)
        .send()
        .await
        .context("Failed to fetch serving endpoint metadata")?;

    if !resp.status().is_success() {
        let status = resp.status();
        anyhow::bail!("Endpoint metadata request returned {status}");
    }

    let info: EndpointInfo = resp.json().await?;
    Ok(info.task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_messages_passes_through() {
        let messages = vec![Message::user("find loans")];
        let input = input_messages(&messages);
        assert_eq!(input.len(), 1);
        assert_eq!(input[0].content, "find loans");
    }

    #[test]
    fn test_input_messages_empty_gets_placeholder() {
        let input = input_messages(&[]);
        assert_eq!(input.len(), 1);
        assert_eq!(input[0].role, "user");
        assert_eq!(input[0].content, "");
    }

    #[test]
    fn test_supported_task_prefixes() {
        assert!(task_is_supported("agent/v1/responses"));
        assert!(task_is_supported("llm/v1/chat"));
        assert!(task_is_supported("llm/v1/completions"));
        assert!(!task_is_supported("llm/v1/embeddings"));
        assert!(!task_is_supported(""));
    }

    #[test]
    fn test_endpoint_info_task_defaults_empty() {
        let info: EndpointInfo = serde_json::from_str(r#"{"name":"ep"}"#).unwrap();
        assert_eq!(info.task, "");
    }
}
