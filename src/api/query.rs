use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::Json;
use chrono::Utc;
use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::OwnedSemaphorePermit;
use uuid::Uuid;

use crate::endpoint::auth::resolve_token;
use crate::endpoint::query::query_endpoint;
use crate::endpoint::stream::{query_endpoint_stream, DeltaStream};
use crate::models::{Message, QueryRequest, QueryResponse};
use crate::normalize::normalize;
use crate::state::AppState;

const MAX_QUERY_LEN: usize = 2000;
const IDLE_TIMEOUT_SECS: u64 = 30;

const UNINTERPRETED_NOTICE: &str =
    "The endpoint response could not be interpreted; raw payload retained for inspection.";

/// POST /api/query — forward a natural-language query to the serving
/// endpoint, normalize the response, and store it in the caller's session.
pub async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    let (query, session_id, token) = prepare_query(&state, &headers, &req)?;

    let _permit = acquire_query_permit(&state).await?;

    let messages = vec![Message::user(&query)];
    let raw = query_endpoint(&state.http_client, &state.config, &token, &messages)
        .await
        .map_err(|e| {
            tracing::error!("endpoint query failed: {e:#}");
            (StatusCode::BAD_GATEWAY, format!("Endpoint query failed: {e:#}"))
        })?;

    let result = normalize(&raw);
    let interpreted = !result.is_empty();
    if !interpreted {
        tracing::warn!("query {session_id} produced an uninterpretable response");
    }
    state.store_result(session_id, &query, result.clone());

    Ok(Json(QueryResponse {
        session_id,
        query,
        interpreted,
        notice: (!interpreted).then(|| UNINTERPRETED_NOTICE.to_string()),
        result,
        queried_at: Utc::now(),
    }))
}

/// POST /api/query/stream — same flow with SSE streaming: `delta` events
/// while the endpoint generates, one `result` event with the normalized
/// payload once the stream completes, then `done`.
pub async fn query_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<QueryRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let (query, session_id, token) = prepare_query(&state, &headers, &req)?;

    let permit = acquire_query_permit(&state).await?;

    let messages = vec![Message::user(&query)];
    let deltas = query_endpoint_stream(&state.http_client, &state.config, &token, &messages)
        .await
        .map_err(|e| {
            tracing::error!("endpoint stream failed to start: {e:#}");
            (StatusCode::BAD_GATEWAY, format!("Endpoint query failed: {e:#}"))
        })?;

    struct StreamState {
        deltas: DeltaStream,
        buffer: String,
        state: AppState,
        session_id: Uuid,
        query: String,
        finished: bool,
        // Held so the concurrency slot stays taken for the stream's lifetime
        _permit: OwnedSemaphorePermit,
    }

    let idle_timeout = Duration::from_secs(IDLE_TIMEOUT_SECS);
    let initial = StreamState {
        deltas,
        buffer: String::new(),
        state,
        session_id,
        query,
        finished: false,
        _permit: permit,
    };

    let event_stream = stream::unfold(initial, move |mut st| async move {
        if st.finished {
            return None;
        }
        match tokio::time::timeout(idle_timeout, st.deltas.next()).await {
            Ok(Some(Ok(content))) => {
                st.buffer.push_str(&content);
                let event: Result<Event, Infallible> = Ok(Event::default()
                    .event("delta")
                    .json_data(serde_json::json!({ "content": content }))
                    .unwrap());
                Some((event, st))
            }
            Ok(Some(Err(e))) => {
                tracing::warn!("stream chunk error: {e:#}");
                st.finished = true;
                let event: Result<Event, Infallible> = Ok(Event::default()
                    .event("error")
                    .json_data(serde_json::json!({ "message": e.to_string() }))
                    .unwrap());
                Some((event, st))
            }
            Ok(None) => {
                // Stream complete — normalize the accumulated text once
                st.finished = true;
                let raw = Value::String(std::mem::take(&mut st.buffer));
                let result = normalize(&raw);
                let interpreted = !result.is_empty();
                st.state.store_result(st.session_id, &st.query, result.clone());

                let response = QueryResponse {
                    session_id: st.session_id,
                    query: st.query.clone(),
                    interpreted,
                    notice: (!interpreted).then(|| UNINTERPRETED_NOTICE.to_string()),
                    result,
                    queried_at: Utc::now(),
                };
                let event: Result<Event, Infallible> = Ok(Event::default()
                    .event("result")
                    .json_data(&response)
                    .unwrap());
                Some((event, st))
            }
            Err(_) => {
                st.finished = true;
                let event: Result<Event, Infallible> = Ok(Event::default()
                    .event("error")
                    .json_data(serde_json::json!({ "message": "Endpoint response timed out (idle)" }))
                    .unwrap());
                Some((event, st))
            }
        }
    });

    let done_event: Result<Event, Infallible> = Ok(Event::default()
        .event("done")
        .json_data(serde_json::json!({}))
        .unwrap());

    Ok(Sse::new(
        event_stream.chain(stream::once(async move { done_event })),
    ))
}

// ─── Helper functions ────────────────────────────────────

fn prepare_query(
    state: &AppState,
    headers: &HeaderMap,
    req: &QueryRequest,
) -> Result<(String, Uuid, String), (StatusCode, String)> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }
    let query = truncate_to_char_boundary(&query, MAX_QUERY_LEN);

    let token = resolve_token(headers, &state.config)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    let session_id = req.session_id.unwrap_or_else(Uuid::new_v4);
    Ok((query, session_id, token))
}

async fn acquire_query_permit(
    state: &AppState,
) -> Result<OwnedSemaphorePermit, (StatusCode, String)> {
    state
        .query_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Query service at capacity".to_string(),
            )
        })
}

fn truncate_to_char_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    s.char_indices()
        .take_while(|(i, _)| *i < max_len)
        .map(|(_, c)| c)
        .collect()
}
