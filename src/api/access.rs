use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::endpoint::auth::resolve_token;
use crate::models::{AccessRequest, AccessRequestAck};
use crate::state::AppState;

const ACCESS_REQUEST_TIMEOUT_SECS: u64 = 30;

/// POST /api/access-request — submit an access request for a data product
/// to the workspace. Deduplicated per session: repeating a request for the
/// same product returns 409.
pub async fn request_access(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AccessRequest>,
) -> Result<Json<AccessRequestAck>, (StatusCode, String)> {
    let product = req.data_product_name.trim().to_string();
    if product.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Data product name is required".to_string(),
        ));
    }

    let token = resolve_token(&headers, &state.config)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    if let Some(session_id) = req.session_id {
        if !state.mark_access_requested(session_id, &product) {
            return Err((
                StatusCode::CONFLICT,
                format!("Access already requested for {product}"),
            ));
        }
    }

    let payload = build_payload(&req, &state);

    let result = submit(&state, &token, &payload).await;

    match result {
        Ok(response) => {
            tracing::info!("access request sent for {product}");
            Ok(Json(AccessRequestAck {
                success: true,
                message: format!("Access request sent for {product}"),
                response,
            }))
        }
        Err(e) => {
            tracing::error!("failed to send access request for {product}: {e:#}");
            // Allow a retry after an upstream failure
            if let Some(session_id) = req.session_id {
                state.unmark_access_requested(session_id, &product);
            }
            Err((
                StatusCode::BAD_GATEWAY,
                format!("Failed to send access request: {e}"),
            ))
        }
    }
}

fn build_payload(req: &AccessRequest, state: &AppState) -> Value {
    let full_name = req
        .securable_full_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| state.config.securable_full_name());

    let comment = req
        .comment
        .clone()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| "Requesting USE_SCHEMA permission".to_string());

    json!({
        "comment": comment,
        "securable": {
            "full_name": full_name,
            "type": "SCHEMA",
        },
        "privileges": state.config.access_request.privileges,
    })
}

async fn submit(state: &AppState, token: &str, payload: &Value) -> anyhow::Result<Value> {
    let resp = state
        .http_client
        .post(state.config.access_request_url())
        .bearer_auth(token)
        .timeout(Duration::from_secs(ACCESS_REQUEST_TIMEOUT_SECS))
        .json(payload)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("workspace returned {status}: {body}");
    }

    Ok(resp.json().await.unwrap_or(Value::Null))
}
