use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::models::QueryResponse;
use crate::state::AppState;

/// GET /api/results/{session_id} — return the session's last stored result
/// so the UI can re-render without re-querying the endpoint.
pub async fn get_results(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    let (query, result) = state.session_snapshot(session_id).ok_or((
        StatusCode::NOT_FOUND,
        "No stored result for this session".to_string(),
    ))?;

    let interpreted = !result.is_empty();
    Ok(Json(QueryResponse {
        session_id,
        query,
        interpreted,
        notice: None,
        result,
        queried_at: Utc::now(),
    }))
}
