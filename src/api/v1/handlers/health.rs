/*
 * Responsibility
 * - GET /health (liveness)
 * - GET /health/auth (rolling auth outcome summary, counts only)
 * - Both are exempt from the access middleware
 */
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;

use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

pub async fn auth_health(State(state): State<AppState>) -> impl IntoResponse {
    let summary = state.audit.summary(Utc::now());
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "summary": summary})),
    )
}
