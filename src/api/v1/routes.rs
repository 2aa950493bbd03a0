/*
 * Responsibility
 * - v1 URL structure
 * - /tools (list), /tools/call (invoke)
 * - Authentication is applied by the app over every matched route
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::v1::handlers::tools::{call_tool, list_tools};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/call", post(call_tool))
}
