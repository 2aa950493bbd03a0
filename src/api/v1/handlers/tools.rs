/*
 * Responsibility
 * - GET /api/v1/tools: tools the caller's permissions allow
 * - POST /api/v1/tools/call: gate → (credentials) → handler
 *
 * Notes
 * - The gate decides before any handler or credential work happens.
 * - The response carries the tool name for the audit record.
 */
use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::api::v1::dto::tools::{ToolCallRequest, ToolCallResponse, ToolListResponse, ToolListing};
use crate::api::v1::extractors::{AuthCtx, AuthCtxExtractor};
use crate::error::AppError;
use crate::middleware::auth::access::InvokedTool;
use crate::services::authz::ToolInvocationRequest;
use crate::services::tools::ToolError;
use crate::state::AppState;

pub async fn list_tools(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
) -> Json<ToolListResponse> {
    let tools = state
        .gate
        .visible_tools(&ctx)
        .into_iter()
        .map(|tool| ToolListing {
            available: state.tools.get(&tool.name).is_some(),
            name: tool.name,
            permission: tool.permission,
            bucket_argument: tool.bucket_argument,
        })
        .collect();

    Json(ToolListResponse {
        status: "ok",
        tools,
    })
}

pub async fn call_tool(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    payload: Result<Json<ToolCallRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = payload else {
        return AppError::InvalidArguments.into_response();
    };
    let tool = request.name.clone();

    match run_tool(&state, &ctx, request).await {
        Ok(body) => (Extension(InvokedTool(tool)), Json(body)).into_response(),
        Err(err) => {
            let mut response = err.into_response();
            response.extensions_mut().insert(InvokedTool(tool));
            response
        }
    }
}

async fn run_tool(
    state: &AppState,
    ctx: &AuthCtx,
    request: ToolCallRequest,
) -> Result<ToolCallResponse, AppError> {
    let invocation =
        ToolInvocationRequest::new(request.name, request.arguments.unwrap_or_default());

    let permission = state
        .gate
        .authorize(&invocation, ctx, Utc::now())
        .into_result()
        .map_err(AppError::Rejected)?;
    tracing::debug!(tool = %invocation.tool_name, %permission, "tool call authorized");

    let handler = state
        .tools
        .get(&invocation.tool_name)
        .ok_or_else(|| AppError::ToolUnavailable(invocation.tool_name.clone()))?;

    let clients = if handler.needs_cloud_credentials() {
        let factory = state
            .credentials
            .acquire_client_factory(ctx, Utc::now())
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, tool = %invocation.tool_name, "credential derivation failed");
                AppError::Rejected(e.reason())
            })?;
        Some(factory)
    } else {
        None
    };

    let result = handler
        .call(ctx, &invocation.arguments, clients.as_ref())
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, tool = %invocation.tool_name, "tool call failed");
            match e {
                ToolError::InvalidArguments(_) => AppError::InvalidArguments,
                ToolError::Failed(_) => AppError::ToolFailed,
            }
        })?;

    Ok(ToolCallResponse {
        status: "ok",
        tool: invocation.tool_name,
        result,
    })
}
