//! Bearer token → AuthorizationContext in request extensions, plus one audit
//! record per request.
//!
//! Per request:
//! - exempt route → pass through untouched
//! - otherwise run the auth pipeline (decode → validate → build context);
//!   any failure short-circuits with its reason code
//! - on success the context goes into extensions, the Authorization header is
//!   removed, and the handler runs
//! - the response is classified (reason code or call error code extension set
//!   by `AppError`) and audited

use std::time::Instant;

use axum::{
    Router,
    body::Body,
    extract::{OriginalUri, State},
    http::{HeaderMap, Request, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::api::v1::extractors::AuthCtx;
use crate::error::{AppError, CallErrorCode, ErrorClass, ReasonCode};
use crate::services::audit::{FailureRecord, SuccessRecord};
use crate::services::auth::AuthStage;
use crate::state::AppState;

/// Routes reachable without a bearer token.
pub const EXEMPT_ROUTES: &[&str] = &["/health", "/health/auth"];

const DEBUG_HEADER: &str = "x-debug";

/// Tool name a handler attaches to its response so the audit record can name it.
#[derive(Debug, Clone)]
pub struct InvokedTool(pub String);

/// Apply the access middleware to every matched route of `router`.
///
/// Call after all routes are registered; unmatched paths fall through to the
/// default 404.
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 `from_fn` cannot take a State extractor, so pass it via `from_fn_with_state`.
    router.route_layer(middleware::from_fn_with_state(state, access_middleware))
}

pub fn is_exempt(path: &str) -> bool {
    let path = match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    };
    EXEMPT_ROUTES.contains(&path)
}

fn debug_requested(headers: &HeaderMap) -> bool {
    headers
        .get(DEBUG_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

async fn access_middleware(
    State(state): State<AppState>,
    OriginalUri(original_uri): OriginalUri,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if is_exempt(original_uri.path()) {
        return next.run(req).await;
    }

    let started = Instant::now();
    let debug = debug_requested(req.headers());

    let ctx = match state.auth.authenticate(req.headers(), Utc::now()) {
        Ok(ctx) => AuthCtx::new(ctx),
        Err(rejection) => {
            let record = FailureRecord::new(rejection.reason, rejection.stage, started.elapsed())
                .with_fingerprint(rejection.token_fingerprint)
                .with_detail(debug.then_some(rejection.detail));
            state.audit.record_failure(&record, Utc::now());
            return AppError::Rejected(rejection.reason).into_response();
        }
    };

    // Downstream code gets the context, never the token.
    req.headers_mut().remove(header::AUTHORIZATION);
    req.extensions_mut().insert(ctx.clone());

    let response = next.run(req).await;

    let tool = response
        .extensions()
        .get::<InvokedTool>()
        .map(|t| t.0.as_str());
    let elapsed = started.elapsed();
    let now = Utc::now();

    match response.extensions().get::<ReasonCode>().copied() {
        Some(reason) => {
            let record = FailureRecord::new(reason, post_auth_stage(reason), elapsed)
                .with_context(&ctx)
                .with_tool(tool);
            state.audit.record_failure(&record, now);
        }
        None => {
            let call_error = response.extensions().get::<CallErrorCode>().map(|c| c.0);
            let record =
                SuccessRecord::new(&ctx, tool, elapsed, debug).with_call_error(call_error);
            state.audit.record_success(&record, now);
        }
    }

    response
}

/// Stage a failure after authentication belongs to.
fn post_auth_stage(reason: ReasonCode) -> AuthStage {
    match reason.class() {
        ErrorClass::Authorization => AuthStage::Denied,
        _ if reason == ReasonCode::Expired => AuthStage::Denied,
        _ => AuthStage::Rejected,
    }
}
