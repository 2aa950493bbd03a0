use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::{AppError, ReasonCode};
use crate::state::AppState;

use super::AuthCtx;

/// Extractor for handlers that need the AuthCtx.
/// Assumes the access middleware already inserted it into request extensions.
/// If it is missing (route not behind the middleware), the request is rejected
/// as unauthenticated.
pub struct AuthCtxExtractor(pub AuthCtx);

impl FromRequestParts<AppState> for AuthCtxExtractor
where
    AppState: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthCtx>()
            .cloned()
            .map(AuthCtxExtractor)
            .ok_or(AppError::Rejected(ReasonCode::MissingToken))
    }
}
