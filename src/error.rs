/*
 * Responsibility
 * - Reason code taxonomy shared by the auth pipeline, the gate and the audit log
 * - AppError and its IntoResponse impl (HTTP status / JSON error body)
 * - Every rejection is rendered with the same flat shape:
 *   {"status":"error","code":"<REASON_CODE>","message":"<non-sensitive text>"}
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Machine-readable outcome of a failed authentication/authorization step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    MissingToken,
    MalformedToken,
    UnsupportedSchemaVersion,
    InvalidSignature,
    Expired,
    AudienceMismatch,
    IssuerMismatch,
    MissingPermission,
    BucketNotGranted,
    InsufficientAccessLevel,
    UnmappedTool,
    CredentialDerivationFailure,
    InternalConfigError,
}

/// Coarse class of a reason code; decides the HTTP status family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Authentication,
    Authorization,
    Infrastructure,
    Internal,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 13] = [
        ReasonCode::MissingToken,
        ReasonCode::MalformedToken,
        ReasonCode::UnsupportedSchemaVersion,
        ReasonCode::InvalidSignature,
        ReasonCode::Expired,
        ReasonCode::AudienceMismatch,
        ReasonCode::IssuerMismatch,
        ReasonCode::MissingPermission,
        ReasonCode::BucketNotGranted,
        ReasonCode::InsufficientAccessLevel,
        ReasonCode::UnmappedTool,
        ReasonCode::CredentialDerivationFailure,
        ReasonCode::InternalConfigError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::MissingToken => "MISSING_TOKEN",
            ReasonCode::MalformedToken => "MALFORMED_TOKEN",
            ReasonCode::UnsupportedSchemaVersion => "UNSUPPORTED_SCHEMA_VERSION",
            ReasonCode::InvalidSignature => "INVALID_SIGNATURE",
            ReasonCode::Expired => "EXPIRED",
            ReasonCode::AudienceMismatch => "AUDIENCE_MISMATCH",
            ReasonCode::IssuerMismatch => "ISSUER_MISMATCH",
            ReasonCode::MissingPermission => "MISSING_PERMISSION",
            ReasonCode::BucketNotGranted => "BUCKET_NOT_GRANTED",
            ReasonCode::InsufficientAccessLevel => "INSUFFICIENT_ACCESS_LEVEL",
            ReasonCode::UnmappedTool => "UNMAPPED_TOOL",
            ReasonCode::CredentialDerivationFailure => "CREDENTIAL_DERIVATION_FAILURE",
            ReasonCode::InternalConfigError => "INTERNAL_CONFIG_ERROR",
        }
    }

    pub fn class(self) -> ErrorClass {
        match self {
            ReasonCode::MissingToken
            | ReasonCode::MalformedToken
            | ReasonCode::UnsupportedSchemaVersion
            | ReasonCode::InvalidSignature
            | ReasonCode::Expired
            | ReasonCode::AudienceMismatch
            | ReasonCode::IssuerMismatch => ErrorClass::Authentication,
            ReasonCode::MissingPermission
            | ReasonCode::BucketNotGranted
            | ReasonCode::InsufficientAccessLevel
            | ReasonCode::UnmappedTool => ErrorClass::Authorization,
            ReasonCode::CredentialDerivationFailure => ErrorClass::Infrastructure,
            ReasonCode::InternalConfigError => ErrorClass::Internal,
        }
    }

    /// Code shown to clients.
    ///
    /// Cryptographic failures collapse into one code so a caller cannot tell
    /// which check (signature, issuer, audience) tripped.
    pub fn public_code(self) -> &'static str {
        match self {
            ReasonCode::InvalidSignature
            | ReasonCode::AudienceMismatch
            | ReasonCode::IssuerMismatch => "INVALID_TOKEN",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public code of an error that is not an auth/authz rejection (bad arguments,
/// missing or failing tool). Set on the response so the audit log can tell an
/// authorized-but-failed call from a completed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallErrorCode(pub &'static str);

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("request rejected: {0}")]
    Rejected(ReasonCode),
    #[error("invalid arguments")]
    InvalidArguments,
    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),
    #[error("tool failed")]
    ToolFailed,
    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            AppError::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let reason = self.reason();

        let (status, code, message) = match self {
            AppError::Rejected(reason) => match reason.class() {
                ErrorClass::Authentication => (
                    StatusCode::UNAUTHORIZED,
                    reason.public_code(),
                    "authentication failed".to_string(),
                ),
                ErrorClass::Authorization => (
                    StatusCode::FORBIDDEN,
                    reason.public_code(),
                    "not authorized for this tool".to_string(),
                ),
                ErrorClass::Infrastructure => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    reason.public_code(),
                    "cloud credentials are temporarily unavailable".to_string(),
                ),
                ErrorClass::Internal => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    reason.public_code(),
                    "internal server error".to_string(),
                ),
            },
            AppError::InvalidArguments => (
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENTS",
                "tool arguments are invalid".to_string(),
            ),
            AppError::ToolUnavailable(_) => (
                StatusCode::NOT_IMPLEMENTED,
                "TOOL_UNAVAILABLE",
                "tool is not available on this server".to_string(),
            ),
            AppError::ToolFailed => (
                StatusCode::BAD_GATEWAY,
                "TOOL_FAILED",
                "tool execution failed".to_string(),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "internal server error".to_string(),
            ),
        };

        let body = ErrorResponse {
            status: "error",
            code,
            message,
        };

        let mut response = (status, Json(body)).into_response();
        // The access middleware reads these back to classify the audit record.
        match reason {
            Some(reason) => {
                response.extensions_mut().insert(reason);
            }
            None => {
                response.extensions_mut().insert(CallErrorCode(code));
            }
        }
        response
    }
}
