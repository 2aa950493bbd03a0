//! Authentication pipeline: bearer header → decoded claims → verified token →
//! authorization context.
//!
//! Each step is a plain function returning `Result`; the first failure stops the
//! pipeline and is reported as a [`Rejection`] tagged with the stage it
//! happened in. There is one scheme and no fallback branch.

use std::fmt;

use axum::http::{HeaderMap, header};
use chrono::{DateTime, Utc};

use crate::error::ReasonCode;
use crate::services::audit::redact::{REDACTED, token_fingerprint};
use crate::services::auth::access_jwt::SignatureValidator;
use crate::services::auth::claims::{self, ClaimsError, DecodedClaims};
use crate::services::auth::context::{AuthorizationContext, build_context};

const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

/// Per-request state machine. Failures land in `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    NoToken,
    Decoding,
    Validating,
    ContextBuilt,
    Authorizing,
    Allowed,
    Denied,
    Rejected,
}

impl AuthStage {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthStage::NoToken => "no_token",
            AuthStage::Decoding => "decoding",
            AuthStage::Validating => "validating",
            AuthStage::ContextBuilt => "context_built",
            AuthStage::Authorizing => "authorizing",
            AuthStage::Allowed => "allowed",
            AuthStage::Denied => "denied",
            AuthStage::Rejected => "rejected",
        }
    }
}

/// Terminal failure of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Stage that failed (the request then sits in `AuthStage::Rejected`).
    pub stage: AuthStage,
    pub reason: ReasonCode,
    /// Internal detail for logs. Never contains token or secret material.
    pub detail: String,
    /// Fingerprint of the offending token, when one was present.
    pub token_fingerprint: Option<String>,
}

impl Rejection {
    fn new(stage: AuthStage, reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            stage,
            reason,
            detail: detail.into(),
            token_fingerprint: None,
        }
    }

    fn with_token(mut self, token: &RawToken) -> Self {
        self.token_fingerprint = Some(token.fingerprint());
        self
    }
}

/// Bearer token as received. Exists only while the pipeline runs.
pub struct RawToken(String);

impl RawToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn fingerprint(&self) -> String {
        token_fingerprint(&self.0)
    }

    /// Middle segment of a three-part compact JWT.
    pub fn payload_segment(&self) -> Result<&str, ClaimsError> {
        let mut parts = self.0.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() && !s.is_empty() => {
                Ok(p)
            }
            _ => Err(ClaimsError::Malformed("token must have three segments")),
        }
    }
}

impl fmt::Debug for RawToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawToken").field(&REDACTED).finish()
    }
}

/// `Authorization: Bearer <token>` → token.
pub fn extract_bearer(headers: &HeaderMap) -> Result<RawToken, Rejection> {
    let value = headers.get(header::AUTHORIZATION).ok_or_else(|| {
        Rejection::new(AuthStage::NoToken, ReasonCode::MissingToken, "no authorization header")
    })?;

    if value.len() > MAX_AUTH_HEADER_BYTES {
        return Err(Rejection::new(
            AuthStage::NoToken,
            ReasonCode::MalformedToken,
            "authorization header too large",
        ));
    }

    let value = value.to_str().map_err(|_| {
        Rejection::new(
            AuthStage::NoToken,
            ReasonCode::MalformedToken,
            "authorization header is not ascii",
        )
    })?;

    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(Rejection::new(
            AuthStage::NoToken,
            ReasonCode::MissingToken,
            "authorization scheme is not bearer",
        ));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(Rejection::new(
            AuthStage::NoToken,
            ReasonCode::MissingToken,
            "empty bearer token",
        ));
    }

    Ok(RawToken::new(token))
}

/// Process-wide, read-only authentication pipeline.
#[derive(Debug, Clone)]
pub struct AuthPipeline {
    validator: SignatureValidator,
}

impl AuthPipeline {
    pub fn new(validator: SignatureValidator) -> Self {
        Self { validator }
    }

    /// Full pipeline starting from request headers.
    pub fn authenticate(
        &self,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationContext, Rejection> {
        let token = extract_bearer(headers)?;
        self.authenticate_token(token, now)
    }

    /// Pipeline for an already extracted token. The token is consumed and
    /// dropped before this returns.
    pub fn authenticate_token(
        &self,
        token: RawToken,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationContext, Rejection> {
        let claims = self.decode(&token)?;
        self.validate(&token, &claims, now)?;
        drop(token);
        self.build(claims, now)
    }

    pub fn decode(&self, token: &RawToken) -> Result<DecodedClaims, Rejection> {
        token
            .payload_segment()
            .and_then(claims::decode_payload_segment)
            .map_err(|e| {
                Rejection::new(AuthStage::Decoding, e.reason(), e.to_string()).with_token(token)
            })
    }

    pub fn validate(
        &self,
        token: &RawToken,
        claims: &DecodedClaims,
        now: DateTime<Utc>,
    ) -> Result<(), Rejection> {
        self.validator
            .validate(token.as_str(), claims, now)
            .map_err(|e| {
                Rejection::new(AuthStage::Validating, e.reason(), e.to_string()).with_token(token)
            })
    }

    pub fn build(
        &self,
        claims: DecodedClaims,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationContext, Rejection> {
        build_context(claims, now)
            .map_err(|e| Rejection::new(AuthStage::ContextBuilt, e.reason(), e.to_string()))
    }
}
