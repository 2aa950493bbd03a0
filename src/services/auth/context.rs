/*
 * Responsibility
 * - Canonical, immutable per-request authorization context
 * - Builds it from validated claims (normalization + credential completeness)
 *
 * Notes
 * - Fields are private; the only constructor is `build_context`, so a context
 *   cannot be assembled piecemeal or mutated after the fact.
 * - A context is built once per request and dropped with the response.
 */
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ReasonCode;
use crate::services::audit::redact::REDACTED;
use crate::services::auth::claims::{AwsCredentialClaim, DecodedClaims, RoleRef};
use crate::services::auth::schema::AccessLevel;

/// The single authentication scheme this server accepts.
pub const AUTH_SCHEME: &str = "jwt";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("embedded credentials are missing '{0}'")]
    IncompleteCredentials(&'static str),
    #[error("embedded credentials already expired")]
    ExpiredCredentials,
    #[error("role reference is not an ARN")]
    InvalidRoleArn,
}

impl ContextError {
    pub fn reason(&self) -> ReasonCode {
        ReasonCode::CredentialDerivationFailure
    }
}

/// Embedded credentials after the completeness check.
#[derive(Clone, PartialEq, Eq)]
pub struct EmbeddedCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl fmt::Debug for EmbeddedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedCredentials")
            .field("access_key", &REDACTED)
            .field("secret_key", &REDACTED)
            .field("session_token", &REDACTED)
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Which credential shape the token carried. The credential provider picks its
/// strategy from this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialHandle {
    None,
    Embedded(EmbeddedCredentials),
    AssumeRole(RoleRef),
}

#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    request_id: Uuid,
    user_id: String,
    tenant_id: String,
    permissions: BTreeSet<String>,
    bucket_grants: BTreeMap<String, AccessLevel>,
    roles: Vec<String>,
    credential_handle: CredentialHandle,
    expires_at: DateTime<Utc>,
    scheme: &'static str,
}

impl AuthorizationContext {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    pub fn bucket_grants(&self) -> &BTreeMap<String, AccessLevel> {
        &self.bucket_grants
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn credential_handle(&self) -> &CredentialHandle {
        &self.credential_handle
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn scheme(&self) -> &'static str {
        self.scheme
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn bucket_level(&self, bucket: &str) -> Option<AccessLevel> {
        self.bucket_grants.get(bucket).copied()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

fn normalize_permission(raw: &str) -> Option<String> {
    let p = raw.trim().to_ascii_lowercase();
    (!p.is_empty()).then_some(p)
}

/// Turn validated claims into the canonical context.
///
/// - permissions → trimmed, lowercased, deduplicated set
/// - bucket grants → name → highest level
/// - credential block → checked for completeness and expiry here, not at first use
pub fn build_context(
    claims: DecodedClaims,
    now: DateTime<Utc>,
) -> Result<AuthorizationContext, ContextError> {
    let permissions = claims
        .permissions
        .iter()
        .filter_map(|p| normalize_permission(p))
        .collect();

    let mut bucket_grants: BTreeMap<String, AccessLevel> = BTreeMap::new();
    for grant in claims.buckets {
        bucket_grants
            .entry(grant.name)
            .and_modify(|level| *level = (*level).max(grant.access_level))
            .or_insert(grant.access_level);
    }

    let credential_handle = match claims.aws_credentials {
        None => CredentialHandle::None,
        Some(AwsCredentialClaim::Embedded(creds)) => {
            let access_key = non_empty(creds.access_key, "accessKey")?;
            let secret_key = non_empty(creds.secret_key, "secretKey")?;
            let session_token = non_empty(creds.session_token, "sessionToken")?;
            let expiration = creds
                .expiration
                .ok_or(ContextError::IncompleteCredentials("expiration"))?;
            if expiration <= now {
                return Err(ContextError::ExpiredCredentials);
            }
            CredentialHandle::Embedded(EmbeddedCredentials {
                access_key,
                secret_key,
                session_token,
                expiration,
            })
        }
        Some(AwsCredentialClaim::Role(role)) => {
            let role_arn = role.role_arn.trim();
            if !role_arn.starts_with("arn:") || role_arn.len() <= "arn:".len() {
                return Err(ContextError::InvalidRoleArn);
            }
            CredentialHandle::AssumeRole(RoleRef {
                role_arn: role_arn.to_string(),
            })
        }
    };

    let tenant_id = claims.tenant.unwrap_or_else(|| claims.subject.clone());

    Ok(AuthorizationContext {
        request_id: Uuid::new_v4(),
        user_id: claims.subject,
        tenant_id,
        permissions,
        bucket_grants,
        roles: claims.roles,
        credential_handle,
        expires_at: claims.expires_at,
        scheme: AUTH_SCHEME,
    })
}

fn non_empty(value: Option<String>, field: &'static str) -> Result<String, ContextError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ContextError::IncompleteCredentials(field))
}
