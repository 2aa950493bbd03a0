/*
 * Responsibility
 * - Turn an AuthorizationContext into a request-scoped ClientFactory
 * - Two strategies, picked by the credential handle: embedded or assume-role
 *
 * Notes
 * - Role assumption: per-attempt timeout, one retry for transient failures,
 *   no retry for access denied. Fails closed.
 * - The session cache (if enabled) is written only after success.
 */
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::ReasonCode;
use crate::services::audit::redact::REDACTED;
use crate::services::auth::{AuthorizationContext, CredentialHandle};
use crate::services::credentials::client_factory::{
    ClientFactory, CredentialSource, ScopedCredentials,
};
use crate::services::credentials::session_cache::{SessionCache, SessionKey};

/// STS lower bound for `DurationSeconds`.
pub const MIN_SESSION_SECONDS: i64 = 900;
const MAX_SESSION_NAME_LEN: usize = 64;
const MAX_TAG_VALUE_LEN: usize = 256;
const ATTEMPTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub session_name: String,
    pub duration_seconds: i32,
    /// Session tags, `(key, value)`.
    pub tags: Vec<(String, String)>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AssumedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl fmt::Debug for AssumedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumedCredentials")
            .field("access_key_id", &REDACTED)
            .field("secret_access_key", &REDACTED)
            .field("session_token", &REDACTED)
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoleAssumptionError {
    #[error("role assumption timed out")]
    Timeout,
    #[error("transient role assumption failure: {0}")]
    Transient(String),
    #[error("role assumption denied")]
    AccessDenied,
    #[error("role assumption rejected: {0}")]
    Rejected(String),
}

impl RoleAssumptionError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RoleAssumptionError::Timeout | RoleAssumptionError::Transient(_)
        )
    }
}

/// Seam over STS so tests can substitute canned answers.
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(
        &self,
        request: &AssumeRoleRequest,
    ) -> Result<AssumedCredentials, RoleAssumptionError>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("token expired before credentials were derived")]
    TokenExpired,
    #[error("token carries no cloud credentials")]
    NoCredentials,
    #[error("embedded credentials expired")]
    EmbeddedExpired,
    #[error(transparent)]
    AssumeRole(#[from] RoleAssumptionError),
}

impl CredentialError {
    pub fn reason(&self) -> ReasonCode {
        match self {
            CredentialError::TokenExpired => ReasonCode::Expired,
            _ => ReasonCode::CredentialDerivationFailure,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub region: String,
    pub max_session_seconds: i32,
    pub attempt_timeout: Duration,
}

pub struct CredentialProvider {
    assumer: Arc<dyn RoleAssumer>,
    settings: ProviderSettings,
    cache: Option<SessionCache>,
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("settings", &self.settings)
            .field("cache_entries", &self.cache.as_ref().map(SessionCache::len))
            .finish()
    }
}

impl CredentialProvider {
    pub fn new(
        assumer: Arc<dyn RoleAssumer>,
        settings: ProviderSettings,
        cache: Option<SessionCache>,
    ) -> Self {
        Self {
            assumer,
            settings,
            cache,
        }
    }

    pub fn cache(&self) -> Option<&SessionCache> {
        self.cache.as_ref()
    }

    pub async fn acquire_client_factory(
        &self,
        ctx: &AuthorizationContext,
        now: DateTime<Utc>,
    ) -> Result<ClientFactory, CredentialError> {
        if ctx.is_expired_at(now) {
            return Err(CredentialError::TokenExpired);
        }

        match ctx.credential_handle() {
            CredentialHandle::None => Err(CredentialError::NoCredentials),
            CredentialHandle::Embedded(creds) => {
                if creds.expiration <= now {
                    return Err(CredentialError::EmbeddedExpired);
                }
                Ok(ClientFactory::new(
                    CredentialSource::Embedded,
                    ctx.tenant_id(),
                    &self.settings.region,
                    ScopedCredentials {
                        access_key_id: creds.access_key.clone(),
                        secret_access_key: creds.secret_key.clone(),
                        session_token: creds.session_token.clone(),
                    },
                    creds.expiration.min(ctx.expires_at()),
                ))
            }
            CredentialHandle::AssumeRole(role) => self.assume(ctx, &role.role_arn, now).await,
        }
    }

    async fn assume(
        &self,
        ctx: &AuthorizationContext,
        role_arn: &str,
        now: DateTime<Utc>,
    ) -> Result<ClientFactory, CredentialError> {
        let key = SessionKey::new(role_arn, ctx.tenant_id(), ctx.user_id(), ctx.expires_at());

        if let Some((creds, deadline)) = self.cache.as_ref().and_then(|c| c.get(&key, now)) {
            tracing::debug!(tenant_id = %ctx.tenant_id(), "assumed-role session cache hit");
            // The slot may have been filled by a token with a later `exp` in the same bucket.
            let deadline = deadline.min(ctx.expires_at());
            return Ok(self.factory(ctx, role_arn, creds, deadline));
        }

        let request = AssumeRoleRequest {
            role_arn: role_arn.to_string(),
            session_name: session_name(ctx.tenant_id(), ctx.request_id()),
            duration_seconds: session_duration(
                ctx.expires_at(),
                now,
                self.settings.max_session_seconds,
            ),
            tags: vec![
                ("tenant".to_string(), tag_value(ctx.tenant_id())),
                ("user".to_string(), tag_value(ctx.user_id())),
            ],
        };

        let creds = match self.assume_with_retry(&request).await {
            Ok(creds) => creds,
            Err(err) => {
                if err == RoleAssumptionError::AccessDenied
                    && let Some(cache) = &self.cache
                {
                    cache.invalidate(role_arn, ctx.tenant_id());
                }
                tracing::warn!(
                    error = %err,
                    tenant_id = %ctx.tenant_id(),
                    "role assumption failed"
                );
                return Err(err.into());
            }
        };

        let deadline = creds.expiration.min(ctx.expires_at());
        if let Some(cache) = &self.cache {
            cache.insert(key, creds.clone(), deadline, now);
        }
        Ok(self.factory(ctx, role_arn, creds, deadline))
    }

    async fn assume_with_retry(
        &self,
        request: &AssumeRoleRequest,
    ) -> Result<AssumedCredentials, RoleAssumptionError> {
        let mut last = RoleAssumptionError::Timeout;
        for attempt in 1..=ATTEMPTS {
            let outcome = tokio::time::timeout(
                self.settings.attempt_timeout,
                self.assumer.assume_role(request),
            )
            .await
            .unwrap_or(Err(RoleAssumptionError::Timeout));

            match outcome {
                Ok(creds) => return Ok(creds),
                Err(err) if err.is_retryable() && attempt < ATTEMPTS => {
                    tracing::debug!(error = %err, attempt, "retrying role assumption");
                    last = err;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last)
    }

    fn factory(
        &self,
        ctx: &AuthorizationContext,
        role_arn: &str,
        creds: AssumedCredentials,
        deadline: DateTime<Utc>,
    ) -> ClientFactory {
        ClientFactory::new(
            CredentialSource::AssumedRole {
                role_arn: role_arn.to_string(),
            },
            ctx.tenant_id(),
            &self.settings.region,
            ScopedCredentials {
                access_key_id: creds.access_key_id,
                secret_access_key: creds.secret_access_key,
                session_token: creds.session_token,
            },
            deadline,
        )
    }
}

/// Remaining token lifetime, capped at `max` and floored at the STS minimum.
pub fn session_duration(token_expires_at: DateTime<Utc>, now: DateTime<Utc>, max: i32) -> i32 {
    let remaining = (token_expires_at - now).num_seconds();
    let seconds = remaining
        .min(i64::from(max))
        .max(MIN_SESSION_SECONDS);
    i32::try_from(seconds).unwrap_or(max)
}

/// Role session names allow `[A-Za-z0-9+=,.@-]`, 2 to 64 characters.
pub fn session_name(tenant_id: &str, request_id: uuid::Uuid) -> String {
    let raw = format!("tg-{}-{}", tenant_id, request_id.simple());
    let mut name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "+=,.@-".contains(c) {
                c
            } else {
                '-'
            }
        })
        .collect();
    name.truncate(MAX_SESSION_NAME_LEN);
    name
}

fn tag_value(value: &str) -> String {
    value.chars().take(MAX_TAG_VALUE_LEN).collect()
}
