/*
 * Responsibility
 * - One structured audit record per request (success or failure)
 * - Feed the rolling summary
 *
 * Notes
 * - Records carry a hashed user id, counts and names of what was granted; never
 *   the raw token, claim values of denied buckets, or credential material.
 */
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ReasonCode;
use crate::services::audit::redact::hash_user_id;
use crate::services::audit::summary::{Outcome, RollingSummary, SummarySnapshot};
use crate::services::auth::{AuthStage, AuthorizationContext};

const AUDIT_TARGET: &str = "toolgate::audit";

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Audit payload for a request that passed every check.
#[derive(Debug, Serialize)]
pub struct SuccessRecord {
    pub event: &'static str,
    pub request_id: String,
    pub user: String,
    pub tenant_id: String,
    pub permission_count: usize,
    pub bucket_count: usize,
    pub tool: Option<String>,
    pub elapsed_ms: u64,
    /// Public error code when the authorized call itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_error: Option<&'static str>,
    /// Only with `X-Debug: true`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<String>>,
}

impl SuccessRecord {
    pub fn new(
        ctx: &AuthorizationContext,
        tool: Option<&str>,
        elapsed: Duration,
        debug: bool,
    ) -> Self {
        Self {
            event: "auth_success",
            request_id: ctx.request_id().to_string(),
            user: hash_user_id(ctx.user_id()),
            tenant_id: ctx.tenant_id().to_string(),
            permission_count: ctx.permissions().len(),
            bucket_count: ctx.bucket_grants().len(),
            tool: tool.map(str::to_string),
            elapsed_ms: millis(elapsed),
            call_error: None,
            permissions: debug.then(|| ctx.permissions().iter().cloned().collect()),
            buckets: debug.then(|| ctx.bucket_grants().keys().cloned().collect()),
        }
    }

    pub fn with_call_error(mut self, code: Option<&'static str>) -> Self {
        self.call_error = code;
        self
    }
}

/// Audit payload for a rejected or denied request.
#[derive(Debug, Serialize)]
pub struct FailureRecord {
    pub event: &'static str,
    pub reason: ReasonCode,
    pub stage: &'static str,
    pub request_id: Option<String>,
    pub user: Option<String>,
    pub token_fingerprint: Option<String>,
    pub tool: Option<String>,
    pub elapsed_ms: u64,
    /// Internal detail, only with `X-Debug: true`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FailureRecord {
    pub fn new(reason: ReasonCode, stage: AuthStage, elapsed: Duration) -> Self {
        Self {
            event: "auth_failure",
            reason,
            stage: stage.as_str(),
            request_id: None,
            user: None,
            token_fingerprint: None,
            tool: None,
            elapsed_ms: millis(elapsed),
            detail: None,
        }
    }

    pub fn with_context(mut self, ctx: &AuthorizationContext) -> Self {
        self.request_id = Some(ctx.request_id().to_string());
        self.user = Some(hash_user_id(ctx.user_id()));
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.token_fingerprint = fingerprint;
        self
    }

    pub fn with_tool(mut self, tool: Option<&str>) -> Self {
        self.tool = tool.map(str::to_string);
        self
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }
}

#[derive(Debug)]
pub struct AuditLog {
    summary: RollingSummary,
}

impl AuditLog {
    pub fn new(window: Duration) -> Self {
        Self {
            summary: RollingSummary::new(window, Utc::now()),
        }
    }

    pub fn record_success(&self, record: &SuccessRecord, now: DateTime<Utc>) {
        tracing::info!(
            target: AUDIT_TARGET,
            event = record.event,
            request_id = %record.request_id,
            user = %record.user,
            tenant_id = %record.tenant_id,
            permission_count = record.permission_count,
            bucket_count = record.bucket_count,
            tool = record.tool.as_deref().unwrap_or("-"),
            elapsed_ms = record.elapsed_ms,
            call_error = record.call_error.unwrap_or("-"),
            permissions = ?record.permissions,
            buckets = ?record.buckets,
            "request authorized"
        );
        let outcome = match record.call_error {
            Some(code) => Outcome::CallFailed(code),
            None => Outcome::Success,
        };
        self.summary.record(outcome, now);
    }

    pub fn record_failure(&self, record: &FailureRecord, now: DateTime<Utc>) {
        tracing::warn!(
            target: AUDIT_TARGET,
            event = record.event,
            reason = %record.reason,
            stage = record.stage,
            request_id = record.request_id.as_deref().unwrap_or("-"),
            user = record.user.as_deref().unwrap_or("-"),
            token_fingerprint = record.token_fingerprint.as_deref().unwrap_or("-"),
            tool = record.tool.as_deref().unwrap_or("-"),
            elapsed_ms = record.elapsed_ms,
            detail = record.detail.as_deref().unwrap_or("-"),
            "request rejected"
        );
        self.summary.record(Outcome::Rejected(record.reason), now);
    }

    pub fn summary(&self, now: DateTime<Utc>) -> SummarySnapshot {
        self.summary.snapshot(now)
    }
}
