/*
 * Responsibility
 * - Per tool call: may this context invoke this tool with these arguments?
 *
 * Notes
 * - Pure function of (table, request, context, clock). No I/O, no shared state.
 * - Fail closed: unknown tool, missing/odd bucket argument → deny.
 * - Check order: expiry, table lookup, permission, bucket grant, bucket level.
 */
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ReasonCode;
use crate::services::auth::AuthorizationContext;
use crate::services::authz::table::{ToolPermissionTable, ToolRequirement};

#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationRequest {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocationRequest {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthDecision {
    pub allowed: bool,
    pub reason: Option<ReasonCode>,
    pub matched_permission: Option<String>,
}

impl AuthDecision {
    fn allow(permission: &str) -> Self {
        Self {
            allowed: true,
            reason: None,
            matched_permission: Some(permission.to_string()),
        }
    }

    fn deny(reason: ReasonCode) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            matched_permission: None,
        }
    }

    pub fn into_result(self) -> Result<String, ReasonCode> {
        match (self.allowed, self.matched_permission, self.reason) {
            (true, Some(permission), _) => Ok(permission),
            (_, _, Some(reason)) => Err(reason),
            _ => Err(ReasonCode::UnmappedTool),
        }
    }
}

/// Entry of the caller-visible tool list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibleTool {
    pub name: String,
    pub permission: &'static str,
    pub bucket_argument: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct ToolAuthorizationGate {
    table: ToolPermissionTable,
}

impl ToolAuthorizationGate {
    pub fn new(table: ToolPermissionTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ToolPermissionTable {
        &self.table
    }

    pub fn authorize(
        &self,
        request: &ToolInvocationRequest,
        ctx: &AuthorizationContext,
        now: DateTime<Utc>,
    ) -> AuthDecision {
        if ctx.is_expired_at(now) {
            return AuthDecision::deny(ReasonCode::Expired);
        }

        let Some(requirement) = self.table.get(&request.tool_name) else {
            return AuthDecision::deny(ReasonCode::UnmappedTool);
        };

        if !ctx.has_permission(requirement.permission) {
            return AuthDecision::deny(ReasonCode::MissingPermission);
        }

        if let Err(reason) = check_bucket(requirement, &request.arguments, ctx) {
            return AuthDecision::deny(reason);
        }

        AuthDecision::allow(requirement.permission)
    }

    /// Tools whose permission the caller holds, in name order. Bucket grants
    /// are checked per call, not here.
    pub fn visible_tools(&self, ctx: &AuthorizationContext) -> Vec<VisibleTool> {
        self.table
            .iter()
            .filter(|(_, req)| ctx.has_permission(req.permission))
            .map(|(name, req)| VisibleTool {
                name: name.to_string(),
                permission: req.permission,
                bucket_argument: req.bucket_argument,
            })
            .collect()
    }
}

fn check_bucket(
    requirement: &ToolRequirement,
    arguments: &Map<String, Value>,
    ctx: &AuthorizationContext,
) -> Result<(), ReasonCode> {
    let Some(key) = requirement.bucket_argument else {
        return Ok(());
    };

    let bucket = arguments
        .get(key)
        .and_then(Value::as_str)
        .and_then(bucket_name)
        .ok_or(ReasonCode::BucketNotGranted)?;

    let level = ctx
        .bucket_level(bucket)
        .ok_or(ReasonCode::BucketNotGranted)?;

    if level < requirement.min_access {
        return Err(ReasonCode::InsufficientAccessLevel);
    }
    Ok(())
}

/// `s3://name/key...` → `name`; bare names pass through.
pub fn bucket_name(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    let name = match raw.strip_prefix("s3://") {
        Some(rest) => rest.split('/').next().unwrap_or_default(),
        None => raw,
    };
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::claims::{BucketGrant, DecodedClaims};
    use crate::services::auth::context::build_context;
    use crate::services::auth::schema::{AccessLevel, SchemaVersion};
    use chrono::Duration;
    use serde_json::json;

    fn ctx(now: DateTime<Utc>, permissions: &[&str], buckets: &[(&str, AccessLevel)]) -> AuthorizationContext {
        let claims = DecodedClaims {
            subject: "user-1".to_string(),
            tenant: Some("tenant-a".to_string()),
            issuer: None,
            audience: Vec::new(),
            issued_at: None,
            expires_at: now + Duration::minutes(5),
            schema_version: SchemaVersion::V1,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            buckets: buckets
                .iter()
                .map(|(name, level)| BucketGrant {
                    name: name.to_string(),
                    access_level: *level,
                })
                .collect(),
            roles: Vec::new(),
            aws_credentials: None,
        };
        build_context(claims, now).unwrap()
    }

    fn request(tool: &str, arguments: Value) -> ToolInvocationRequest {
        let Value::Object(arguments) = arguments else {
            panic!("arguments must be an object");
        };
        ToolInvocationRequest::new(tool, arguments)
    }

    fn gate() -> ToolAuthorizationGate {
        ToolAuthorizationGate::new(ToolPermissionTable::builtin())
    }

    #[test]
    fn read_with_read_grant_is_allowed() {
        let now = Utc::now();
        let ctx = ctx(now, &["storage:read"], &[("analytics", AccessLevel::Read)]);
        let decision = gate().authorize(
            &request("bucket_objects_list", json!({"bucket": "analytics"})),
            &ctx,
            now,
        );
        assert!(decision.allowed);
        assert_eq!(decision.matched_permission.as_deref(), Some("storage:read"));
    }

    #[test]
    fn write_with_read_grant_is_insufficient() {
        let now = Utc::now();
        let ctx = ctx(
            now,
            &["storage:read", "storage:write"],
            &[("analytics", AccessLevel::Read)],
        );
        let decision = gate().authorize(
            &request("bucket_objects_put", json!({"bucket": "analytics", "key": "a.csv"})),
            &ctx,
            now,
        );
        assert_eq!(decision.reason, Some(ReasonCode::InsufficientAccessLevel));
    }

    #[test]
    fn permission_is_checked_before_bucket() {
        let now = Utc::now();
        let ctx = ctx(now, &[], &[("analytics", AccessLevel::Admin)]);
        let decision = gate().authorize(
            &request("bucket_objects_list", json!({"bucket": "analytics"})),
            &ctx,
            now,
        );
        assert_eq!(decision.reason, Some(ReasonCode::MissingPermission));
    }

    #[test]
    fn bucket_argument_problems_deny() {
        let now = Utc::now();
        let ctx = ctx(now, &["storage:read"], &[("analytics", AccessLevel::Read)]);
        for args in [
            json!({}),
            json!({"bucket": 7}),
            json!({"bucket": ""}),
            json!({"bucket": "other"}),
            json!({"bucket": "s3:///key"}),
        ] {
            let decision = gate().authorize(&request("bucket_objects_list", args.clone()), &ctx, now);
            assert_eq!(decision.reason, Some(ReasonCode::BucketNotGranted), "{args}");
        }
    }

    #[test]
    fn s3_uri_reduces_to_bucket_name() {
        let now = Utc::now();
        let ctx = ctx(now, &["storage:read"], &[("analytics", AccessLevel::Read)]);
        let decision = gate().authorize(
            &request("bucket_object_info", json!({"bucket": "s3://analytics/raw/a.csv"})),
            &ctx,
            now,
        );
        assert!(decision.allowed);
    }

    #[test]
    fn unknown_tool_and_expired_context_deny() {
        let now = Utc::now();
        let ctx = ctx(now, &["storage:read"], &[]);
        assert_eq!(
            gate().authorize(&request("rm_rf", json!({})), &ctx, now).reason,
            Some(ReasonCode::UnmappedTool)
        );
        assert_eq!(
            gate()
                .authorize(&request("rm_rf", json!({})), &ctx, now + Duration::minutes(5))
                .reason,
            Some(ReasonCode::Expired)
        );
    }

    #[test]
    fn tools_without_bucket_need_only_permission() {
        let now = Utc::now();
        let ctx = ctx(now, &["identity:read"], &[]);
        assert!(gate().authorize(&request("auth_status", json!({})), &ctx, now).allowed);
    }

    #[test]
    fn visible_tools_follow_permissions() {
        let now = Utc::now();
        let ctx = ctx(now, &["identity:read", "search:read"], &[]);
        let names: Vec<String> = gate().visible_tools(&ctx).into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["auth_status", "search_catalog"]);
    }

    #[test]
    fn into_result_carries_reason() {
        assert_eq!(
            AuthDecision::deny(ReasonCode::MissingPermission).into_result(),
            Err(ReasonCode::MissingPermission)
        );
        assert_eq!(
            AuthDecision::allow("storage:read").into_result(),
            Ok("storage:read".to_string())
        );
    }
}
