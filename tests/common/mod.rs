//! Shared fixtures for the integration suites: token minting, a scripted STS
//! and an in-process router.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use chrono::{DateTime, DurationRound, Utc};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tower::ServiceExt;

use toolgate::app::build_router;
use toolgate::services::audit::AuditLog;
use toolgate::services::auth::access_jwt::{KeyMaterial, SignatureValidator};
use toolgate::services::auth::claims::{AwsCredentialClaim, BucketGrant, DecodedClaims, RoleRef};
use toolgate::services::auth::mint::TokenMinter;
use toolgate::services::auth::schema::{AccessLevel, SchemaVersion};
use toolgate::services::auth::{AuthPipeline, AuthorizationContext};
use toolgate::services::authz::{ToolAuthorizationGate, ToolPermissionTable};
use toolgate::services::credentials::{
    AssumeRoleRequest, AssumedCredentials, ClientFactory, CredentialProvider, ProviderSettings,
    RoleAssumer, RoleAssumptionError, SessionCache,
};
use toolgate::services::tools::{ToolError, ToolHandler, ToolRegistry};
use toolgate::state::AppState;

pub const SECRET: &[u8] = b"integration-secret";
pub const ISSUER: &str = "https://issuer.example";
pub const AUDIENCE: &str = "toolgate";
pub const ROLE_ARN: &str = "arn:aws:iam::111111111111:role/shared-data-role";

pub fn now() -> DateTime<Utc> {
    Utc::now()
        .duration_trunc(chrono::Duration::seconds(1))
        .unwrap()
}

/// Claims with sensible defaults; tests tweak what they care about.
pub fn claims(subject: &str, permissions: &[&str], buckets: &[(&str, AccessLevel)]) -> DecodedClaims {
    let now = now();
    DecodedClaims {
        subject: subject.to_string(),
        tenant: None,
        issuer: Some(ISSUER.to_string()),
        audience: vec![AUDIENCE.to_string()],
        issued_at: Some(now),
        expires_at: now + chrono::Duration::minutes(10),
        schema_version: SchemaVersion::V2,
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
    }
}

pub fn with_role(claims: DecodedClaims, tenant: &str) -> DecodedClaims {
    with_role_arn(claims, tenant, ROLE_ARN)
}

pub fn with_role_arn(mut claims: DecodedClaims, tenant: &str, role_arn: &str) -> DecodedClaims {
    claims.tenant = Some(tenant.to_string());
    claims.aws_credentials = Some(AwsCredentialClaim::Role(RoleRef {
        role_arn: role_arn.to_string(),
    }));
    claims
}

/// Access key `FakeSts` answers with for a tenant tag and role ARN.
pub fn access_key(tenant: &str, role_arn: &str) -> String {
    let role = role_arn.rsplit('/').next().unwrap_or(role_arn);
    format!("ASIA-{tenant}-{role}")
}

pub fn mint(claims: &DecodedClaims) -> String {
    TokenMinter::hs256(SECRET).mint(claims).unwrap()
}

pub fn pipeline() -> AuthPipeline {
    AuthPipeline::new(
        SignatureValidator::new(&KeyMaterial::SharedSecret(SECRET.to_vec()), ISSUER, AUDIENCE, 30)
            .unwrap(),
    )
}

pub fn context(claims: &DecodedClaims) -> AuthorizationContext {
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        format!("Bearer {}", mint(claims)).parse().unwrap(),
    );
    pipeline().authenticate(&headers, Utc::now()).unwrap()
}

/// Scripted STS. Answers are derived from the `tenant` session tag and the
/// requested role ARN, so a cross-tenant or cross-role mix-up is visible in the
/// returned access key.
pub struct FakeSts {
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<AssumeRoleRequest>>,
    failures: Mutex<VecDeque<RoleAssumptionError>>,
    delay: Duration,
    lifetime: chrono::Duration,
}

impl FakeSts {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            lifetime: chrono::Duration::hours(1),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue failures returned before any success.
    pub fn failing_with(self, failures: impl IntoIterator<Item = RoleAssumptionError>) -> Self {
        self.failures.lock().extend(failures);
        self
    }

    /// Script the next answer to be a failure.
    pub fn fail_next(&self, err: RoleAssumptionError) {
        self.failures.lock().push_back(err);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn tag<'a>(request: &'a AssumeRoleRequest, key: &str) -> Option<&'a str> {
    request
        .tags
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[async_trait]
impl RoleAssumer for FakeSts {
    async fn assume_role(
        &self,
        request: &AssumeRoleRequest,
    ) -> Result<AssumedCredentials, RoleAssumptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        let tenant = tag(request, "tenant").unwrap_or("none").to_string();
        Ok(AssumedCredentials {
            access_key_id: access_key(&tenant, &request.role_arn),
            secret_access_key: format!("secret-{tenant}"),
            session_token: format!("session-{tenant}"),
            expiration: Utc::now() + self.lifetime,
        })
    }
}

pub fn provider(sts: Arc<FakeSts>, cache: bool, attempt_timeout: Duration) -> CredentialProvider {
    CredentialProvider::new(
        sts,
        ProviderSettings {
            region: "us-east-1".to_string(),
            max_session_seconds: 900,
            attempt_timeout,
        },
        cache.then(|| SessionCache::new(64)),
    )
}

/// Stand-in storage tool: reports which credentials it was handed.
pub struct EchoCredentialsTool(pub &'static str);

#[async_trait]
impl ToolHandler for EchoCredentialsTool {
    fn name(&self) -> &'static str {
        self.0
    }

    fn needs_cloud_credentials(&self) -> bool {
        true
    }

    async fn call(
        &self,
        ctx: &AuthorizationContext,
        arguments: &Map<String, Value>,
        clients: Option<&ClientFactory>,
    ) -> Result<Value, ToolError> {
        let clients = clients.ok_or_else(|| ToolError::Failed("no clients".into()))?;
        Ok(json!({
            "tenant_id": ctx.tenant_id(),
            "factory_tenant": clients.tenant_id(),
            "access_key_id": clients.access_key_id(),
            "source": clients.source().as_str(),
            "bucket": arguments.get("bucket"),
        }))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub sts: Arc<FakeSts>,
}

pub fn app() -> TestApp {
    let sts = Arc::new(FakeSts::new());
    let mut tools = ToolRegistry::builtin();
    tools.register(Arc::new(EchoCredentialsTool("bucket_object_info")));
    tools.register(Arc::new(EchoCredentialsTool("bucket_objects_put")));

    let state = AppState::new(
        Arc::new(pipeline()),
        Arc::new(ToolAuthorizationGate::new(ToolPermissionTable::builtin())),
        Arc::new(provider(sts.clone(), false, Duration::from_secs(1))),
        Arc::new(tools),
        Arc::new(AuditLog::new(Duration::from_secs(3600))),
    );
    TestApp {
        router: build_router(state.clone()),
        state,
        sts,
    }
}

pub fn call_request(token: Option<&str>, tool: &str, arguments: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/tools/call")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(
            json!({"name": tool, "arguments": arguments}).to_string(),
        ))
        .unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> (u16, Value) {
    let response: Response<Body> = router.clone().oneshot(request).await.unwrap();
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}
