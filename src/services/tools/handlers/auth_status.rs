//! `auth_status`: the caller's own authorization context, minus secrets.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::services::auth::{AuthorizationContext, CredentialHandle};
use crate::services::credentials::ClientFactory;
use crate::services::tools::{ToolError, ToolHandler};

pub struct AuthStatusTool;

#[async_trait]
impl ToolHandler for AuthStatusTool {
    fn name(&self) -> &'static str {
        "auth_status"
    }

    async fn call(
        &self,
        ctx: &AuthorizationContext,
        _arguments: &Map<String, Value>,
        _clients: Option<&ClientFactory>,
    ) -> Result<Value, ToolError> {
        let credentials = match ctx.credential_handle() {
            CredentialHandle::None => json!({ "source": "none" }),
            CredentialHandle::Embedded(creds) => json!({
                "source": "embedded",
                "expires_at": creds.expiration,
            }),
            CredentialHandle::AssumeRole(role) => json!({
                "source": "assume_role",
                "role_arn": role.role_arn,
            }),
        };

        Ok(json!({
            "scheme": ctx.scheme(),
            "request_id": ctx.request_id(),
            "user_id": ctx.user_id(),
            "tenant_id": ctx.tenant_id(),
            "permissions": ctx.permissions(),
            "buckets": ctx.bucket_grants(),
            "roles": ctx.roles(),
            "expires_at": ctx.expires_at(),
            "credentials": credentials,
        }))
    }
}
