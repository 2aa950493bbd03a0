/*
 * Responsibility
 * - Shared context bound to the Router (AppState)
 *   - auth pipeline, tool gate, credential provider, tool registry, audit log
 * - Cheap to clone (everything inside is Arc)
 *
 * Notes
 * - Read-only after startup except the audit summary and the optional session
 *   cache, neither of which holds per-request authorization data.
 */
use std::sync::Arc;

use crate::services::{
    audit::AuditLog, auth::AuthPipeline, authz::ToolAuthorizationGate,
    credentials::CredentialProvider, tools::ToolRegistry,
};

#[derive(Clone, Debug)]
pub struct AppState {
    pub auth: Arc<AuthPipeline>,
    pub gate: Arc<ToolAuthorizationGate>,
    pub credentials: Arc<CredentialProvider>,
    pub tools: Arc<ToolRegistry>,
    pub audit: Arc<AuditLog>,
}

impl AppState {
    pub fn new(
        auth: Arc<AuthPipeline>,
        gate: Arc<ToolAuthorizationGate>,
        credentials: Arc<CredentialProvider>,
        tools: Arc<ToolRegistry>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            auth,
            gate,
            credentials,
            tools,
            audit,
        }
    }
}
