/*
 * Responsibility
 * - Load Config → build services → assemble the Router
 * - Apply middleware (access pipeline on matched routes, HTTP layers on everything)
 * - Start with axum::serve()
 */
use std::{panic, process, sync::Arc};

use anyhow::Result;
use axum::{Router, routing::get};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::api::v1::handlers::health::{auth_health, health};
use crate::config::Config;
use crate::middleware;
use crate::services::{
    audit::AuditLog,
    auth::build_auth_pipeline,
    authz::{ToolAuthorizationGate, ToolPermissionTable},
    credentials::{StsRoleAssumer, build_credential_provider},
    tools::ToolRegistry,
};
use crate::state::AppState;

fn init_tracing() {
    // RUST_LOG wins, e.g. RUST_LOG=info,toolgate::audit=debug
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    let abort_on_panic = !config.app_env.is_production();
    init_panic_hook(abort_on_panic);

    tracing::info!(
        "starting toolgate in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Process-level services, built once and shared read-only.
pub async fn build_state(config: &Config) -> Result<AppState> {
    let auth = build_auth_pipeline(config)?;
    let assumer = Arc::new(StsRoleAssumer::from_config(config).await);
    let credentials = build_credential_provider(config, assumer);

    tracing::info!(
        region = %config.aws_region,
        session_cache = config.role_session_cache,
        max_session_seconds = config.role_max_session_seconds,
        "credential provider ready"
    );

    Ok(AppState::new(
        auth,
        Arc::new(ToolAuthorizationGate::new(ToolPermissionTable::builtin())),
        credentials,
        Arc::new(ToolRegistry::builtin()),
        Arc::new(AuditLog::new(config.audit_window)),
    ))
}

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/health/auth", get(auth_health))
        .nest("/api/v1", api::v1::routes());

    let router = middleware::auth::access::apply(router, state.clone());
    middleware::http::apply(router.with_state(state))
}
