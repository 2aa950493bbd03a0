/// Factory: build the `AuthPipeline` from application `Config`.
use std::sync::Arc;

use crate::config::{Config, ConfigError};
use crate::services::auth::{AuthPipeline, SignatureValidator};

pub fn build_auth_pipeline(config: &Config) -> Result<Arc<AuthPipeline>, ConfigError> {
    let validator = SignatureValidator::new(
        &config.key_material,
        &config.auth_issuer,
        &config.auth_audience,
        config.clock_skew_seconds,
    )
    .map_err(|e| {
        tracing::error!(error = %e, "failed to load token verification key");
        ConfigError::Invalid("JWT_SECRET|JWT_PUBLIC_KEY_PEM|JWT_JWKS")
    })?;

    Ok(Arc::new(AuthPipeline::new(validator)))
}
