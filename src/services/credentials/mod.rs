pub mod client_factory;
pub mod provider;
pub mod session_cache;
pub mod sts;

use std::sync::Arc;

use crate::config::Config;

pub use client_factory::{ClientFactory, CredentialSource};
pub use provider::{
    AssumeRoleRequest, AssumedCredentials, CredentialError, CredentialProvider, ProviderSettings,
    RoleAssumer, RoleAssumptionError,
};
pub use session_cache::{SessionCache, SessionKey};
pub use sts::StsRoleAssumer;

/// Factory: credential provider from `Config`, backed by the given role assumer.
pub fn build_credential_provider(
    config: &Config,
    assumer: Arc<dyn RoleAssumer>,
) -> Arc<CredentialProvider> {
    let settings = ProviderSettings {
        region: config.aws_region.clone(),
        max_session_seconds: config.role_max_session_seconds,
        attempt_timeout: config.role_assume_timeout,
    };
    let cache = config
        .role_session_cache
        .then(|| SessionCache::new(config.role_session_cache_capacity));

    Arc::new(CredentialProvider::new(assumer, settings, cache))
}
