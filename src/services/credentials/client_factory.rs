/*
 * Responsibility
 * - Request-scoped, tenant-scoped producer of cloud clients
 * - Holds the credentials a single request may use, and how long they are good for
 *
 * Notes
 * - Built per request by CredentialProvider; never stored in shared state.
 * - Debug output never includes key material.
 */
use std::fmt;
use std::time::SystemTime;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use chrono::{DateTime, Utc};

const PROVIDER_NAME: &str = "toolgate";

/// Where the scoped credentials came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Embedded,
    AssumedRole { role_arn: String },
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Embedded => "embedded",
            CredentialSource::AssumedRole { .. } => "assumed_role",
        }
    }
}

/// Static credential set plus the settings needed to build SDK clients.
#[derive(Clone)]
pub struct ScopedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

#[derive(Clone)]
pub struct ClientFactory {
    source: CredentialSource,
    tenant_id: String,
    region: String,
    credentials: ScopedCredentials,
    valid_until: DateTime<Utc>,
}

impl fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientFactory")
            .field("source", &self.source)
            .field("tenant_id", &self.tenant_id)
            .field("region", &self.region)
            .field("valid_until", &self.valid_until)
            .finish_non_exhaustive()
    }
}

impl ClientFactory {
    pub(crate) fn new(
        source: CredentialSource,
        tenant_id: &str,
        region: &str,
        credentials: ScopedCredentials,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            tenant_id: tenant_id.to_string(),
            region: region.to_string(),
            credentials,
            valid_until,
        }
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn valid_until(&self) -> DateTime<Utc> {
        self.valid_until
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until > now
    }

    /// Access key id only; safe to show to the caller as a session identifier.
    pub fn access_key_id(&self) -> &str {
        &self.credentials.access_key_id
    }

    fn sdk_credentials(&self) -> Credentials {
        Credentials::new(
            self.credentials.access_key_id.clone(),
            self.credentials.secret_access_key.clone(),
            Some(self.credentials.session_token.clone()),
            Some(SystemTime::from(self.valid_until)),
            PROVIDER_NAME,
        )
    }

    /// S3 client bound to these credentials only. No ambient credential chain
    /// is consulted.
    pub fn s3_client(&self) -> aws_sdk_s3::Client {
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(self.sdk_credentials())
            .build();
        aws_sdk_s3::Client::from_conf(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn debug_output_has_no_secrets() {
        let factory = ClientFactory::new(
            CredentialSource::Embedded,
            "tenant-a",
            "us-east-1",
            ScopedCredentials {
                access_key_id: "ASIAEXAMPLE".to_string(),
                secret_access_key: "very-secret".to_string(),
                session_token: "session-token".to_string(),
            },
            Utc::now() + Duration::minutes(5),
        );
        let printed = format!("{factory:?}");
        assert!(printed.contains("tenant-a"));
        assert!(!printed.contains("very-secret"));
        assert!(!printed.contains("session-token"));
        assert!(!printed.contains("ASIAEXAMPLE"));
    }
}
