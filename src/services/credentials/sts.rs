//! `RoleAssumer` backed by AWS STS `AssumeRole`, called with the process' base
//! identity (resolved once by `aws-config`).

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sts::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_sts::operation::assume_role::AssumeRoleError;
use aws_sdk_sts::types::Tag;
use chrono::DateTime;

use crate::config::Config;
use crate::services::credentials::provider::{
    AssumeRoleRequest, AssumedCredentials, RoleAssumer, RoleAssumptionError,
};

#[derive(Debug, Clone)]
pub struct StsRoleAssumer {
    client: aws_sdk_sts::Client,
}

impl StsRoleAssumer {
    pub async fn from_config(config: &Config) -> Self {
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.aws_region.clone()))
            .load()
            .await;

        let mut sts_builder = aws_sdk_sts::config::Builder::from(&shared_config);
        if let Some(endpoint) = &config.sts_endpoint_url {
            sts_builder = sts_builder.endpoint_url(endpoint.as_str());
        }

        Self {
            client: aws_sdk_sts::Client::from_conf(sts_builder.build()),
        }
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(
        &self,
        request: &AssumeRoleRequest,
    ) -> Result<AssumedCredentials, RoleAssumptionError> {
        let mut call = self
            .client
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .duration_seconds(request.duration_seconds);

        for (key, value) in &request.tags {
            let tag = Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|e| RoleAssumptionError::Rejected(e.to_string()))?;
            call = call.tags(tag);
        }

        let output = call.send().await.map_err(classify)?;
        let creds = output
            .credentials()
            .ok_or_else(|| RoleAssumptionError::Rejected("response has no credentials".into()))?;

        let expiration = DateTime::from_timestamp(creds.expiration().secs(), 0)
            .ok_or_else(|| RoleAssumptionError::Rejected("expiration out of range".into()))?;

        Ok(AssumedCredentials {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().to_string(),
            expiration,
        })
    }
}

fn classify<R>(err: SdkError<AssumeRoleError, R>) -> RoleAssumptionError {
    match &err {
        SdkError::TimeoutError(_) => RoleAssumptionError::Timeout,
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            RoleAssumptionError::Transient("sts unreachable".into())
        }
        SdkError::ServiceError(service) => classify_code(service.err().code()),
        _ => RoleAssumptionError::Rejected("request could not be built".into()),
    }
}

fn classify_code(code: Option<&str>) -> RoleAssumptionError {
    match code {
        Some("AccessDenied" | "AccessDeniedException") => RoleAssumptionError::AccessDenied,
        Some(
            "Throttling"
            | "ThrottlingException"
            | "RequestTimeout"
            | "ServiceUnavailable"
            | "InternalFailure"
            | "IDPCommunicationError",
        ) => RoleAssumptionError::Transient(code.unwrap_or_default().to_string()),
        Some(other) => RoleAssumptionError::Rejected(other.to_string()),
        None => RoleAssumptionError::Transient("unclassified service error".into()),
    }
}
