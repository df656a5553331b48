//! Production [`AwsFacade`] backed by the AWS SDK.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sts::config::Credentials;
use tracing::{debug, info};

use crate::config::AssumeRole;
use crate::error::{CredentialError, Result};

use super::{AssumedCredentials, AwsFacade};

/// [`AwsFacade`] implementation using STS and IAM.
#[derive(Debug, Default, Clone, Copy)]
pub struct StsFacade;

impl StsFacade {
    /// Builds an SDK configuration for the given credentials and region.
    async fn sdk_config(
        credentials: Option<&AssumedCredentials>,
        region: Option<&str>,
    ) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        if let Some(creds) = credentials {
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                Some(creds.session_token.clone()),
                None,
                "runway-assumed-role",
            ));
        }
        loader.load().await
    }
}

#[async_trait]
impl AwsFacade for StsFacade {
    async fn assume_role<'a>(
        &'a self,
        role: &'a AssumeRole,
        region: Option<&'a str>,
    ) -> Result<AssumedCredentials> {
        info!("Assuming role: {}", role.role_arn);

        let config = Self::sdk_config(None, region).await;
        let client = aws_sdk_sts::Client::new(&config);

        let duration = i32::try_from(role.duration_seconds).map_err(|_| {
            CredentialError::AssumeRoleFailed {
                role_arn: role.role_arn.clone(),
                message: format!("duration {} does not fit an STS request", role.duration_seconds),
            }
        })?;

        let response = client
            .assume_role()
            .role_arn(&role.role_arn)
            .role_session_name(&role.session_name)
            .duration_seconds(duration)
            .send()
            .await
            .map_err(|e| CredentialError::AssumeRoleFailed {
                role_arn: role.role_arn.clone(),
                message: e.to_string(),
            })?;

        let credentials = response.credentials().ok_or_else(|| {
            CredentialError::AssumeRoleFailed {
                role_arn: role.role_arn.clone(),
                message: String::from("response carried no credentials"),
            }
        })?;

        debug!("Assumed role session: {}", role.session_name);
        Ok(AssumedCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
        })
    }

    async fn account_id<'a>(
        &'a self,
        credentials: Option<&'a AssumedCredentials>,
        region: Option<&'a str>,
    ) -> Result<String> {
        let config = Self::sdk_config(credentials, region).await;
        let client = aws_sdk_sts::Client::new(&config);

        let identity = client.get_caller_identity().send().await.map_err(|e| {
            CredentialError::IdentityUnavailable {
                message: e.to_string(),
            }
        })?;

        identity
            .account()
            .map(ToString::to_string)
            .ok_or_else(|| {
                CredentialError::IdentityUnavailable {
                    message: String::from("caller identity carried no account id"),
                }
                .into()
            })
    }

    async fn account_aliases<'a>(
        &'a self,
        credentials: Option<&'a AssumedCredentials>,
        region: Option<&'a str>,
    ) -> Result<Vec<String>> {
        let config = Self::sdk_config(credentials, region).await;
        let client = aws_sdk_iam::Client::new(&config);

        let response = client.list_account_aliases().send().await.map_err(|e| {
            CredentialError::IdentityUnavailable {
                message: e.to_string(),
            }
        })?;

        Ok(response.account_aliases().to_vec())
    }
}
