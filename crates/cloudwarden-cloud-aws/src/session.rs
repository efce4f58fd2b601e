//! AWS session resolution
//!
//! Loads SDK configuration once per invocation and hands out service clients
//! built from the same config.

use crate::error::classify_sdk_error;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use cloudwarden_cloud::CloudError;
use std::sync::Arc;
use tracing::{debug, info};

/// Region used by IAM/STS-only commands when nothing else supplies one
pub const GLOBAL_SERVICE_REGION: &str = "us-east-1";

/// Resolved profile, region, SDK config and the verified caller account
#[derive(Clone)]
pub struct AwsSession {
    config: Arc<SdkConfig>,
    region: String,
    profile: Option<String>,
    account: String,
}

impl AwsSession {
    /// Resolve a session
    ///
    /// Region precedence: explicit `region`, then the profile/environment
    /// chain, then `fallback_region`. The credentials are checked with STS
    /// before the session is returned; a missing region, an empty credential
    /// chain or a rejected identity call all fail with
    /// [`CloudError::CredentialsUnavailable`].
    pub async fn resolve(
        profile: Option<&str>,
        region: Option<&str>,
        fallback_region: Option<&str>,
    ) -> Result<Self, CloudError> {
        let mut config = load(profile, region).await;

        if config.region().is_none() {
            if let Some(fallback) = fallback_region {
                debug!(region = fallback, "No region configured, using fallback");
                config = load(profile, Some(fallback)).await;
            }
        }

        let region = config
            .region()
            .map(|r| r.to_string())
            .ok_or_else(|| {
                CloudError::CredentialsUnavailable(
                    "No AWS region configured; pass --region or set AWS_REGION".to_string(),
                )
            })?;

        let account = caller_account(&config, profile).await?;

        info!(
            account_id = %account,
            region = %region,
            profile = ?profile,
            "AWS credentials verified"
        );
        Ok(Self {
            config: Arc::new(config),
            region,
            profile: profile.map(str::to_string),
            account,
        })
    }

    /// Account id returned by STS when the session was resolved
    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn ec2_client(&self) -> aws_sdk_ec2::Client {
        aws_sdk_ec2::Client::new(self.sdk_config())
    }

    pub fn iam_client(&self) -> aws_sdk_iam::Client {
        aws_sdk_iam::Client::new(self.sdk_config())
    }

    pub fn s3_client(&self) -> aws_sdk_s3::Client {
        aws_sdk_s3::Client::new(self.sdk_config())
    }

}

impl std::fmt::Debug for AwsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSession")
            .field("region", &self.region)
            .field("profile", &self.profile)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

async fn load(profile: Option<&str>, region: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }
    loader.load().await
}

async fn caller_account(config: &SdkConfig, profile: Option<&str>) -> Result<String, CloudError> {
    let identity = aws_sdk_sts::Client::new(config)
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| {
            let origin = match profile {
                Some(p) => format!("profile {:?}", p),
                None => "the default credential chain".to_string(),
            };
            CloudError::CredentialsUnavailable(format!(
                "No usable AWS credentials from {}: {}",
                origin,
                classify_sdk_error(&e)
            ))
        })?;

    identity.account().map(str::to_string).ok_or_else(|| {
        CloudError::CredentialsUnavailable(
            "No account ID returned from STS GetCallerIdentity".to_string(),
        )
    })
}
