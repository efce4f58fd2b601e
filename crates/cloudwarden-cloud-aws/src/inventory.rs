//! Read-only inventory queries outside the action pipeline
//!
//! Buckets, object keys and regions have no lifecycle actions, so they are
//! listed directly instead of going through [`cloudwarden_cloud::ProviderApi`].

use crate::convert::timestamp;
use crate::error::classify_sdk_error;
use crate::session::AwsSession;
use chrono::{DateTime, Utc};
use cloudwarden_cloud::ProviderError;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct BucketSummary {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionSummary {
    pub name: String,
    pub endpoint: Option<String>,
    pub opt_in_status: Option<String>,
}

pub struct Inventory {
    ec2: aws_sdk_ec2::Client,
    s3: aws_sdk_s3::Client,
}

impl Inventory {
    pub fn new(session: &AwsSession) -> Self {
        Self {
            ec2: session.ec2_client(),
            s3: session.s3_client(),
        }
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketSummary>, ProviderError> {
        let response = self
            .s3
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| {
                Some(BucketSummary {
                    name: b.name()?.to_string(),
                    created_at: timestamp(b.creation_date()),
                })
            })
            .collect())
    }

    /// Object keys under `prefix`, following continuation tokens up to `max_keys`
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_keys: Option<usize>,
    ) -> Result<Vec<ObjectSummary>, ProviderError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.s3.list_objects_v2().bucket(bucket);
            if let Some(prefix) = prefix {
                request = request.prefix(prefix);
            }
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| classify_sdk_error(&e))?;

            for object in response.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                objects.push(ObjectSummary {
                    key: key.to_string(),
                    size: object.size().unwrap_or_default(),
                    last_modified: timestamp(object.last_modified()),
                    storage_class: object.storage_class().map(|c| c.as_str().to_string()),
                });
                if max_keys.is_some_and(|max| objects.len() >= max) {
                    return Ok(objects);
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
                debug!(bucket, listed = objects.len(), "Fetching next object page");
            } else {
                break;
            }
        }

        Ok(objects)
    }

    /// Regions enabled for the account
    pub async fn list_regions(&self) -> Result<Vec<RegionSummary>, ProviderError> {
        let response = self
            .ec2
            .describe_regions()
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let mut regions: Vec<_> = response
            .regions()
            .iter()
            .filter_map(|r| {
                Some(RegionSummary {
                    name: r.region_name()?.to_string(),
                    endpoint: r.endpoint().map(str::to_string),
                    opt_in_status: r.opt_in_status().map(str::to_string),
                })
            })
            .collect();
        regions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(regions)
    }
}
