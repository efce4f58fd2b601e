//! [`ProviderApi`] and [`IdentityApi`] over EC2 and IAM

use crate::convert;
use crate::error::classify_sdk_error;
use crate::session::AwsSession;
use async_trait::async_trait;
use aws_sdk_ec2::types::{ResourceType, Tag, TagSpecification};
use aws_sdk_iam::types::StatusType;
use cloudwarden_cloud::{
    ActionParams, ActionType, IdentityApi, NewAccessKey, OperationId, Page, ProviderApi,
    ProviderError, ResourceDescriptor, ResourceKind,
};
use tracing::debug;

/// Page size requested from paginated APIs
const PAGE_SIZE: i32 = 100;

/// Tag key carrying the date after which a snapshot may be deleted
pub const DELETE_ON_TAG: &str = "Delete-on";

/// Parameter keys understood by [`AwsProvider::mutate`]
pub mod param_keys {
    pub const DESCRIPTION: &str = "description";
    pub const DELETE_ON: &str = "delete_on";
    pub const PATH: &str = "path";
}

pub struct AwsProvider {
    ec2: aws_sdk_ec2::Client,
    iam: aws_sdk_iam::Client,
    region: String,
}

impl AwsProvider {
    pub fn new(session: &AwsSession) -> Self {
        Self {
            ec2: session.ec2_client(),
            iam: session.iam_client(),
            region: session.region().to_string(),
        }
    }

    async fn list_instances(&self, token: Option<String>) -> Result<Page, ProviderError> {
        let response = self
            .ec2
            .describe_instances()
            .max_results(PAGE_SIZE)
            .set_next_token(token)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let items = response
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .filter_map(convert::instance)
            .collect();
        Ok(Page::new(items, response.next_token().map(str::to_string)))
    }

    /// Includes stopped instances; filtering by state happens above the provider
    async fn list_instance_statuses(&self, token: Option<String>) -> Result<Page, ProviderError> {
        let response = self
            .ec2
            .describe_instance_status()
            .include_all_instances(true)
            .max_results(PAGE_SIZE)
            .set_next_token(token)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let items = response
            .instance_statuses()
            .iter()
            .filter_map(convert::instance_status)
            .collect();
        Ok(Page::new(items, response.next_token().map(str::to_string)))
    }

    async fn list_volumes(&self, token: Option<String>) -> Result<Page, ProviderError> {
        let response = self
            .ec2
            .describe_volumes()
            .max_results(PAGE_SIZE)
            .set_next_token(token)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let items = response
            .volumes()
            .iter()
            .filter_map(convert::volume)
            .collect();
        Ok(Page::new(items, response.next_token().map(str::to_string)))
    }

    async fn list_snapshots(&self, token: Option<String>) -> Result<Page, ProviderError> {
        let response = self
            .ec2
            .describe_snapshots()
            .owner_ids("self")
            .max_results(PAGE_SIZE)
            .set_next_token(token)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let items = response
            .snapshots()
            .iter()
            .filter_map(convert::snapshot)
            .collect();
        Ok(Page::new(items, response.next_token().map(str::to_string)))
    }

    /// One page of IAM users with their next marker
    async fn user_page(
        &self,
        marker: Option<String>,
    ) -> Result<(Vec<aws_sdk_iam::types::User>, Option<String>), ProviderError> {
        let response = self
            .iam
            .list_users()
            .max_items(PAGE_SIZE)
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let next = if response.is_truncated() {
            response.marker().map(str::to_string)
        } else {
            None
        };
        Ok((response.users().to_vec(), next))
    }

    async fn user_tags(
        &self,
        user_name: &str,
    ) -> Result<std::collections::HashMap<String, String>, ProviderError> {
        let response = self
            .iam
            .list_user_tags()
            .user_name(user_name)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        Ok(convert::extract_iam_tags(response.tags()))
    }

    async fn list_users(&self, marker: Option<String>) -> Result<Page, ProviderError> {
        let (users, next) = self.user_page(marker).await?;
        let mut items = Vec::with_capacity(users.len());
        for user in &users {
            let tags = self.user_tags(user.user_name()).await?;
            items.push(convert::user(user, tags));
        }
        Ok(Page::new(items, next))
    }

    /// Keys of every user on one user page
    async fn list_access_keys(&self, marker: Option<String>) -> Result<Page, ProviderError> {
        let (users, next) = self.user_page(marker).await?;
        let mut items = Vec::new();
        for user in &users {
            items.extend(self.keys_for_user(user.user_name()).await?);
        }
        Ok(Page::new(items, next))
    }

    async fn keys_for_user(
        &self,
        user_name: &str,
    ) -> Result<Vec<ResourceDescriptor>, ProviderError> {
        let response = self
            .iam
            .list_access_keys()
            .user_name(user_name)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let mut keys = Vec::new();
        for key in response.access_key_metadata() {
            let Some(key_id) = key.access_key_id() else {
                continue;
            };
            let last_used = self
                .iam
                .get_access_key_last_used()
                .access_key_id(key_id)
                .send()
                .await
                .map_err(|e| classify_sdk_error(&e))?;
            let last_used_date = last_used
                .access_key_last_used()
                .and_then(|l| l.last_used_date());
            if let Some(descriptor) = convert::access_key(key, user_name, last_used_date) {
                keys.push(descriptor);
            }
        }
        debug!(user = user_name, keys = keys.len(), "Listed access keys");
        Ok(keys)
    }

    async fn describe_access_key(&self, key_id: &str) -> Result<ResourceDescriptor, ProviderError> {
        let owner = self
            .iam
            .get_access_key_last_used()
            .access_key_id(key_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        let user_name = owner
            .user_name()
            .ok_or_else(|| ProviderError::NotFound(key_id.to_string()))?;

        self.keys_for_user(user_name)
            .await?
            .into_iter()
            .find(|d| d.id() == key_id)
            .ok_or_else(|| ProviderError::NotFound(key_id.to_string()))
    }

    fn key_owner(target: &ResourceDescriptor) -> Result<String, ProviderError> {
        target.metadata_field::<String>("user_name").ok_or_else(|| {
            ProviderError::InvalidParameter(format!(
                "access key {} has no owning user",
                target.id()
            ))
        })
    }
}

fn not_found(kind: ResourceKind, id: &str) -> ProviderError {
    ProviderError::NotFound(format!("{} {}", kind, id))
}

#[async_trait]
impl ProviderApi for AwsProvider {
    async fn list_resources(
        &self,
        kind: ResourceKind,
        page_token: Option<String>,
    ) -> Result<Page, ProviderError> {
        match kind {
            ResourceKind::Instance => self.list_instances(page_token).await,
            ResourceKind::InstanceStatus => self.list_instance_statuses(page_token).await,
            ResourceKind::Volume => self.list_volumes(page_token).await,
            ResourceKind::Snapshot => self.list_snapshots(page_token).await,
            ResourceKind::User => self.list_users(page_token).await,
            ResourceKind::Credential => self.list_access_keys(page_token).await,
            ResourceKind::Object => Err(ProviderError::InvalidParameter(
                "object listing requires a bucket; use the object store inventory".to_string(),
            )),
        }
    }

    async fn describe_resource(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<ResourceDescriptor, ProviderError> {
        match kind {
            ResourceKind::Instance => {
                let response = self
                    .ec2
                    .describe_instances()
                    .instance_ids(id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(&e))?;
                response
                    .reservations()
                    .iter()
                    .flat_map(|r| r.instances())
                    .find_map(convert::instance)
                    .ok_or_else(|| not_found(kind, id))
            }
            ResourceKind::InstanceStatus => {
                let response = self
                    .ec2
                    .describe_instance_status()
                    .instance_ids(id)
                    .include_all_instances(true)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(&e))?;
                response
                    .instance_statuses()
                    .iter()
                    .find_map(convert::instance_status)
                    .ok_or_else(|| not_found(kind, id))
            }
            ResourceKind::Volume => {
                let response = self
                    .ec2
                    .describe_volumes()
                    .volume_ids(id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(&e))?;
                response
                    .volumes()
                    .iter()
                    .find_map(convert::volume)
                    .ok_or_else(|| not_found(kind, id))
            }
            ResourceKind::Snapshot => {
                let response = self
                    .ec2
                    .describe_snapshots()
                    .snapshot_ids(id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(&e))?;
                response
                    .snapshots()
                    .iter()
                    .find_map(convert::snapshot)
                    .ok_or_else(|| not_found(kind, id))
            }
            ResourceKind::User => {
                let response = self
                    .iam
                    .get_user()
                    .user_name(id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(&e))?;
                let user = response.user().ok_or_else(|| not_found(kind, id))?;
                let tags = convert::extract_iam_tags(user.tags());
                Ok(convert::user(user, tags))
            }
            ResourceKind::Credential => self.describe_access_key(id).await,
            ResourceKind::Object => Err(ProviderError::InvalidParameter(
                "objects cannot be described individually".to_string(),
            )),
        }
    }

    async fn mutate(
        &self,
        action: ActionType,
        target: &ResourceDescriptor,
        params: &ActionParams,
    ) -> Result<OperationId, ProviderError> {
        let id = target.id();
        debug!(%action, id, region = %self.region, "Issuing mutating call");

        match action {
            ActionType::Start => {
                self.ec2
                    .start_instances()
                    .instance_ids(id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(&e))?;
            }
            ActionType::Stop => {
                self.ec2
                    .stop_instances()
                    .instance_ids(id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(&e))?;
            }
            ActionType::Reboot => {
                self.ec2
                    .reboot_instances()
                    .instance_ids(id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(&e))?;
            }
            ActionType::Terminate => {
                self.ec2
                    .terminate_instances()
                    .instance_ids(id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(&e))?;
            }
            ActionType::CreateSnapshot => {
                let mut tags = TagSpecification::builder().resource_type(ResourceType::Snapshot);
                if let Some(delete_on) = params.get(param_keys::DELETE_ON) {
                    tags = tags.tags(Tag::builder().key(DELETE_ON_TAG).value(delete_on).build());
                }
                for (key, value) in &params.tags {
                    tags = tags.tags(Tag::builder().key(key).value(value).build());
                }

                let response = self
                    .ec2
                    .create_snapshot()
                    .volume_id(id)
                    .set_description(params.get(param_keys::DESCRIPTION).map(str::to_string))
                    .tag_specifications(tags.build())
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(&e))?;

                let snapshot_id = response.snapshot_id().ok_or_else(|| ProviderError::Rejected {
                    code: "MissingSnapshotId".to_string(),
                    message: format!("create_snapshot for {} returned no snapshot id", id),
                })?;
                return Ok(OperationId::new(snapshot_id));
            }
            ActionType::DeleteVolume => {
                self.ec2
                    .delete_volume()
                    .volume_id(id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(&e))?;
            }
            ActionType::DeactivateKey => {
                self.iam
                    .update_access_key()
                    .user_name(Self::key_owner(target)?)
                    .access_key_id(id)
                    .status(StatusType::Inactive)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(&e))?;
            }
            ActionType::DeleteKey => {
                self.iam
                    .delete_access_key()
                    .user_name(Self::key_owner(target)?)
                    .access_key_id(id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(&e))?;
            }
            ActionType::CreateUser => {
                let mut request = self
                    .iam
                    .create_user()
                    .user_name(id)
                    .path(params.get(param_keys::PATH).unwrap_or("/"));
                for (key, value) in &params.tags {
                    let tag = aws_sdk_iam::types::Tag::builder()
                        .key(key)
                        .value(value)
                        .build()
                        .map_err(|e| ProviderError::InvalidParameter(e.to_string()))?;
                    request = request.tags(tag);
                }
                request.send().await.map_err(|e| classify_sdk_error(&e))?;
            }
        }

        Ok(OperationId::new(id))
    }
}

#[async_trait]
impl IdentityApi for AwsProvider {
    async fn user_groups(&self, user_name: &str) -> Result<Vec<String>, ProviderError> {
        let mut groups = Vec::new();
        let mut marker = None;
        loop {
            let response = self
                .iam
                .list_groups_for_user()
                .user_name(user_name)
                .max_items(PAGE_SIZE)
                .set_marker(marker)
                .send()
                .await
                .map_err(|e| classify_sdk_error(&e))?;
            groups.extend(response.groups().iter().map(|g| g.group_name().to_string()));

            marker = match response.marker() {
                Some(next) if response.is_truncated() => Some(next.to_string()),
                _ => break,
            };
        }
        debug!(user = user_name, groups = groups.len(), "Listed group memberships");
        Ok(groups)
    }

    async fn attach_user_policy(
        &self,
        user_name: &str,
        policy_arn: &str,
    ) -> Result<(), ProviderError> {
        self.iam
            .attach_user_policy()
            .user_name(user_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        Ok(())
    }

    async fn create_login_profile(
        &self,
        user_name: &str,
        password: &str,
        reset_required: bool,
    ) -> Result<(), ProviderError> {
        self.iam
            .create_login_profile()
            .user_name(user_name)
            .password(password)
            .password_reset_required(reset_required)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        Ok(())
    }

    async fn create_access_key(&self, user_name: &str) -> Result<NewAccessKey, ProviderError> {
        let response = self
            .iam
            .create_access_key()
            .user_name(user_name)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        let key = response.access_key().ok_or_else(|| ProviderError::Rejected {
            code: "MissingAccessKey".to_string(),
            message: format!("create_access_key for {} returned no key", user_name),
        })?;
        Ok(NewAccessKey {
            access_key_id: key.access_key_id().to_string(),
            secret_access_key: key.secret_access_key().to_string(),
        })
    }
}
