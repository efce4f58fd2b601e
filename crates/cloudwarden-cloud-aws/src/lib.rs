//! AWS provider for cloudwarden
//!
//! Implements [`cloudwarden_cloud::ProviderApi`] and
//! [`cloudwarden_cloud::IdentityApi`] on top of the AWS SDK:
//!
//! - **EC2**: instances and their status checks, volumes, snapshots owned by the caller
//! - **IAM**: users, their access keys, group memberships, policies and logins
//! - **S3** / **EC2 regions**: read-only inventory
//!
//! SDK responses are translated into `ResourceDescriptor`s in [`convert`];
//! SDK errors are classified into `ProviderError`s in [`error`].

pub mod convert;
pub mod error;
pub mod inventory;
pub mod provider;
pub mod session;

pub use error::{classify_aws_error, classify_sdk_error};
pub use inventory::{BucketSummary, Inventory, ObjectSummary, RegionSummary};
pub use provider::{param_keys, AwsProvider, DELETE_ON_TAG};
pub use session::{AwsSession, GLOBAL_SERVICE_REGION};
