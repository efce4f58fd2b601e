//! Provider API trait definition

use crate::action::{ActionParams, ActionType};
use crate::error::ProviderError;
use crate::model::{ResourceDescriptor, ResourceKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Control-plane API abstraction
///
/// Implementations translate SDK responses into [`ResourceDescriptor`]s at
/// this boundary; nothing above it sees provider response types.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// Fetch one page of resources of `kind`
    async fn list_resources(
        &self,
        kind: ResourceKind,
        page_token: Option<String>,
    ) -> Result<Page, ProviderError>;

    /// Fetch a fresh descriptor; `NotFound` when the resource does not exist
    async fn describe_resource(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<ResourceDescriptor, ProviderError>;

    /// Issue the mutating call for `action` against `target`
    async fn mutate(
        &self,
        action: ActionType,
        target: &ResourceDescriptor,
        params: &ActionParams,
    ) -> Result<OperationId, ProviderError>;
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<ResourceDescriptor>,
    pub next_token: Option<String>,
}

impl Page {
    pub fn new(items: Vec<ResourceDescriptor>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    /// Final page
    pub fn last(items: Vec<ResourceDescriptor>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// Identifier returned by an accepted mutating call
///
/// For creations this is the new resource's id (e.g. the snapshot id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationId(pub String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
