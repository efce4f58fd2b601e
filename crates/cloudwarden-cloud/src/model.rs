//! Resource descriptors
//!
//! A [`ResourceDescriptor`] is a point-in-time, read-only view of one cloud
//! resource. Descriptors are never updated in place: after a mutation the
//! driver describes the resource again and gets a new one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// State recorded on descriptors that stand in for not-yet-created resources
pub const PLANNED_STATE: &str = "absent";

/// Kind of resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Compute instance
    Instance,
    /// Health checks reported for a compute instance
    InstanceStatus,
    /// Block-storage volume
    Volume,
    /// Block-storage snapshot
    Snapshot,
    /// Identity principal
    User,
    /// Long-lived access credential (access key)
    Credential,
    /// Object-storage object
    Object,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Instance => write!(f, "instance"),
            ResourceKind::InstanceStatus => write!(f, "instance status"),
            ResourceKind::Volume => write!(f, "volume"),
            ResourceKind::Snapshot => write!(f, "snapshot"),
            ResourceKind::User => write!(f, "user"),
            ResourceKind::Credential => write!(f, "credential"),
            ResourceKind::Object => write!(f, "object"),
        }
    }
}

/// Point-in-time view of a cloud resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    id: String,
    kind: ResourceKind,
    state: String,
    tags: HashMap<String, String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    metadata: serde_json::Value,
}

impl ResourceDescriptor {
    pub fn new(
        kind: ResourceKind,
        id: impl Into<String>,
        state: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            state: state.into(),
            tags: HashMap::new(),
            created_at,
            metadata: serde_json::Value::Null,
        }
    }

    /// Descriptor for a resource a creation action is about to bring into existence
    pub fn planned(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self::new(kind, id, PLANNED_STATE, Utc::now())
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_tags(mut self, tags: HashMap<String, String>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if !self.metadata.is_object() {
            self.metadata = serde_json::Value::Object(Default::default());
        }
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert(key.into(), value);
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Provider-specific data, opaque to the core
    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// Read a metadata field as a specific type
    pub fn metadata_field<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.metadata
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Age of the resource relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
    }
}

/// Source of "now" for age computations
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
