//! Action types for resource lifecycle management

use crate::model::{ResourceDescriptor, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Default bulk cap for principal creation
pub const DEFAULT_CREATE_USER_CAP: usize = 120;

/// Default bulk cap for every other action
pub const DEFAULT_BULK_CAP: usize = 50;

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Start,
    Stop,
    Reboot,
    Terminate,
    CreateSnapshot,
    DeleteVolume,
    DeactivateKey,
    DeleteKey,
    CreateUser,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Start => write!(f, "start"),
            ActionType::Stop => write!(f, "stop"),
            ActionType::Reboot => write!(f, "reboot"),
            ActionType::Terminate => write!(f, "terminate"),
            ActionType::CreateSnapshot => write!(f, "create-snapshot"),
            ActionType::DeleteVolume => write!(f, "delete-volume"),
            ActionType::DeactivateKey => write!(f, "deactivate-key"),
            ActionType::DeleteKey => write!(f, "delete-key"),
            ActionType::CreateUser => write!(f, "create-user"),
        }
    }
}

impl ActionType {
    pub const ALL: [ActionType; 9] = [
        ActionType::Start,
        ActionType::Stop,
        ActionType::Reboot,
        ActionType::Terminate,
        ActionType::CreateSnapshot,
        ActionType::DeleteVolume,
        ActionType::DeactivateKey,
        ActionType::DeleteKey,
        ActionType::CreateUser,
    ];
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown action {0:?}")]
pub struct UnknownAction(pub String);

impl FromStr for ActionType {
    type Err = UnknownAction;

    /// Parse the display name, e.g. `create-user`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|action| action.to_string() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// What a describe call observed about a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Resource exists in the given state
    Present(String),
    /// Provider reports the resource does not exist
    Absent,
}

impl Observation {
    pub fn state(&self) -> Option<&str> {
        match self {
            Observation::Present(s) => Some(s.as_str()),
            Observation::Absent => None,
        }
    }
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Observation::Present(s) => write!(f, "{}", s),
            Observation::Absent => write!(f, "absent"),
        }
    }
}

impl ActionType {
    /// Kind of resource this action targets
    pub fn target_kind(&self) -> ResourceKind {
        match self {
            ActionType::Start | ActionType::Stop | ActionType::Reboot | ActionType::Terminate => {
                ResourceKind::Instance
            }
            ActionType::CreateSnapshot | ActionType::DeleteVolume => ResourceKind::Volume,
            ActionType::DeactivateKey | ActionType::DeleteKey => ResourceKind::Credential,
            ActionType::CreateUser => ResourceKind::User,
        }
    }

    pub fn creates(&self) -> bool {
        matches!(self, ActionType::CreateSnapshot | ActionType::CreateUser)
    }

    pub fn default_bulk_cap(&self) -> usize {
        match self {
            ActionType::CreateUser => DEFAULT_CREATE_USER_CAP,
            _ => DEFAULT_BULK_CAP,
        }
    }

    /// Whether a target observed before mutating already satisfies the action
    ///
    /// Reboot and CreateSnapshot always produce a new effect and never converge.
    pub fn is_converged(&self, observed: &Observation) -> bool {
        match (self, observed) {
            (ActionType::Start, Observation::Present(s)) => s == "running",
            (ActionType::Stop, Observation::Present(s)) => s == "stopped",
            (ActionType::Terminate, Observation::Present(s)) => s == "terminated",
            (ActionType::Terminate, Observation::Absent) => true,
            (ActionType::DeleteVolume, Observation::Present(s)) => s == "deleted",
            (ActionType::DeleteVolume, Observation::Absent) => true,
            (ActionType::DeactivateKey, Observation::Present(s)) => s == "Inactive",
            (ActionType::DeleteKey, Observation::Absent) => true,
            (ActionType::CreateUser, Observation::Present(_)) => true,
            _ => false,
        }
    }

    /// Whether the pre-mutation check applies to this action
    pub fn checks_convergence(&self) -> bool {
        !matches!(self, ActionType::Reboot | ActionType::CreateSnapshot)
    }

    /// Terminal state for completion polling
    pub fn is_complete(&self, observed: &Observation) -> bool {
        match (self, observed) {
            (ActionType::Start | ActionType::Reboot, Observation::Present(s)) => s == "running",
            (ActionType::CreateSnapshot, Observation::Present(s)) => s == "completed",
            (ActionType::CreateUser, Observation::Present(_)) => true,
            _ => self.is_converged(observed),
        }
    }

    /// States from which the awaited transition can no longer happen
    pub fn is_failed(&self, observed: &Observation) -> bool {
        match (self, observed) {
            (ActionType::CreateSnapshot | ActionType::DeleteVolume, Observation::Present(s)) => {
                s == "error"
            }
            (ActionType::Start | ActionType::Reboot, Observation::Present(s)) => {
                s == "terminated" || s == "shutting-down"
            }
            (ActionType::Start | ActionType::Stop | ActionType::Reboot, Observation::Absent) => {
                true
            }
            _ => false,
        }
    }

    /// The resource to poll once the mutating call has been accepted
    ///
    /// Snapshot creation completes on the new snapshot, not on the source volume.
    pub fn completion_subject(
        &self,
        target: &ResourceDescriptor,
        operation_id: Option<&str>,
    ) -> (ResourceKind, String) {
        match (self, operation_id) {
            (ActionType::CreateSnapshot, Some(op)) => (ResourceKind::Snapshot, op.to_string()),
            _ => (target.kind(), target.id().to_string()),
        }
    }
}

/// Whether an invocation previews or mutates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    DryRun,
    Apply,
}

impl Mode {
    pub fn from_apply_flag(apply: bool) -> Self {
        if apply { Mode::Apply } else { Mode::DryRun }
    }
}

/// Action-specific parameters passed through to the provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionParams {
    /// Free-form values (e.g. "description", "path")
    pub values: HashMap<String, String>,

    /// Tags applied to resources the action creates
    pub tags: Vec<(String, String)>,
}

impl ActionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// A fully specified invocation, built once and not modified afterwards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    action: ActionType,
    kind: ResourceKind,
    targets: Vec<String>,
    mode: Mode,
    bulk_cap: usize,
    wait: bool,
    params: ActionParams,
}

impl ActionRequest {
    /// Start building a request with the action's defaults (dry-run, default cap, no wait)
    pub fn builder(action: ActionType) -> ActionRequestBuilder {
        ActionRequestBuilder {
            action,
            targets: Vec::new(),
            mode: Mode::DryRun,
            bulk_cap: action.default_bulk_cap(),
            wait: false,
            params: ActionParams::default(),
        }
    }

    pub fn action(&self) -> ActionType {
        self.action
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Identifiers resolved from the selection criteria
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn bulk_cap(&self) -> usize {
        self.bulk_cap
    }

    pub fn wait(&self) -> bool {
        self.wait
    }

    pub fn params(&self) -> &ActionParams {
        &self.params
    }
}

/// Builder for [`ActionRequest`]
#[derive(Debug, Clone)]
pub struct ActionRequestBuilder {
    action: ActionType,
    targets: Vec<String>,
    mode: Mode,
    bulk_cap: usize,
    wait: bool,
    params: ActionParams,
}

impl ActionRequestBuilder {
    pub fn action(&self) -> ActionType {
        self.action
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Zero is not a valid cap and is clamped to one
    pub fn bulk_cap(mut self, cap: usize) -> Self {
        self.bulk_cap = cap.max(1);
        self
    }

    pub fn wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn params(mut self, params: ActionParams) -> Self {
        self.params = params;
        self
    }

    pub fn targets<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> ActionRequest {
        ActionRequest {
            kind: self.action.target_kind(),
            action: self.action,
            targets: self.targets,
            mode: self.mode,
            bulk_cap: self.bulk_cap,
            wait: self.wait,
            params: self.params,
        }
    }
}
