//! Error types for the orchestration core

use crate::action::ActionType;
use crate::model::ResourceKind;
use thiserror::Error;

/// Errors that abort a run before any mutation is attempted
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid selection criteria: {0}")]
    InvalidCriteria(String),

    #[error("Credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    #[error("Listing {kind} unavailable after {attempts} attempts: {source}")]
    ListingUnavailable {
        kind: ResourceKind,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Clearance for {0} does not cover this operation")]
    ClearanceMismatch(ActionType),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Failures reported by a provider API call
///
/// `Throttled` and `Unavailable` are transient; everything else is a
/// permanent rejection and is never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Request rejected ({code}): {message}")]
    Rejected { code: String, message: String },
}

impl ProviderError {
    /// Throttling or a network/service-side hiccup
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Throttled(_) | ProviderError::Unavailable(_)
        )
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, ProviderError::Throttled(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ProviderError::AlreadyExists(_))
    }
}
