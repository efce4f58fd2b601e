//! cloudwarden orchestration core
//!
//! Provider-agnostic targeting and lifecycle orchestration for cloud
//! resources: select resources declaratively, preview or apply an action
//! behind a safety gate, and aggregate per-resource outcomes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 warden CLI                       │
//! │   (instances / volumes / access-keys / users)    │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               cloudwarden-cloud                  │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────────┐   │
//! │  │  filter  │─▶│  lister  │─▶│     gate     │   │
//! │  └──────────┘  └──────────┘  └──────┬───────┘   │
//! │                              ┌──────▼───────┐   │
//! │                              │    driver    │   │
//! │                              └──────┬───────┘   │
//! │                              ┌──────▼───────┐   │
//! │                              │   outcome    │   │
//! │                              └──────────────┘   │
//! │  trait ProviderApi { list / describe / mutate }  │
//! │  trait IdentityApi { groups / policy / login }   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼───────┐
//!           │      aws      │
//!           │   provider    │
//!           └───────────────┘
//! ```

pub mod action;
pub mod audit;
pub mod driver;
pub mod error;
pub mod filter;
pub mod gate;
pub mod identity;
pub mod lister;
pub mod model;
pub mod outcome;
pub mod provider;
pub mod retry;
pub mod run;

// Re-exports
pub use action::{
    ActionParams, ActionRequest, ActionRequestBuilder, ActionType, Mode, Observation,
    UnknownAction, DEFAULT_BULK_CAP, DEFAULT_CREATE_USER_CAP,
};
pub use audit::rank_by_age;
pub use driver::{LifecycleDriver, PollEnd};
pub use error::{CloudError, ProviderError, Result};
pub use filter::{
    resolve, resolve_with_clock, AgeThreshold, Predicate, SelectionCriteria, TagFilter,
};
pub use gate::{authorize, Clearance, GateDecision, GateKind};
pub use identity::{
    generate_password, IdentityApi, NewAccessKey, OnboardPlan, OnboardReport, UserDetails,
    UserManager, DEFAULT_POLICY_ARN,
};
pub use lister::{Listing, ResourceLister};
pub use model::{Clock, FixedClock, ResourceDescriptor, ResourceKind, SystemClock, PLANNED_STATE};
pub use outcome::{
    aggregate, Disposition, OperationOutcome, OutcomeCollector, OutcomeResult, RunSummary, Totals,
};
pub use provider::{OperationId, Page, ProviderApi};
pub use retry::{retry_call, PollPolicy, RetryExhausted, RetryPolicy};
pub use run::{CandidateOrder, Orchestrator, RunOptions, RunReport};
