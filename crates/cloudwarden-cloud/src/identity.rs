//! Identity onboarding and user inspection
//!
//! Onboarding a user is a short, ordered sequence against one identity:
//! ensure the user exists, attach managed policies, optionally give it a
//! console password and an access key. Each step is its own provider call
//! and is retried on throttling only; the first permanent failure stops
//! the sequence.

use crate::action::{ActionParams, ActionRequest, ActionType, Mode};
use crate::error::{CloudError, ProviderError, Result};
use crate::gate::Clearance;
use crate::model::{ResourceDescriptor, ResourceKind};
use crate::provider::ProviderApi;
use crate::retry::{retry_call, RetryPolicy};
use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

/// Managed policy attached when the caller names none
pub const DEFAULT_POLICY_ARN: &str = "arn:aws:iam::aws:policy/ReadOnlyAccess";

const PASSWORD_LENGTH: usize = 20;
const PASSWORD_SYMBOLS: &[u8] = b"!@#$%^&*()-_=+";

/// Identity calls beyond list/describe/mutate
#[async_trait]
pub trait IdentityApi: ProviderApi {
    /// Names of the groups `user_name` belongs to, across all pages
    async fn user_groups(
        &self,
        user_name: &str,
    ) -> std::result::Result<Vec<String>, ProviderError>;

    async fn attach_user_policy(
        &self,
        user_name: &str,
        policy_arn: &str,
    ) -> std::result::Result<(), ProviderError>;

    async fn create_login_profile(
        &self,
        user_name: &str,
        password: &str,
        reset_required: bool,
    ) -> std::result::Result<(), ProviderError>;

    async fn create_access_key(
        &self,
        user_name: &str,
    ) -> std::result::Result<NewAccessKey, ProviderError>;
}

/// Freshly issued key pair; the secret is only ever available here
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct NewAccessKey {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for NewAccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewAccessKey")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// What to do for one user
#[derive(Debug, Clone, Serialize)]
pub struct OnboardPlan {
    pub user_name: String,
    pub policy_arns: Vec<String>,
    pub console_login: bool,
    pub password_reset_required: bool,
    pub access_key: bool,
    /// Passed to the creation call (path, tags)
    pub params: ActionParams,
}

impl OnboardPlan {
    /// Plan with the default read-only policy and no credentials
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            policy_arns: vec![DEFAULT_POLICY_ARN.to_string()],
            console_login: false,
            password_reset_required: false,
            access_key: false,
            params: ActionParams::new(),
        }
    }

    /// Replace the policy list; an empty list keeps the default
    pub fn with_policies(mut self, arns: Vec<String>) -> Self {
        if !arns.is_empty() {
            self.policy_arns = arns;
        }
        self
    }

    /// Gate request covering the single user this plan touches
    pub fn request(&self, mode: Mode) -> ActionRequest {
        ActionRequest::builder(ActionType::CreateUser)
            .mode(mode)
            .params(self.params.clone())
            .targets([self.user_name.clone()])
            .build()
    }

    /// Human-readable steps, in execution order
    pub fn steps(&self) -> Vec<String> {
        let mut steps = vec![format!("ensure IAM user {}", self.user_name)];
        steps.extend(self.policy_arns.iter().map(|arn| format!("attach policy {}", arn)));
        if self.console_login {
            steps.push(if self.password_reset_required {
                "create console login (password reset required)".to_string()
            } else {
                "create console login".to_string()
            });
        }
        if self.access_key {
            steps.push("create access key".to_string());
        }
        steps
    }
}

/// Result of a completed onboarding
#[derive(Debug, Clone, Serialize)]
pub struct OnboardReport {
    pub user: ResourceDescriptor,
    /// False when the user already existed
    pub created: bool,
    pub policies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub password_reset_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<NewAccessKey>,
}

/// A user plus, on request, its group memberships
#[derive(Debug, Clone, Serialize)]
pub struct UserDetails {
    pub user: ResourceDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
}

pub struct UserManager<'a> {
    api: &'a dyn IdentityApi,
    lookup: RetryPolicy,
    mutation: RetryPolicy,
}

impl<'a> UserManager<'a> {
    pub fn new(api: &'a dyn IdentityApi) -> Self {
        Self {
            api,
            lookup: RetryPolicy::listing(),
            mutation: RetryPolicy::mutation(),
        }
    }

    pub fn with_retry(mut self, lookup: RetryPolicy, mutation: RetryPolicy) -> Self {
        self.lookup = lookup;
        self.mutation = mutation;
        self
    }

    /// Run `plan`; requires a clearance for a user creation
    pub async fn onboard(
        &self,
        clearance: &Clearance,
        plan: &OnboardPlan,
    ) -> Result<OnboardReport> {
        if clearance.action() != ActionType::CreateUser || clearance.approved() == 0 {
            return Err(CloudError::ClearanceMismatch(clearance.action()));
        }

        let api = self.api;
        let name = plan.user_name.as_str();
        let (user, created) = self.ensure_user(plan).await?;

        for arn in &plan.policy_arns {
            self.mutating(&format!("attach-user-policy {}", name), || {
                api.attach_user_policy(name, arn)
            })
            .await?;
            info!(user = name, policy = %arn, "Policy attached");
        }

        let password = if plan.console_login {
            let password = generate_password();
            let reset = plan.password_reset_required;
            let secret = password.as_str();
            self.mutating(&format!("create-login-profile {}", name), || {
                api.create_login_profile(name, secret, reset)
            })
            .await?;
            info!(user = name, reset_required = reset, "Console login created");
            Some(password)
        } else {
            None
        };

        let access_key = if plan.access_key {
            let key = self
                .mutating(&format!("create-access-key {}", name), || {
                    api.create_access_key(name)
                })
                .await?;
            info!(user = name, access_key_id = %key.access_key_id, "Access key created");
            Some(key)
        } else {
            None
        };

        Ok(OnboardReport {
            user,
            created,
            policies: plan.policy_arns.clone(),
            password,
            password_reset_required: plan.console_login && plan.password_reset_required,
            access_key,
        })
    }

    /// Fetch one user; `NotFound` surfaces as a provider error
    pub async fn user_details(&self, user_name: &str, include_groups: bool) -> Result<UserDetails> {
        let user = self.describe_user(user_name).await?;
        let groups = if include_groups {
            let api = self.api;
            let groups = retry_call(
                &self.lookup,
                &format!("list-groups-for-user {}", user_name),
                ProviderError::is_transient,
                || api.user_groups(user_name),
            )
            .await
            .map_err(|exhausted| CloudError::Provider(exhausted.error))?;
            Some(groups)
        } else {
            None
        };
        Ok(UserDetails { user, groups })
    }

    async fn ensure_user(&self, plan: &OnboardPlan) -> Result<(ResourceDescriptor, bool)> {
        let name = plan.user_name.as_str();
        match self.describe_user(name).await {
            Ok(user) => {
                info!(user = name, "IAM user already exists");
                return Ok((user, false));
            }
            Err(CloudError::Provider(error)) if error.is_not_found() => {
                debug!(user = name, "IAM user not found, creating");
            }
            Err(e) => return Err(e),
        }

        let api = self.api;
        let planned = ResourceDescriptor::planned(ResourceKind::User, name);
        let (target, params) = (&planned, &plan.params);
        let created = match self
            .mutating(&format!("create-user {}", name), || {
                api.mutate(ActionType::CreateUser, target, params)
            })
            .await
        {
            Ok(_) => true,
            Err(CloudError::Provider(error)) if error.is_already_exists() => false,
            Err(e) => return Err(e),
        };
        if created {
            info!(user = name, "IAM user created");
        }

        Ok((self.describe_user(name).await?, created))
    }

    async fn describe_user(&self, user_name: &str) -> Result<ResourceDescriptor> {
        let api = self.api;
        retry_call(
            &self.lookup,
            &format!("describe user {}", user_name),
            ProviderError::is_transient,
            || api.describe_resource(ResourceKind::User, user_name),
        )
        .await
        .map_err(|exhausted| CloudError::Provider(exhausted.error))
    }

    async fn mutating<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, ProviderError>>,
    {
        retry_call(&self.mutation, operation, ProviderError::is_throttled, call)
            .await
            .map_err(|exhausted| CloudError::Provider(exhausted.error))
    }
}

/// Random console password with at least one lowercase, uppercase, digit and symbol
pub fn generate_password() -> String {
    password_from(&mut rand::thread_rng(), PASSWORD_LENGTH)
}

fn password_from<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    let alphabet: Vec<u8> = (b'a'..=b'z')
        .chain(b'A'..=b'Z')
        .chain(b'0'..=b'9')
        .chain(PASSWORD_SYMBOLS.iter().copied())
        .collect();

    loop {
        let password: String = (0..length)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
            .collect();
        if has_every_class(&password) {
            return password;
        }
    }
}

fn has_every_class(password: &str) -> bool {
    password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.bytes().any(|b| PASSWORD_SYMBOLS.contains(&b))
}
