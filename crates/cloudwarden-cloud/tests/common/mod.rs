use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cloudwarden_cloud::{
    ActionParams, ActionType, IdentityApi, NewAccessKey, OperationId, Page, ProviderApi,
    ProviderError, ResourceDescriptor, ResourceKind,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// In-memory provider that records every call
#[derive(Default)]
pub struct FakeProvider {
    pages: HashMap<ResourceKind, Vec<Vec<ResourceDescriptor>>>,
    list_failures: Mutex<VecDeque<ProviderError>>,
    describe_scripts: Mutex<HashMap<String, VecDeque<Result<String, ProviderError>>>>,
    mutate_scripts: Mutex<HashMap<String, VecDeque<Result<String, ProviderError>>>>,
    pub list_calls: Mutex<Vec<(ResourceKind, Option<String>)>>,
    pub describe_calls: Mutex<Vec<String>>,
    pub mutations: Mutex<Vec<(ActionType, String)>>,
    groups: HashMap<String, Vec<String>>,
    identity_failures: Mutex<HashMap<&'static str, VecDeque<ProviderError>>>,
    pub identity_calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `items` for `kind`, split into pages of `page_size`
    pub fn with_resources(
        mut self,
        kind: ResourceKind,
        items: Vec<ResourceDescriptor>,
        page_size: usize,
    ) -> Self {
        let pages = items
            .chunks(page_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        self.pages.insert(kind, pages);
        self
    }

    /// Fail the next list calls with these errors, in order
    pub fn fail_listing(self, errors: Vec<ProviderError>) -> Self {
        self.list_failures.lock().unwrap().extend(errors);
        self
    }

    /// Script describe responses for `id`; the last entry repeats once the script runs out
    pub fn script_describe(self, id: &str, responses: Vec<Result<&str, ProviderError>>) -> Self {
        self.describe_scripts.lock().unwrap().insert(
            id.to_string(),
            responses
                .into_iter()
                .map(|r| r.map(str::to_string))
                .collect(),
        );
        self
    }

    /// Script mutate responses for `id`; defaults to accepting with `op-<id>`
    pub fn script_mutate(self, id: &str, responses: Vec<Result<&str, ProviderError>>) -> Self {
        self.mutate_scripts.lock().unwrap().insert(
            id.to_string(),
            responses
                .into_iter()
                .map(|r| r.map(str::to_string))
                .collect(),
        );
        self
    }

    pub fn with_groups(mut self, user_name: &str, groups: &[&str]) -> Self {
        self.groups.insert(
            user_name.to_string(),
            groups.iter().map(|g| g.to_string()).collect(),
        );
        self
    }

    /// Fail the next identity calls named `call` (e.g. `"attach"`) with these errors
    pub fn fail_identity(self, call: &'static str, errors: Vec<ProviderError>) -> Self {
        self.identity_failures
            .lock()
            .unwrap()
            .entry(call)
            .or_default()
            .extend(errors);
        self
    }

    pub fn identity_calls(&self) -> Vec<String> {
        self.identity_calls.lock().unwrap().clone()
    }

    fn record_identity(&self, call: &'static str, detail: String) -> Result<(), ProviderError> {
        self.identity_calls
            .lock()
            .unwrap()
            .push(format!("{} {}", call, detail));
        match self
            .identity_failures
            .lock()
            .unwrap()
            .get_mut(call)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.lock().unwrap().len()
    }

    pub fn mutated_ids(&self) -> Vec<String> {
        self.mutations
            .lock()
            .unwrap()
            .iter()
            .map(|(_, id)| id.clone())
            .collect()
    }

    fn find(&self, kind: ResourceKind, id: &str) -> Option<ResourceDescriptor> {
        self.pages
            .get(&kind)?
            .iter()
            .flatten()
            .find(|d| d.id() == id)
            .cloned()
    }
}

fn next_scripted(
    scripts: &Mutex<HashMap<String, VecDeque<Result<String, ProviderError>>>>,
    id: &str,
) -> Option<Result<String, ProviderError>> {
    let mut scripts = scripts.lock().unwrap();
    let queue = scripts.get_mut(id)?;
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[async_trait]
impl ProviderApi for FakeProvider {
    async fn list_resources(
        &self,
        kind: ResourceKind,
        page_token: Option<String>,
    ) -> Result<Page, ProviderError> {
        self.list_calls
            .lock()
            .unwrap()
            .push((kind, page_token.clone()));

        if let Some(error) = self.list_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let pages = match self.pages.get(&kind) {
            Some(pages) if !pages.is_empty() => pages,
            _ => return Ok(Page::last(Vec::new())),
        };
        let index: usize = page_token
            .as_deref()
            .and_then(|t| t.strip_prefix("page-"))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        let next_token = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
        Ok(Page::new(pages[index].clone(), next_token))
    }

    async fn describe_resource(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<ResourceDescriptor, ProviderError> {
        self.describe_calls.lock().unwrap().push(id.to_string());

        if let Some(response) = next_scripted(&self.describe_scripts, id) {
            let state = response?;
            return Ok(ResourceDescriptor::new(kind, id, state, Utc::now()));
        }
        self.find(kind, id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    async fn mutate(
        &self,
        action: ActionType,
        target: &ResourceDescriptor,
        _params: &ActionParams,
    ) -> Result<OperationId, ProviderError> {
        self.mutations
            .lock()
            .unwrap()
            .push((action, target.id().to_string()));

        match next_scripted(&self.mutate_scripts, target.id()) {
            Some(response) => response.map(OperationId),
            None => Ok(OperationId(format!("op-{}", target.id()))),
        }
    }
}

#[async_trait]
impl IdentityApi for FakeProvider {
    async fn user_groups(&self, user_name: &str) -> Result<Vec<String>, ProviderError> {
        self.record_identity("groups", user_name.to_string())?;
        Ok(self.groups.get(user_name).cloned().unwrap_or_default())
    }

    async fn attach_user_policy(
        &self,
        user_name: &str,
        policy_arn: &str,
    ) -> Result<(), ProviderError> {
        self.record_identity("attach", format!("{} {}", user_name, policy_arn))
    }

    async fn create_login_profile(
        &self,
        user_name: &str,
        _password: &str,
        reset_required: bool,
    ) -> Result<(), ProviderError> {
        self.record_identity("login", format!("{} reset={}", user_name, reset_required))
    }

    async fn create_access_key(&self, user_name: &str) -> Result<NewAccessKey, ProviderError> {
        self.record_identity("key", user_name.to_string())?;
        Ok(NewAccessKey {
            access_key_id: format!("AKIA{}", user_name.to_uppercase()),
            secret_access_key: "fake-secret".to_string(),
        })
    }
}

#[allow(dead_code)]
pub fn instance(id: &str, state: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(ResourceKind::Instance, id, state, Utc::now())
}

#[allow(dead_code)]
pub fn access_key(id: &str, age_days: i64, now: DateTime<Utc>) -> ResourceDescriptor {
    ResourceDescriptor::new(
        ResourceKind::Credential,
        id,
        "Active",
        now - Duration::days(age_days),
    )
    .with_metadata("user_name", serde_json::json!("alice"))
}
