//! Paginated, filtered resource enumeration

use crate::error::{CloudError, ProviderError, Result};
use crate::filter::Predicate;
use crate::model::{ResourceDescriptor, ResourceKind};
use crate::provider::ProviderApi;
use crate::retry::{retry_call, RetryPolicy};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Enumerates resources of one kind through a provider
///
/// Read-only: never issues a mutating call.
pub struct ResourceLister<'a> {
    provider: &'a dyn ProviderApi,
    policy: RetryPolicy,
}

impl<'a> ResourceLister<'a> {
    pub fn new(provider: &'a dyn ProviderApi, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// Start a fresh listing; every call re-queries the provider
    pub fn list(&self, kind: ResourceKind, predicate: Predicate) -> Listing<'a> {
        Listing {
            provider: self.provider,
            policy: self.policy.clone(),
            kind,
            predicate,
            buffer: VecDeque::new(),
            next_token: None,
            exhausted: false,
            pages: 0,
            scanned: 0,
        }
    }
}

/// Lazy sequence of matching descriptors in provider order
pub struct Listing<'a> {
    provider: &'a dyn ProviderApi,
    policy: RetryPolicy,
    kind: ResourceKind,
    predicate: Predicate,
    buffer: VecDeque<ResourceDescriptor>,
    next_token: Option<String>,
    exhausted: bool,
    pages: u32,
    scanned: usize,
}

impl Listing<'_> {
    /// Next matching descriptor, fetching pages as needed
    ///
    /// A page fetch that still fails after the listing policy's retries ends
    /// the listing with [`CloudError::ListingUnavailable`]; descriptors already
    /// returned stay valid.
    pub async fn next(&mut self) -> Result<Option<ResourceDescriptor>> {
        loop {
            if let Some(descriptor) = self.buffer.pop_front() {
                return Ok(Some(descriptor));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    /// Drain the listing into a vector
    pub async fn collect_all(mut self) -> Result<Vec<ResourceDescriptor>> {
        let mut items = Vec::new();
        while let Some(descriptor) = self.next().await? {
            items.push(descriptor);
        }
        info!(
            kind = %self.kind,
            pages = self.pages,
            scanned = self.scanned,
            matched = items.len(),
            "Listing complete"
        );
        Ok(items)
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let provider = self.provider;
        let kind = self.kind;
        let token = self.next_token.clone();
        let operation = format!("list {}", kind);

        let page = retry_call(&self.policy, &operation, ProviderError::is_transient, || {
            provider.list_resources(kind, token.clone())
        })
        .await
        .map_err(|exhausted| {
            if exhausted.error.is_transient() {
                CloudError::ListingUnavailable {
                    kind,
                    attempts: exhausted.attempts,
                    source: exhausted.error,
                }
            } else {
                CloudError::Provider(exhausted.error)
            }
        })?;

        self.pages += 1;
        self.scanned += page.items.len();
        let before = self.buffer.len();
        let predicate = &self.predicate;
        self.buffer.extend(
            page.items
                .into_iter()
                .filter(|descriptor| predicate.matches(descriptor)),
        );
        debug!(
            kind = %kind,
            page = self.pages,
            matched = self.buffer.len() - before,
            more = page.next_token.is_some(),
            "Fetched page"
        );

        self.next_token = page.next_token;
        if self.next_token.is_none() {
            self.exhausted = true;
        }
        Ok(())
    }
}
