//! Selection criteria and the predicates resolved from them
//!
//! Precedence rule: when explicit identifiers are supplied, the resolved
//! predicate matches exactly those identifiers and every other constraint
//! (tags, states, age, untagged) is ignored. The two are never merged.

use crate::error::{CloudError, Result};
use crate::model::{Clock, ResourceDescriptor, SystemClock};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// A single `key=value` tag equality constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagFilter {
    pub key: String,
    pub value: String,
}

impl TagFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl FromStr for TagFilter {
    type Err = CloudError;

    /// Parse `Key=Value`; the value may itself contain `=`
    fn from_str(s: &str) -> Result<Self> {
        let (key, value) = s.split_once('=').ok_or_else(|| {
            CloudError::InvalidCriteria(format!("Tag must be Key=Value (got {:?})", s))
        })?;
        Ok(Self::new(key, value))
    }
}

impl std::fmt::Display for TagFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Age constraint relative to creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeThreshold {
    /// Strictly older than the duration
    OlderThan(Duration),
    /// No older than the duration
    NewerThan(Duration),
}

impl AgeThreshold {
    pub fn older_than_days(days: i64) -> Self {
        AgeThreshold::OlderThan(Duration::days(days))
    }

    pub fn newer_than_days(days: i64) -> Self {
        AgeThreshold::NewerThan(Duration::days(days))
    }

    fn admits(&self, age: Duration) -> bool {
        match self {
            AgeThreshold::OlderThan(limit) => age > *limit,
            AgeThreshold::NewerThan(limit) => age <= *limit,
        }
    }
}

/// Declarative selection criteria
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    /// All must match exactly
    pub tags: Vec<TagFilter>,

    /// Empty means any state
    pub states: Vec<String>,

    pub age: Option<AgeThreshold>,

    /// Only resources without any tag
    pub untagged_only: bool,

    /// When non-empty, overrides every other constraint
    pub ids: Vec<String>,
}

impl SelectionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(TagFilter::new(key, value));
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.states.push(state.into());
        self
    }

    pub fn with_age(mut self, age: AgeThreshold) -> Self {
        self.age = Some(age);
        self
    }

    pub fn untagged(mut self) -> Self {
        self.untagged_only = true;
        self
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Parse a list of `Key=Value` strings into tag constraints
    pub fn with_tag_args(mut self, args: &[String]) -> Result<Self> {
        for arg in args {
            self.tags.push(arg.parse()?);
        }
        Ok(self)
    }

    fn has_filters(&self) -> bool {
        !self.tags.is_empty() || !self.states.is_empty() || self.age.is_some() || self.untagged_only
    }
}

/// Predicate over resource descriptors
#[derive(Clone)]
pub struct Predicate {
    rule: Rule,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
enum Rule {
    Explicit(HashSet<String>),
    Filters {
        tags: Vec<TagFilter>,
        states: HashSet<String>,
        age: Option<AgeThreshold>,
        untagged_only: bool,
    },
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predicate")
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

impl Predicate {
    /// Evaluate against one descriptor; the clock is read on every call
    pub fn matches(&self, descriptor: &ResourceDescriptor) -> bool {
        match &self.rule {
            Rule::Explicit(ids) => ids.contains(descriptor.id()),
            Rule::Filters {
                tags,
                states,
                age,
                untagged_only,
            } => {
                if *untagged_only && !descriptor.tags().is_empty() {
                    return false;
                }
                if !tags
                    .iter()
                    .all(|t| descriptor.tag(&t.key) == Some(t.value.as_str()))
                {
                    return false;
                }
                if !states.is_empty() && !states.contains(descriptor.state()) {
                    return false;
                }
                match age {
                    Some(threshold) => threshold.admits(descriptor.age(self.clock.now())),
                    None => true,
                }
            }
        }
    }
}

/// Resolve criteria into a predicate using the wall clock
pub fn resolve(criteria: &SelectionCriteria) -> Result<Predicate> {
    resolve_with_clock(criteria, Arc::new(SystemClock))
}

/// Resolve criteria into a predicate that reads `clock` for age checks
pub fn resolve_with_clock(
    criteria: &SelectionCriteria,
    clock: Arc<dyn Clock>,
) -> Result<Predicate> {
    if !criteria.ids.is_empty() {
        if criteria.has_filters() {
            debug!(
                ids = criteria.ids.len(),
                "Explicit identifiers supplied; tag/state/age filters ignored"
            );
        }
        return Ok(Predicate {
            rule: Rule::Explicit(criteria.ids.iter().cloned().collect()),
            clock,
        });
    }

    for tag in &criteria.tags {
        if tag.key.is_empty() {
            return Err(CloudError::InvalidCriteria(format!(
                "Tag key must not be empty (got {:?})",
                tag.to_string()
            )));
        }
        if tag.value.is_empty() {
            return Err(CloudError::InvalidCriteria(format!(
                "Tag value for key {:?} must not be empty",
                tag.key
            )));
        }
    }

    if let Some(AgeThreshold::OlderThan(d) | AgeThreshold::NewerThan(d)) = criteria.age {
        if d < Duration::zero() {
            return Err(CloudError::InvalidCriteria(
                "Age threshold must not be negative".to_string(),
            ));
        }
    }

    Ok(Predicate {
        rule: Rule::Filters {
            tags: criteria.tags.clone(),
            states: criteria.states.iter().cloned().collect(),
            age: criteria.age,
            untagged_only: criteria.untagged_only,
        },
        clock,
    })
}
