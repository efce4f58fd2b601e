//! Argument groups shared by several subcommands

use clap::Args;
use cloudwarden_cloud::{AgeThreshold, Mode, SelectionCriteria};

/// Resource selection flags
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Explicit resource id (repeatable); other filters are ignored when given
    #[arg(long = "id", value_name = "ID")]
    pub ids: Vec<String>,

    /// Tag equality filter KEY=VALUE (repeatable, all must match)
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    pub tags: Vec<String>,

    /// Accepted state (repeatable)
    #[arg(long = "state", value_name = "STATE")]
    pub states: Vec<String>,

    /// Only resources older than N days
    #[arg(long, value_name = "DAYS", conflicts_with = "newer_than_days")]
    pub max_age_days: Option<i64>,

    /// Only resources created within the last N days
    #[arg(long, value_name = "DAYS")]
    pub newer_than_days: Option<i64>,

    /// Only resources without any tags
    #[arg(long)]
    pub untagged: bool,
}

impl FilterArgs {
    pub fn criteria(&self) -> anyhow::Result<SelectionCriteria> {
        let mut criteria = SelectionCriteria::new().with_tag_args(&self.tags)?;
        for state in &self.states {
            criteria = criteria.with_state(state);
        }
        if let Some(days) = self.max_age_days {
            criteria = criteria.with_age(AgeThreshold::older_than_days(days));
        }
        if let Some(days) = self.newer_than_days {
            criteria = criteria.with_age(AgeThreshold::newer_than_days(days));
        }
        if self.untagged {
            criteria = criteria.untagged();
        }
        Ok(criteria.with_ids(self.ids.iter().cloned()))
    }

    /// Commands with a default state filter apply it only when this is false
    pub fn has_state_filter(&self) -> bool {
        !self.states.is_empty() || !self.ids.is_empty()
    }
}

/// Mutation safety flags
#[derive(Args, Debug, Clone, Default)]
pub struct ApplyArgs {
    /// Perform the action; without this flag the run is a dry run
    #[arg(long)]
    pub apply: bool,

    /// Maximum number of resources one invocation may touch
    #[arg(long, value_name = "N")]
    pub bulk_cap: Option<usize>,
}

impl ApplyArgs {
    pub fn mode(&self) -> Mode {
        Mode::from_apply_flag(self.apply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_args_to_criteria() {
        let args = FilterArgs {
            tags: vec!["Prod=backup".to_string()],
            states: vec!["running".to_string()],
            max_age_days: Some(30),
            ..Default::default()
        };
        let criteria = args.criteria().unwrap();
        assert_eq!(criteria.tags.len(), 1);
        assert_eq!(criteria.tags[0].key, "Prod");
        assert_eq!(criteria.states, vec!["running".to_string()]);
        assert!(matches!(criteria.age, Some(AgeThreshold::OlderThan(_))));
        assert!(criteria.ids.is_empty());
    }

    #[test]
    fn test_malformed_tag_rejected() {
        let args = FilterArgs {
            tags: vec!["Prod".to_string()],
            ..Default::default()
        };
        assert!(args.criteria().is_err());
    }

    #[test]
    fn test_apply_flag_sets_mode() {
        assert_eq!(ApplyArgs::default().mode(), Mode::DryRun);
        let args = ApplyArgs {
            apply: true,
            bulk_cap: None,
        };
        assert_eq!(args.mode(), Mode::Apply);
    }
}
