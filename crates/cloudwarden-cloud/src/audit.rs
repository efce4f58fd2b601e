//! Age ranking for credential audits

use crate::model::ResourceDescriptor;
use chrono::{DateTime, Utc};

/// Sort candidates oldest first, ties broken by identifier
///
/// Dry-run and apply passes call this on the same listing, so both
/// enumerate targets in the same order.
pub fn rank_by_age(
    mut candidates: Vec<ResourceDescriptor>,
    now: DateTime<Utc>,
) -> Vec<ResourceDescriptor> {
    candidates.sort_by(|a, b| {
        b.age(now)
            .cmp(&a.age(now))
            .then_with(|| a.id().cmp(b.id()))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use chrono::Duration;

    fn key(id: &str, days: i64, now: DateTime<Utc>) -> ResourceDescriptor {
        ResourceDescriptor::new(ResourceKind::Credential, id, "Active", now - Duration::days(days))
    }

    #[test]
    fn test_oldest_first() {
        let now = Utc::now();
        let ranked = rank_by_age(
            vec![key("AKIA1", 120, now), key("AKIA2", 45, now), key("AKIA3", 200, now)],
            now,
        );
        let ids: Vec<_> = ranked.iter().map(|d| d.id()).collect();
        assert_eq!(ids, ["AKIA3", "AKIA1", "AKIA2"]);
    }

    #[test]
    fn test_ties_break_by_id() {
        let now = Utc::now();
        let ranked = rank_by_age(
            vec![key("AKIAB", 100, now), key("AKIAA", 100, now), key("AKIAC", 150, now)],
            now,
        );
        let ids: Vec<_> = ranked.iter().map(|d| d.id()).collect();
        assert_eq!(ids, ["AKIAC", "AKIAA", "AKIAB"]);
    }
}
