//! Usage Counts
//!
//! Per-customer redemption counts derived from the usage ledger.

use rustc_hash::FxHashMap;

use crate::{
    ids::{RuleId, UserId},
    rules::GiftRuleUsage,
};

/// Ledger counts for a single customer, keyed by rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageCounts {
    by_rule: FxHashMap<RuleId, u32>,
}

impl UsageCounts {
    /// No recorded redemptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count the ledger rows belonging to `user`.
    pub fn from_usages<'a>(
        user: UserId,
        usages: impl IntoIterator<Item = &'a GiftRuleUsage>,
    ) -> Self {
        let mut counts = Self::default();

        for usage in usages {
            if usage.user == user {
                counts.record(usage.rule);
            }
        }

        counts
    }

    /// Set the count for `rule` directly, e.g. from an aggregate query.
    #[must_use]
    pub fn with_count(mut self, rule: RuleId, count: u32) -> Self {
        self.by_rule.insert(rule, count);
        self
    }

    /// Redemptions of `rule`.
    #[must_use]
    pub fn get(&self, rule: RuleId) -> u32 {
        self.by_rule.get(&rule).copied().unwrap_or_default()
    }

    /// Count one more redemption of `rule`.
    pub fn record(&mut self, rule: RuleId) {
        let count = self.by_rule.entry(rule).or_default();

        *count = count.saturating_add(1);
    }
}

impl FromIterator<(RuleId, u32)> for UsageCounts {
    fn from_iter<I: IntoIterator<Item = (RuleId, u32)>>(iter: I) -> Self {
        Self {
            by_rule: iter.into_iter().collect(),
        }
    }
}
