//! Gift Rules Data

/// Which rules a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleFilter {
    /// Every stored rule.
    #[default]
    All,

    /// Only rules with `is_active` set.
    Active,
}

impl RuleFilter {
    #[must_use]
    pub const fn active_only(self) -> bool {
        matches!(self, Self::Active)
    }
}
