//! Ledger Data

use std::fmt;

use gifting::{
    cart::CartLine,
    ids::{CartLineId, ProductId, RuleId},
};

/// One gift line to record against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GiftClaim {
    pub line: CartLineId,
    pub rule: RuleId,
    pub product: ProductId,
    pub quantity: u32,
}

impl GiftClaim {
    /// The claim for a gift line; `None` for purchased lines and gift lines without a rule.
    #[must_use]
    pub fn from_line(line: &CartLine) -> Option<Self> {
        let rule = line.gift_rule_id.filter(|_| line.is_gift)?;

        Some(Self {
            line: line.id,
            rule,
            product: line.product_id,
            quantity: line.quantity,
        })
    }
}

/// Why a claim lost against a concurrent redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The rule reached `max_total_uses`.
    GlobalQuota,

    /// The customer reached `max_uses_per_customer`.
    CustomerQuota,

    /// The gift product's `remaining_stock` cannot cover the quantity.
    Stock,

    /// The rule was deactivated, deleted or left its validity window.
    RuleRetired,
}

impl ConflictReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GlobalQuota => "global_quota",
            Self::CustomerQuota => "customer_quota",
            Self::Stock => "stock",
            Self::RuleRetired => "rule_retired",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GiftConflict {
    pub line: CartLineId,
    pub rule: RuleId,
    pub product: ProductId,
    pub reason: ConflictReason,
}

impl GiftConflict {
    #[must_use]
    pub const fn new(claim: &GiftClaim, reason: ConflictReason) -> Self {
        Self {
            line: claim.line,
            rule: claim.rule,
            product: claim.product,
            reason,
        }
    }
}

impl fmt::Display for GiftConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {} ({}, rule {}, product {})",
            self.line, self.reason, self.rule, self.product
        )
    }
}
