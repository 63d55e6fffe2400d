//! Gift Rules

use std::fmt;

use jiff::Timestamp;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    conditions::{BoolOp, ConditionGroup},
    ids::{OrderId, ProductId, RuleId, UsageId, UserId},
};

pub mod authoring;

/// Rule priority; higher values are offered first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

/// Priority outside `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("priority {0} is outside {min}..={max}", min = Priority::MIN, max = Priority::MAX)]
pub struct PriorityOutOfRange(pub i64);

impl Priority {
    /// Lowest accepted priority
    pub const MIN: u8 = 1;

    /// Highest accepted priority
    pub const MAX: u8 = 100;

    /// Numeric value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Priority {
    type Error = PriorityOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .filter(|priority| (Self::MIN..=Self::MAX).contains(priority))
            .map(Self)
            .ok_or(PriorityOutOfRange(value))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional validity bounds. A missing bound leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidityWindow {
    valid_from: Option<Timestamp>,
    valid_until: Option<Timestamp>,
}

/// `valid_from` is not strictly before `valid_until`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("valid_from {valid_from} must be before valid_until {valid_until}")]
pub struct InvalidWindow {
    /// Requested start
    pub valid_from: Timestamp,

    /// Requested end
    pub valid_until: Timestamp,
}

/// Where an instant falls relative to a [`ValidityWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    /// Before `valid_from`.
    NotYetValid(Timestamp),

    /// Inside the window.
    Within,

    /// After `valid_until`.
    Expired(Timestamp),
}

impl ValidityWindow {
    /// A window with no bounds.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            valid_from: None,
            valid_until: None,
        }
    }

    /// Create a window, requiring `valid_from < valid_until` when both are set.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidWindow`] when both bounds are set and not strictly ordered.
    pub fn new(
        valid_from: Option<Timestamp>,
        valid_until: Option<Timestamp>,
    ) -> Result<Self, InvalidWindow> {
        if let (Some(from), Some(until)) = (valid_from, valid_until)
            && from >= until
        {
            return Err(InvalidWindow {
                valid_from: from,
                valid_until: until,
            });
        }

        Ok(Self {
            valid_from,
            valid_until,
        })
    }

    /// Start bound.
    #[must_use]
    pub const fn valid_from(&self) -> Option<Timestamp> {
        self.valid_from
    }

    /// End bound.
    #[must_use]
    pub const fn valid_until(&self) -> Option<Timestamp> {
        self.valid_until
    }

    /// Locate `now` relative to the inclusive window.
    #[must_use]
    pub fn position(&self, now: Timestamp) -> WindowPosition {
        if let Some(from) = self.valid_from
            && now < from
        {
            return WindowPosition::NotYetValid(from);
        }

        if let Some(until) = self.valid_until
            && now > until
        {
            return WindowPosition::Expired(until);
        }

        WindowPosition::Within
    }

    /// Whether `now` falls inside the inclusive window.
    #[must_use]
    pub fn contains(&self, now: Timestamp) -> bool {
        self.position(now) == WindowPosition::Within
    }
}

/// Usage limits for a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quota {
    /// Maximum redemptions per customer
    pub max_uses_per_customer: Option<u32>,

    /// Maximum redemptions across all customers
    pub max_total_uses: Option<u32>,

    /// Redemptions recorded so far
    pub current_total_uses: u32,
}

impl Quota {
    /// No limits.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_uses_per_customer: None,
            max_total_uses: None,
            current_total_uses: 0,
        }
    }

    /// Whether any limit is configured.
    #[must_use]
    pub const fn has_constraints(&self) -> bool {
        self.max_uses_per_customer.is_some() || self.max_total_uses.is_some()
    }

    /// Whether another redemption fits under the global limit.
    #[must_use]
    pub fn has_global_headroom(&self) -> bool {
        self.max_total_uses
            .is_none_or(|limit| self.current_total_uses < limit)
    }

    /// Whether a customer with `used` redemptions may redeem again.
    #[must_use]
    pub fn has_customer_headroom(&self, used: u32) -> bool {
        self.max_uses_per_customer.is_none_or(|limit| used < limit)
    }
}

/// A product offered as a gift by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GiftProduct {
    /// Catalog product
    pub product_id: ProductId,

    /// Units a single order may receive
    pub max_quantity_per_order: u32,

    /// Rule-scoped allocation cap, independent of catalog stock
    pub remaining_stock: Option<u32>,
}

impl GiftProduct {
    /// One unit per order, no rule-scoped cap.
    #[must_use]
    pub const fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            max_quantity_per_order: 1,
            remaining_stock: None,
        }
    }

    /// Whether the rule-scoped allocation still has stock.
    #[must_use]
    pub fn has_allocation(&self) -> bool {
        self.remaining_stock.is_none_or(|stock| stock > 0)
    }
}

/// A configured gift promotion.
#[derive(Debug, Clone, PartialEq)]
pub struct GiftRule {
    /// Rule identifier
    pub id: RuleId,

    /// Display name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Ordering weight
    pub priority: Priority,

    /// Activation flag
    pub is_active: bool,

    /// Condition tree; the root operator is the rule's condition logic
    pub conditions: ConditionGroup,

    /// Usage limits
    pub quota: Quota,

    /// Validity bounds
    pub window: ValidityWindow,

    /// Products this rule can grant
    pub gift_products: SmallVec<[GiftProduct; 2]>,

    /// Creation time, used to break priority ties
    pub created_at: Timestamp,
}

impl GiftRule {
    /// Root-level combinator.
    #[must_use]
    pub const fn condition_logic(&self) -> BoolOp {
        self.conditions.op
    }

    /// The gift declaration for `product`, if this rule offers it.
    #[must_use]
    pub fn gift_product(&self, product: ProductId) -> Option<&GiftProduct> {
        self.gift_products
            .iter()
            .find(|gift| gift.product_id == product)
    }
}

/// Append-only record of one redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GiftRuleUsage {
    /// Entry identifier
    pub id: UsageId,

    /// Redeeming customer
    pub user: UserId,

    /// Redeemed rule
    pub rule: RuleId,

    /// Gifted product
    pub product: ProductId,

    /// Order the gift shipped with
    pub order: Option<OrderId>,

    /// Redemption time
    pub used_at: Timestamp,
}
