//! Eligibility
//!
//! Gate checks shared by the matcher and the validator. A failed gate is a [`Denial`]: a normal,
//! renderable outcome carrying the gate name and the identifiers involved.

use std::fmt;

use jiff::Timestamp;

use crate::{
    cart::EvaluationContext,
    ids::{ProductId, RuleId},
    rules::{GiftRule, WindowPosition},
};

/// A named eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    /// The referenced rule does not exist.
    RuleNotFound,

    /// The rule is switched off.
    Active,

    /// The instant falls outside the validity window.
    Window,

    /// The rule has been redeemed `max_total_uses` times.
    GlobalQuota,

    /// The customer has redeemed the rule `max_uses_per_customer` times.
    CustomerQuota,

    /// The cart already holds a gift from this rule.
    Duplicate,

    /// The condition tree does not hold for the cart.
    Conditions,

    /// The product is not a gift of this rule.
    GiftProduct,

    /// Catalog stock or the rule-scoped allocation is exhausted.
    Stock,

    /// The gift line asks for more units than the rule allows per order.
    PerOrderQuantity,
}

impl Gate {
    /// Stable gate name used in reasons and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RuleNotFound => "rule",
            Self::Active => "active",
            Self::Window => "window",
            Self::GlobalQuota => "global_quota",
            Self::CustomerQuota => "customer_quota",
            Self::Duplicate => "duplicate",
            Self::Conditions => "conditions",
            Self::GiftProduct => "gift_product",
            Self::Stock => "stock",
            Self::PerOrderQuantity => "per_order_quantity",
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a rule or gift selection was turned down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// The failing gate
    pub gate: Gate,

    /// Rule that was checked, absent when a gift line names no rule
    pub rule: Option<RuleId>,

    /// Gift product, when a specific selection was checked
    pub product: Option<ProductId>,

    /// Human-readable explanation
    pub reason: String,
}

impl Denial {
    /// Deny `rule` at `gate`.
    #[must_use]
    pub fn new(gate: Gate, rule: RuleId, reason: impl Into<String>) -> Self {
        Self {
            gate,
            rule: Some(rule),
            product: None,
            reason: reason.into(),
        }
    }

    /// Deny at `gate` without a rule to attribute it to.
    #[must_use]
    pub fn unattributed(gate: Gate, reason: impl Into<String>) -> Self {
        Self {
            gate,
            rule: None,
            product: None,
            reason: reason.into(),
        }
    }

    /// Attach the gift product the denial concerns.
    #[must_use]
    pub fn for_product(mut self, product: ProductId) -> Self {
        self.product = Some(product);
        self
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.gate, self.reason)?;

        match (self.rule, self.product) {
            (Some(rule), Some(product)) => write!(f, " (rule {rule}, product {product})"),
            (Some(rule), None) => write!(f, " (rule {rule})"),
            (None, Some(product)) => write!(f, " (product {product})"),
            (None, None) => Ok(()),
        }
    }
}

impl std::error::Error for Denial {}

/// One row of a matcher report.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEligibility {
    /// The evaluated rule
    pub rule: GiftRule,

    /// Why the rule is unavailable, `None` when eligible
    pub denial: Option<Denial>,
}

impl RuleEligibility {
    /// Whether every gate passed.
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        self.denial.is_none()
    }

    /// Reason for ineligibility.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.denial.as_ref().map(ToString::to_string)
    }
}

/// Activation gate: the active flag.
///
/// # Errors
///
/// Returns a [`Gate::Active`] denial when the rule is switched off.
pub fn check_active(rule: &GiftRule) -> Result<(), Denial> {
    if rule.is_active {
        Ok(())
    } else {
        Err(Denial::new(Gate::Active, rule.id, "rule is not active"))
    }
}

/// Activation gate: the inclusive validity window.
///
/// # Errors
///
/// Returns a [`Gate::Window`] denial when `now` is before `valid_from` or after `valid_until`.
pub fn check_window(rule: &GiftRule, now: Timestamp) -> Result<(), Denial> {
    match rule.window.position(now) {
        WindowPosition::Within => Ok(()),
        WindowPosition::NotYetValid(from) => Err(Denial::new(
            Gate::Window,
            rule.id,
            format!("not yet valid (starts {from})"),
        )),
        WindowPosition::Expired(until) => Err(Denial::new(
            Gate::Window,
            rule.id,
            format!("expired (ended {until})"),
        )),
    }
}

/// Capacity gate: global redemptions.
///
/// # Errors
///
/// Returns a [`Gate::GlobalQuota`] denial once `current_total_uses` reaches `max_total_uses`.
pub fn check_global_quota(rule: &GiftRule) -> Result<(), Denial> {
    if rule.quota.has_global_headroom() {
        return Ok(());
    }

    Err(Denial::new(
        Gate::GlobalQuota,
        rule.id,
        format!(
            "all {} redemptions have been used",
            rule.quota.max_total_uses.unwrap_or_default()
        ),
    ))
}

/// Capacity gate: redemptions by one customer.
///
/// # Errors
///
/// Returns a [`Gate::CustomerQuota`] denial once `used` reaches `max_uses_per_customer`.
pub fn check_customer_quota(rule: &GiftRule, used: u32) -> Result<(), Denial> {
    if rule.quota.has_customer_headroom(used) {
        return Ok(());
    }

    Err(Denial::new(
        Gate::CustomerQuota,
        rule.id,
        format!(
            "already redeemed {used} of {} times allowed per customer",
            rule.quota.max_uses_per_customer.unwrap_or_default()
        ),
    ))
}

/// At most one gift line per rule per cart.
///
/// # Errors
///
/// Returns a [`Gate::Duplicate`] denial when the cart already holds a gift from `rule`.
pub fn check_duplicate(rule: &GiftRule, context: &EvaluationContext) -> Result<(), Denial> {
    if context.has_gift_for(rule.id) {
        Err(Denial::new(
            Gate::Duplicate,
            rule.id,
            "a gift from this rule is already in the cart",
        ))
    } else {
        Ok(())
    }
}

/// The rule's condition tree against the cart.
///
/// # Errors
///
/// Returns a [`Gate::Conditions`] denial naming the unmet condition.
pub fn check_conditions(rule: &GiftRule, context: &EvaluationContext) -> Result<(), Denial> {
    match rule.conditions.shortfall(context) {
        None => Ok(()),
        Some(reason) => Err(Denial::new(Gate::Conditions, rule.id, reason)),
    }
}
