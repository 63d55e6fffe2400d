//! Gift Validator
//!
//! Authoritative checks run when a gift is added to a cart and again before an order commits.
//! Every check fails closed: the first failing gate is returned.

use std::fmt;

use jiff::Timestamp;
use rustc_hash::FxHashMap;

use crate::{
    cart::{CartLine, CartProduct, EvaluationContext},
    eligibility::{
        Denial, Gate, check_active, check_conditions, check_customer_quota, check_duplicate,
        check_global_quota, check_window,
    },
    ids::{CartLineId, ProductId, RuleId},
    rules::GiftRule,
    usage::UsageCounts,
};

/// A customer's request to receive `product_id` from `rule`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GiftSelection {
    /// Rule granting the gift
    pub rule: RuleId,

    /// Requested gift product
    pub product_id: ProductId,

    /// Requested units
    pub quantity: u32,

    /// Current catalog facts for the gift product
    pub product: CartProduct,
}

impl GiftSelection {
    /// Request a single unit.
    #[must_use]
    pub const fn new(rule: RuleId, product_id: ProductId, product: CartProduct) -> Self {
        Self {
            rule,
            product_id,
            quantity: 1,
            product,
        }
    }

    /// The cart line this selection becomes once accepted.
    #[must_use]
    pub fn into_line(self) -> CartLine {
        CartLine::gift(self.rule, self.product_id, self.quantity, self.product)
    }
}

/// A gift line that failed pre-commit validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidGiftLine {
    /// Offending cart line
    pub line: CartLineId,

    /// Why it failed
    pub denial: Denial,
}

/// Every invalid gift line of an order. The whole order is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRejection {
    /// Invalid lines in cart order
    pub invalid_lines: Vec<InvalidGiftLine>,
}

impl OrderRejection {
    /// Identifiers of the invalid lines.
    pub fn line_ids(&self) -> impl Iterator<Item = CartLineId> + '_ {
        self.invalid_lines.iter().map(|invalid| invalid.line)
    }
}

impl fmt::Display for OrderRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "order rejected, {} invalid gift line(s)",
            self.invalid_lines.len()
        )?;

        for invalid in &self.invalid_lines {
            write!(f, "; line {}: {}", invalid.line, invalid.denial)?;
        }

        Ok(())
    }
}

impl std::error::Error for OrderRejection {}

/// Re-validates gift selections against fresh rule, usage and catalog snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct GiftValidator;

impl GiftValidator {
    /// Validate adding `selection` to the cart described by `context`.
    ///
    /// Checks run in this order: the rule exists and is active, `now` is inside its window,
    /// the product is one of its gifts, catalog stock and the rule allocation cover the
    /// quantity, the quantity respects the per-order limit, no gift from the rule is already in
    /// the cart, quota headroom remains, and the condition tree holds for the current cart.
    ///
    /// # Errors
    ///
    /// Returns the [`Denial`] of the first failing check.
    pub fn validate_selection(
        &self,
        rule: Option<&GiftRule>,
        selection: &GiftSelection,
        usage: &UsageCounts,
        context: &EvaluationContext,
        now: Timestamp,
    ) -> Result<(), Denial> {
        let product = selection.product_id;

        let Some(rule) = rule.filter(|rule| rule.id == selection.rule) else {
            return Err(Denial::new(
                Gate::RuleNotFound,
                selection.rule,
                "gift rule does not exist",
            )
            .for_product(product));
        };

        let gated = check_active(rule)
            .and_then(|()| check_window(rule, now))
            .and_then(|()| check_gift_product(rule, selection))
            .and_then(|()| check_duplicate(rule, context))
            .and_then(|()| check_global_quota(rule))
            .and_then(|()| check_customer_quota(rule, usage.get(rule.id)))
            .and_then(|()| check_conditions(rule, context));

        gated.map_err(|denial| denial.for_product(product))
    }

    /// Validate every gift line of an order before it commits.
    ///
    /// Each gift line is checked as a selection against the cart without that line, so a second
    /// line for the same rule is reported as a duplicate.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderRejection`] listing every invalid gift line.
    pub fn validate_order(
        &self,
        rules: &[GiftRule],
        usage: &UsageCounts,
        context: &EvaluationContext,
        now: Timestamp,
    ) -> Result<(), OrderRejection> {
        let by_id: FxHashMap<RuleId, &GiftRule> =
            rules.iter().map(|rule| (rule.id, rule)).collect();

        let invalid_lines: Vec<InvalidGiftLine> = context
            .gift_lines()
            .filter_map(|line| {
                let outcome = match line.gift_rule_id {
                    None => Err(Denial::unattributed(
                        Gate::RuleNotFound,
                        "gift line does not reference a rule",
                    )
                    .for_product(line.product_id)),
                    Some(rule) => {
                        let selection = GiftSelection {
                            rule,
                            product_id: line.product_id,
                            quantity: line.quantity,
                            product: line.product,
                        };

                        self.validate_selection(
                            by_id.get(&rule).copied(),
                            &selection,
                            usage,
                            &context.without_line(line.id),
                            now,
                        )
                    }
                };

                outcome.err().map(|denial| InvalidGiftLine {
                    line: line.id,
                    denial,
                })
            })
            .collect();

        if invalid_lines.is_empty() {
            Ok(())
        } else {
            Err(OrderRejection { invalid_lines })
        }
    }
}

fn check_gift_product(rule: &GiftRule, selection: &GiftSelection) -> Result<(), Denial> {
    let Some(gift) = rule.gift_product(selection.product_id) else {
        return Err(Denial::new(
            Gate::GiftProduct,
            rule.id,
            "product is not a gift of this rule",
        ));
    };

    let quantity = selection.quantity;

    if quantity == 0 {
        return Err(Denial::new(
            Gate::PerOrderQuantity,
            rule.id,
            "at least one unit must be requested",
        ));
    }

    if selection.product.stock < quantity {
        return Err(Denial::new(
            Gate::Stock,
            rule.id,
            format!(
                "product is out of stock ({} available)",
                selection.product.stock
            ),
        ));
    }

    if let Some(remaining) = gift.remaining_stock
        && remaining < quantity
    {
        return Err(Denial::new(
            Gate::Stock,
            rule.id,
            format!("gift allocation is exhausted ({remaining} remaining)"),
        ));
    }

    if quantity > gift.max_quantity_per_order {
        return Err(Denial::new(
            Gate::PerOrderQuantity,
            rule.id,
            format!(
                "at most {} per order, {quantity} requested",
                gift.max_quantity_per_order
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use smallvec::smallvec;
    use testresult::TestResult;

    use crate::{
        conditions::{BoolOp, Condition, ConditionGroup, Leaf},
        ids::UserId,
        rules::{GiftProduct, Priority, Quota, ValidityWindow},
    };

    use super::*;

    struct Setup {
        rule: GiftRule,
        gift: ProductId,
        now: Timestamp,
    }

    fn setup() -> TestResult<Setup> {
        let gift = ProductId::new();

        let rule = GiftRule {
            id: RuleId::new(),
            name: "Free sample over 50".to_string(),
            description: None,
            priority: Priority::try_from(20)?,
            is_active: true,
            conditions: ConditionGroup::new(
                BoolOp::And,
                smallvec![Condition::Leaf(Leaf::MinAmount { amount: 5_000 })],
            ),
            quota: Quota::unlimited(),
            window: ValidityWindow::unbounded(),
            gift_products: smallvec![GiftProduct {
                product_id: gift,
                max_quantity_per_order: 2,
                remaining_stock: Some(5),
            }],
            created_at: Timestamp::UNIX_EPOCH,
        };

        Ok(Setup {
            rule,
            gift,
            now: Timestamp::now(),
        })
    }

    fn stocked(stock: u32) -> CartProduct {
        CartProduct {
            price: 1_000,
            category: None,
            stock,
        }
    }

    fn cart(subtotal: u64) -> EvaluationContext {
        EvaluationContext::new(
            UserId::new(),
            vec![CartLine::purchased(
                ProductId::new(),
                1,
                CartProduct {
                    price: subtotal,
                    category: None,
                    stock: 10,
                },
            )],
        )
    }

    fn gate_of(result: Result<(), Denial>) -> Option<Gate> {
        result.err().map(|denial| denial.gate)
    }

    #[test]
    fn accepts_a_qualifying_selection() -> TestResult {
        let Setup { rule, gift, now } = setup()?;
        let selection = GiftSelection::new(rule.id, gift, stocked(3));

        GiftValidator.validate_selection(
            Some(&rule),
            &selection,
            &UsageCounts::new(),
            &cart(5_000),
            now,
        )?;

        Ok(())
    }

    #[test]
    fn missing_and_inactive_rules_fail_first() -> TestResult {
        let Setup { mut rule, gift, now } = setup()?;
        let selection = GiftSelection::new(rule.id, gift, stocked(0));
        let validator = GiftValidator;

        assert_eq!(
            gate_of(validator.validate_selection(
                None,
                &selection,
                &UsageCounts::new(),
                &cart(0),
                now
            )),
            Some(Gate::RuleNotFound)
        );

        rule.is_active = false;

        assert_eq!(
            gate_of(validator.validate_selection(
                Some(&rule),
                &selection,
                &UsageCounts::new(),
                &cart(0),
                now
            )),
            Some(Gate::Active)
        );

        Ok(())
    }

    #[test]
    fn expired_rule_is_denied_before_stock() -> TestResult {
        let Setup { mut rule, gift, now } = setup()?;
        let start = now.checked_sub(SignedDuration::from_hours(48))?;
        let end = now.checked_sub(SignedDuration::from_hours(24))?;
        rule.window = ValidityWindow::new(Some(start), Some(end))?;

        let result = GiftValidator.validate_selection(
            Some(&rule),
            &GiftSelection::new(rule.id, gift, stocked(0)),
            &UsageCounts::new(),
            &cart(5_000),
            now,
        );

        assert_eq!(gate_of(result), Some(Gate::Window));

        Ok(())
    }

    #[test]
    fn undeclared_product_is_rejected() -> TestResult {
        let Setup { rule, now, .. } = setup()?;

        let result = GiftValidator.validate_selection(
            Some(&rule),
            &GiftSelection::new(rule.id, ProductId::new(), stocked(3)),
            &UsageCounts::new(),
            &cart(5_000),
            now,
        );

        assert_eq!(gate_of(result), Some(Gate::GiftProduct));

        Ok(())
    }

    #[test]
    fn catalog_stock_and_rule_allocation_must_both_hold() -> TestResult {
        let Setup { mut rule, gift, now } = setup()?;
        let context = cart(5_000);
        let usage = UsageCounts::new();

        let no_catalog_stock = GiftValidator.validate_selection(
            Some(&rule),
            &GiftSelection::new(rule.id, gift, stocked(0)),
            &usage,
            &context,
            now,
        );

        assert_eq!(gate_of(no_catalog_stock), Some(Gate::Stock));

        if let Some(declared) = rule.gift_products.first_mut() {
            declared.remaining_stock = Some(0);
        }

        let no_allocation = GiftValidator.validate_selection(
            Some(&rule),
            &GiftSelection::new(rule.id, gift, stocked(3)),
            &usage,
            &context,
            now,
        );

        assert_eq!(gate_of(no_allocation), Some(Gate::Stock));

        Ok(())
    }

    #[test]
    fn per_order_quantity_is_enforced() -> TestResult {
        let Setup { rule, gift, now } = setup()?;

        let mut selection = GiftSelection::new(rule.id, gift, stocked(10));
        selection.quantity = 3;

        let result = GiftValidator.validate_selection(
            Some(&rule),
            &selection,
            &UsageCounts::new(),
            &cart(5_000),
            now,
        );

        let denial = result.err().ok_or("quantity above the limit should be denied")?;

        assert_eq!(denial.gate, Gate::PerOrderQuantity);
        assert_eq!(denial.product, Some(gift));

        Ok(())
    }

    #[test]
    fn cart_changes_since_matching_are_caught() -> TestResult {
        let Setup { rule, gift, now } = setup()?;

        let result = GiftValidator.validate_selection(
            Some(&rule),
            &GiftSelection::new(rule.id, gift, stocked(3)),
            &UsageCounts::new(),
            &cart(4_999),
            now,
        );

        let denial = result.err().ok_or("cart below threshold should be denied")?;

        assert_eq!(denial.gate, Gate::Conditions);
        assert!(denial.reason.contains("50.00"), "{denial}");

        Ok(())
    }

    #[test]
    fn customer_quota_is_rechecked() -> TestResult {
        let Setup { mut rule, gift, now } = setup()?;
        rule.quota.max_uses_per_customer = Some(1);

        let result = GiftValidator.validate_selection(
            Some(&rule),
            &GiftSelection::new(rule.id, gift, stocked(3)),
            &UsageCounts::new().with_count(rule.id, 1),
            &cart(5_000),
            now,
        );

        assert_eq!(gate_of(result), Some(Gate::CustomerQuota));

        Ok(())
    }

    #[test]
    fn order_with_valid_gift_passes() -> TestResult {
        let Setup { rule, gift, now } = setup()?;

        let context =
            cart(5_000).with_line(GiftSelection::new(rule.id, gift, stocked(3)).into_line());

        GiftValidator.validate_order(&[rule], &UsageCounts::new(), &context, now)?;

        Ok(())
    }

    #[test]
    fn order_reports_every_invalid_line() -> TestResult {
        let Setup { rule, gift, now } = setup()?;

        let first = GiftSelection::new(rule.id, gift, stocked(3)).into_line();
        let second = GiftSelection::new(rule.id, gift, stocked(3)).into_line();

        let mut orphan =
            GiftSelection::new(RuleId::new(), ProductId::new(), stocked(1)).into_line();
        orphan.gift_rule_id = None;

        let context = cart(5_000)
            .with_line(first.clone())
            .with_line(second.clone())
            .with_line(orphan.clone());

        let rejection = GiftValidator
            .validate_order(&[rule], &UsageCounts::new(), &context, now)
            .err()
            .ok_or("duplicate gift lines should reject the order")?;

        let lines: Vec<CartLineId> = rejection.line_ids().collect();

        assert_eq!(lines, vec![first.id, second.id, orphan.id]);
        assert!(
            rejection
                .invalid_lines
                .iter()
                .take(2)
                .all(|invalid| invalid.denial.gate == Gate::Duplicate),
            "{rejection}"
        );

        Ok(())
    }
}
