//! Rule Matcher
//!
//! Advisory pass over every active rule. The report is ranked by priority and never fails: an
//! ineligible rule is reported with its [`Denial`].

use std::cmp::Ordering;

use jiff::Timestamp;

use crate::{
    cart::EvaluationContext,
    eligibility::{
        Denial, RuleEligibility, check_conditions, check_customer_quota, check_duplicate,
        check_global_quota, check_window,
    },
    rules::GiftRule,
    usage::UsageCounts,
};

/// Ranks active rules and reports which ones a cart qualifies for.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleMatcher;

impl RuleMatcher {
    /// Evaluate every active rule against the cart.
    ///
    /// Rules are ordered by priority descending, then by creation time ascending. Each rule is
    /// gated, in order, on its validity window, global quota, the customer's quota, an existing
    /// gift line for the rule and finally its condition tree; the first failing gate is reported.
    #[must_use]
    pub fn match_all(
        &self,
        rules: &[GiftRule],
        usage: &UsageCounts,
        context: &EvaluationContext,
        now: Timestamp,
    ) -> Vec<RuleEligibility> {
        rank(rules)
            .into_iter()
            .map(|rule| RuleEligibility {
                rule: rule.clone(),
                denial: gate(rule, usage, context, now).err(),
            })
            .collect()
    }

    /// The eligible subset of [`RuleMatcher::match_all`], best offer first.
    #[must_use]
    pub fn eligible(
        &self,
        rules: &[GiftRule],
        usage: &UsageCounts,
        context: &EvaluationContext,
        now: Timestamp,
    ) -> Vec<GiftRule> {
        self.match_all(rules, usage, context, now)
            .into_iter()
            .filter(RuleEligibility::is_eligible)
            .map(|report| report.rule)
            .collect()
    }
}

fn gate(
    rule: &GiftRule,
    usage: &UsageCounts,
    context: &EvaluationContext,
    now: Timestamp,
) -> Result<(), Denial> {
    check_window(rule, now)?;
    check_global_quota(rule)?;
    check_customer_quota(rule, usage.get(rule.id))?;
    check_duplicate(rule, context)?;
    check_conditions(rule, context)
}

/// Active rules in offer order.
#[must_use]
pub fn rank(rules: &[GiftRule]) -> Vec<&GiftRule> {
    let mut active: Vec<&GiftRule> = rules.iter().filter(|rule| rule.is_active).collect();

    active.sort_by(|a, b| offer_order(a, b));

    active
}

/// Priority descending, then creation time ascending, then identifier.
#[must_use]
pub fn offer_order(a: &GiftRule, b: &GiftRule) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use smallvec::smallvec;
    use testresult::TestResult;

    use crate::{
        cart::{CartLine, CartProduct},
        conditions::{BoolOp, Condition, ConditionGroup, Leaf},
        eligibility::Gate,
        ids::{ProductId, RuleId, UserId},
        rules::{GiftProduct, Priority, Quota, ValidityWindow},
    };

    use super::*;

    fn rule(priority: i64, created_at: Timestamp, min_amount: u64) -> TestResult<GiftRule> {
        Ok(GiftRule {
            id: RuleId::new(),
            name: format!("Spend {min_amount}"),
            description: None,
            priority: Priority::try_from(priority)?,
            is_active: true,
            conditions: ConditionGroup::new(
                BoolOp::And,
                smallvec![Condition::Leaf(Leaf::MinAmount { amount: min_amount })],
            ),
            quota: Quota::unlimited(),
            window: ValidityWindow::unbounded(),
            gift_products: smallvec![GiftProduct::new(ProductId::new())],
            created_at,
        })
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
                    stock: 1,
                },
            )],
        )
    }

    #[test]
    fn ranks_by_priority_then_oldest_first() -> TestResult {
        let now = Timestamp::now();
        let earlier = now.checked_sub(SignedDuration::from_hours(1))?;

        let low = rule(10, earlier, 0)?;
        let high_new = rule(90, now, 0)?;
        let high_old = rule(90, earlier, 0)?;

        let rules = [low.clone(), high_new.clone(), high_old.clone()];
        let ranked: Vec<RuleId> = rank(&rules).iter().map(|rule| rule.id).collect();

        assert_eq!(ranked, vec![high_old.id, high_new.id, low.id]);

        Ok(())
    }

    #[test]
    fn inactive_rules_are_not_reported() -> TestResult {
        let now = Timestamp::now();

        let mut retired = rule(50, now, 0)?;
        retired.is_active = false;

        let live = rule(50, now, 0)?;

        let report =
            RuleMatcher.match_all(&[retired, live.clone()], &UsageCounts::new(), &cart(0), now);

        assert_eq!(report.len(), 1);
        assert_eq!(report.first().map(|row| row.rule.id), Some(live.id));

        Ok(())
    }

    #[test]
    fn window_gate_runs_before_conditions() -> TestResult {
        let now = Timestamp::now();
        let tomorrow = now.checked_add(SignedDuration::from_hours(24))?;

        let mut future = rule(50, now, 1_000_000)?;
        future.window = ValidityWindow::new(Some(tomorrow), None)?;

        let report = RuleMatcher.match_all(&[future], &UsageCounts::new(), &cart(0), now);
        let denial = report
            .first()
            .and_then(|row| row.denial.clone())
            .ok_or("rule should be denied")?;

        assert_eq!(denial.gate, Gate::Window);

        Ok(())
    }

    #[test]
    fn quota_gates_follow_ledger_counts() -> TestResult {
        let now = Timestamp::now();

        let mut limited = rule(50, now, 0)?;
        limited.quota = Quota {
            max_uses_per_customer: Some(2),
            max_total_uses: Some(3),
            current_total_uses: 2,
        };

        let context = cart(0);
        let gate_for = |rule: &GiftRule, usage: &UsageCounts| {
            RuleMatcher
                .match_all(std::slice::from_ref(rule), usage, &context, now)
                .first()
                .and_then(|row| row.denial.as_ref().map(|denial| denial.gate))
        };

        assert_eq!(gate_for(&limited, &UsageCounts::new()), None);
        assert_eq!(
            gate_for(&limited, &UsageCounts::new().with_count(limited.id, 2)),
            Some(Gate::CustomerQuota)
        );

        limited.quota.current_total_uses = 3;

        assert_eq!(
            gate_for(&limited, &UsageCounts::new()),
            Some(Gate::GlobalQuota)
        );

        Ok(())
    }

    #[test]
    fn existing_gift_line_blocks_the_rule() -> TestResult {
        let now = Timestamp::now();
        let offer = rule(50, now, 0)?;

        let context = cart(0).with_line(CartLine::gift(
            offer.id,
            ProductId::new(),
            1,
            CartProduct {
                price: 0,
                category: None,
                stock: 1,
            },
        ));

        let eligible = RuleMatcher.eligible(&[offer], &UsageCounts::new(), &context, now);

        assert!(eligible.is_empty());

        Ok(())
    }
}
