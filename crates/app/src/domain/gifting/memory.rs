//! In-memory rule store and usage ledger
//!
//! Rules and usages live behind one lock, so a batch of claims is checked and applied in a
//! single critical section.

use std::sync::Arc;

use async_trait::async_trait;
use gifting::{
    ids::{OrderId, ProductId, RuleId, UsageId, UserId},
    matcher::offer_order,
    rules::{GiftRule, GiftRuleUsage, authoring::RuleDraft},
    usage::UsageCounts,
};
use jiff::Timestamp;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::domain::{
    catalog::CatalogReader,
    gift_rules::{GiftRulesService, GiftRulesServiceError, data::RuleFilter, validate_draft},
    ledger::{
        LedgerError, UsageLedger,
        data::{ConflictReason, GiftClaim, GiftConflict},
    },
};

#[derive(Debug, Default)]
struct StoreState {
    rules: FxHashMap<RuleId, GiftRule>,
    usages: Vec<GiftRuleUsage>,
}

/// Rule store and usage ledger held in process memory.
pub struct InMemoryGiftStore {
    catalog: Arc<dyn CatalogReader>,
    state: Mutex<StoreState>,
}

impl InMemoryGiftStore {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogReader>) -> Self {
        Self::with_rules(catalog, [])
    }

    /// A store seeded with already validated rules, such as those loaded from fixtures.
    #[must_use]
    pub fn with_rules(
        catalog: Arc<dyn CatalogReader>,
        rules: impl IntoIterator<Item = GiftRule>,
    ) -> Self {
        Self {
            catalog,
            state: Mutex::new(StoreState {
                rules: rules.into_iter().map(|rule| (rule.id, rule)).collect(),
                usages: Vec::new(),
            }),
        }
    }

    fn claim_all(
        &self,
        user: UserId,
        order: Option<OrderId>,
        claims: &[GiftClaim],
    ) -> Result<Vec<GiftRuleUsage>, LedgerError> {
        let mut state = self.state.lock();

        let used = UsageCounts::from_usages(user, &state.usages);
        let now = Timestamp::now();

        let mut pending_uses: FxHashMap<RuleId, u32> = FxHashMap::default();
        let mut pending_stock: FxHashMap<(RuleId, ProductId), u32> = FxHashMap::default();
        let mut conflicts = Vec::new();

        for claim in claims {
            let uses = pending_uses.get(&claim.rule).copied().unwrap_or_default();
            let units = pending_stock
                .get(&(claim.rule, claim.product))
                .copied()
                .unwrap_or_default();

            let reason = match state.rules.get(&claim.rule) {
                None => Some(ConflictReason::RuleRetired),
                Some(rule) if !rule.is_active || !rule.window.contains(now) => {
                    Some(ConflictReason::RuleRetired)
                }
                Some(rule)
                    if rule.quota.max_total_uses.is_some_and(|limit| {
                        rule.quota.current_total_uses.saturating_add(uses) >= limit
                    }) =>
                {
                    Some(ConflictReason::GlobalQuota)
                }
                Some(rule)
                    if rule
                        .quota
                        .max_uses_per_customer
                        .is_some_and(|limit| used.get(rule.id).saturating_add(uses) >= limit) =>
                {
                    Some(ConflictReason::CustomerQuota)
                }
                Some(rule) => match rule.gift_product(claim.product) {
                    Some(gift)
                        if gift.remaining_stock.is_none_or(|remaining| {
                            remaining >= units.saturating_add(claim.quantity)
                        }) =>
                    {
                        None
                    }
                    _ => Some(ConflictReason::Stock),
                },
            };

            match reason {
                Some(reason) => conflicts.push(GiftConflict::new(claim, reason)),
                None => {
                    *pending_uses.entry(claim.rule).or_default() += 1;
                    *pending_stock.entry((claim.rule, claim.product)).or_default() +=
                        claim.quantity;
                }
            }
        }

        if !conflicts.is_empty() {
            for conflict in &conflicts {
                warn!(
                    line_uuid = %conflict.line,
                    rule_uuid = %conflict.rule,
                    reason = %conflict.reason,
                    "gift claim lost to a concurrent redemption"
                );
            }

            return Err(LedgerError::ConcurrencyConflict { conflicts });
        }

        let mut recorded = Vec::with_capacity(claims.len());

        for claim in claims {
            if let Some(rule) = state.rules.get_mut(&claim.rule) {
                rule.quota.current_total_uses = rule.quota.current_total_uses.saturating_add(1);

                if let Some(gift) = rule
                    .gift_products
                    .iter_mut()
                    .find(|gift| gift.product_id == claim.product)
                {
                    gift.remaining_stock = gift
                        .remaining_stock
                        .map(|remaining| remaining.saturating_sub(claim.quantity));
                }
            }

            recorded.push(GiftRuleUsage {
                id: UsageId::new(),
                user,
                rule: claim.rule,
                product: claim.product,
                order,
                used_at: now,
            });
        }

        state.usages.extend(recorded.iter().copied());

        Ok(recorded)
    }
}

#[async_trait]
impl GiftRulesService for InMemoryGiftStore {
    async fn create_rule(&self, draft: RuleDraft) -> Result<GiftRule, GiftRulesServiceError> {
        let new_rule = validate_draft(self.catalog.as_ref(), &draft).await?;
        let rule = new_rule.into_rule(RuleId::new(), Timestamp::now());

        self.state.lock().rules.insert(rule.id, rule.clone());

        info!(rule_uuid = %rule.id, "created gift rule");

        Ok(rule)
    }

    async fn update_rule(
        &self,
        rule: RuleId,
        draft: RuleDraft,
    ) -> Result<GiftRule, GiftRulesServiceError> {
        let new_rule = validate_draft(self.catalog.as_ref(), &draft).await?;

        let mut state = self.state.lock();

        let existing = state
            .rules
            .get_mut(&rule)
            .ok_or(GiftRulesServiceError::NotFound)?;

        let current_total_uses = existing.quota.current_total_uses;

        new_rule.check_recorded_uses(current_total_uses)?;

        *existing = new_rule.into_rule(rule, existing.created_at);
        existing.quota.current_total_uses = current_total_uses;

        Ok(existing.clone())
    }

    async fn set_active(&self, rule: RuleId, is_active: bool) -> Result<(), GiftRulesServiceError> {
        self.state
            .lock()
            .rules
            .get_mut(&rule)
            .map(|existing| existing.is_active = is_active)
            .ok_or(GiftRulesServiceError::NotFound)
    }

    async fn delete_rule(&self, rule: RuleId) -> Result<(), GiftRulesServiceError> {
        let mut state = self.state.lock();

        state
            .rules
            .remove(&rule)
            .ok_or(GiftRulesServiceError::NotFound)?;

        Ok(())
    }

    async fn get_rule(&self, rule: RuleId) -> Result<GiftRule, GiftRulesServiceError> {
        self.state
            .lock()
            .rules
            .get(&rule)
            .cloned()
            .ok_or(GiftRulesServiceError::NotFound)
    }

    async fn list_rules(&self, filter: RuleFilter) -> Result<Vec<GiftRule>, GiftRulesServiceError> {
        let mut rules: Vec<GiftRule> = self
            .state
            .lock()
            .rules
            .values()
            .filter(|rule| !filter.active_only() || rule.is_active)
            .cloned()
            .collect();

        rules.sort_by(offer_order);

        Ok(rules)
    }
}

#[async_trait]
impl UsageLedger for InMemoryGiftStore {
    async fn usage_counts(&self, user: UserId) -> Result<UsageCounts, LedgerError> {
        Ok(UsageCounts::from_usages(user, &self.state.lock().usages))
    }

    async fn usages(&self, user: UserId) -> Result<Vec<GiftRuleUsage>, LedgerError> {
        Ok(self
            .state
            .lock()
            .usages
            .iter()
            .filter(|usage| usage.user == user)
            .copied()
            .collect())
    }

    async fn record(
        &self,
        user: UserId,
        order: Option<OrderId>,
        claims: &[GiftClaim],
    ) -> Result<Vec<GiftRuleUsage>, LedgerError> {
        self.claim_all(user, order, claims)
    }
}

#[cfg(test)]
mod tests {
    use gifting::{
        cart::CartLine,
        fixtures::Fixture,
        ids::CartLineId,
        rules::authoring::{AuthoringError, ConditionDraft, GiftProductDraft},
    };
    use jiff::SignedDuration;
    use testresult::TestResult;

    use crate::domain::{
        catalog::FixtureCatalog,
        gifting::{EngineGiftingService, GiftingService, GiftingServiceError},
    };

    use super::*;

    fn draft(name: &str, priority: f64, gift: ProductId, remaining_stock: Option<i64>) -> RuleDraft {
        RuleDraft {
            name: name.to_string(),
            description: None,
            priority,
            is_active: true,
            condition_logic: None,
            conditions: vec![ConditionDraft {
                kind: Some("min_amount".to_string()),
                amount: Some(5_000),
                ..ConditionDraft::default()
            }],
            gift_products: vec![GiftProductDraft {
                product: gift,
                max_quantity_per_order: None,
                remaining_stock,
            }],
            max_uses_per_customer: None,
            max_total_uses: None,
            valid_from: None,
            valid_until: None,
        }
    }

    fn store() -> TestResult<(Fixture, Arc<InMemoryGiftStore>)> {
        let fixture = Fixture::from_set_at("../../fixtures", "spend_threshold")?;
        let catalog = Arc::new(FixtureCatalog::from_fixture(&fixture));

        Ok((fixture, Arc::new(InMemoryGiftStore::new(catalog))))
    }

    fn claim(rule: RuleId, product: ProductId) -> GiftClaim {
        GiftClaim {
            line: CartLineId::new(),
            rule,
            product,
            quantity: 1,
        }
    }

    #[tokio::test]
    async fn list_rules_uses_offer_order_and_filters_inactive() -> TestResult {
        let (fixture, store) = store()?;
        let tote = fixture.product_id("tote")?;

        let low = store.create_rule(draft("Low", 10.0, tote, None)).await?;
        let high = store.create_rule(draft("High", 90.0, tote, None)).await?;

        store.set_active(high.id, false).await?;

        let all: Vec<RuleId> = store
            .list_rules(RuleFilter::All)
            .await?
            .iter()
            .map(|rule| rule.id)
            .collect();

        let active: Vec<RuleId> = store
            .list_rules(RuleFilter::Active)
            .await?
            .iter()
            .map(|rule| rule.id)
            .collect();

        assert_eq!(all, vec![high.id, low.id]);
        assert_eq!(active, vec![low.id]);

        Ok(())
    }

    #[tokio::test]
    async fn update_keeps_usage_and_creation_time() -> TestResult {
        let (fixture, store) = store()?;
        let tote = fixture.product_id("tote")?;

        let rule = store.create_rule(draft("Tote", 50.0, tote, None)).await?;

        store
            .record(UserId::new(), None, &[claim(rule.id, tote)])
            .await?;

        let updated = store
            .update_rule(rule.id, draft("Tote, renamed", 60.0, tote, None))
            .await?;

        assert_eq!(updated.name, "Tote, renamed");
        assert_eq!(updated.created_at, rule.created_at);
        assert_eq!(updated.quota.current_total_uses, 1);

        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_rule_but_keeps_history() -> TestResult {
        let (fixture, store) = store()?;
        let tote = fixture.product_id("tote")?;
        let user = UserId::new();

        let rule = store.create_rule(draft("Tote", 50.0, tote, None)).await?;

        let recorded = store.record(user, None, &[claim(rule.id, tote)]).await?;
        store.delete_rule(rule.id).await?;

        assert!(matches!(
            store.get_rule(rule.id).await,
            Err(GiftRulesServiceError::NotFound)
        ));
        assert_eq!(store.usages(user).await?, recorded);
        assert_eq!(store.usage_counts(user).await?.get(rule.id), 1);

        Ok(())
    }

    #[tokio::test]
    async fn update_rejects_total_limit_below_recorded_uses() -> TestResult {
        let (fixture, store) = store()?;
        let tote = fixture.product_id("tote")?;

        let mut capped = draft("Tote", 50.0, tote, None);
        capped.max_total_uses = Some(5);

        let rule = store.create_rule(capped.clone()).await?;

        for _ in 0..3 {
            store
                .record(UserId::new(), None, &[claim(rule.id, tote)])
                .await?;
        }

        capped.max_total_uses = Some(1);

        let result = store.update_rule(rule.id, capped).await;

        let Err(GiftRulesServiceError::Invalid(AuthoringError::Invalid(errors))) = result else {
            panic!("expected validation errors, got {result:?}");
        };

        assert!(errors.has("max_total_uses"));

        let stored = store.get_rule(rule.id).await?;

        assert_eq!(stored.quota.max_total_uses, Some(5));
        assert_eq!(stored.quota.current_total_uses, 3);

        Ok(())
    }

    #[tokio::test]
    async fn claims_against_a_retired_rule_conflict() -> TestResult {
        let (fixture, store) = store()?;
        let tote = fixture.product_id("tote")?;
        let user = UserId::new();

        let paused = store.create_rule(draft("Paused", 50.0, tote, None)).await?;
        let deleted = store.create_rule(draft("Deleted", 40.0, tote, None)).await?;

        let mut expired = draft("Expired", 30.0, tote, None);
        expired.valid_until = Some(Timestamp::now() - SignedDuration::from_hours(1));

        let expired = store.create_rule(expired).await?;

        store.set_active(paused.id, false).await?;
        store.delete_rule(deleted.id).await?;

        let result = store
            .record(
                user,
                None,
                &[
                    claim(paused.id, tote),
                    claim(deleted.id, tote),
                    claim(expired.id, tote),
                ],
            )
            .await;

        let Err(LedgerError::ConcurrencyConflict { conflicts }) = result else {
            panic!("expected a conflict, got {result:?}");
        };

        assert_eq!(
            conflicts
                .iter()
                .map(|conflict| conflict.reason)
                .collect::<Vec<_>>(),
            vec![ConflictReason::RuleRetired; 3]
        );
        assert!(store.usages(user).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn a_failing_claim_leaves_the_batch_unapplied() -> TestResult {
        let (fixture, store) = store()?;
        let tote = fixture.product_id("tote")?;
        let sample = fixture.product_id("sample")?;
        let user = UserId::new();

        let open = store.create_rule(draft("Open", 50.0, sample, None)).await?;
        let scarce = store.create_rule(draft("Scarce", 50.0, tote, Some(1))).await?;

        let result = store
            .record(
                user,
                None,
                &[
                    claim(open.id, sample),
                    claim(scarce.id, tote),
                    claim(scarce.id, tote),
                ],
            )
            .await;

        let Err(LedgerError::ConcurrencyConflict { conflicts }) = result else {
            panic!("expected a conflict, got {result:?}");
        };

        assert_eq!(conflicts.len(), 1);
        assert_eq!(
            conflicts.first().map(|conflict| conflict.reason),
            Some(ConflictReason::Stock)
        );

        assert!(store.usages(user).await?.is_empty());
        assert_eq!(store.get_rule(open.id).await?.quota.current_total_uses, 0);
        assert_eq!(
            store
                .get_rule(scarce.id)
                .await?
                .gift_product(tote)
                .and_then(|gift| gift.remaining_stock),
            Some(1)
        );

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_commits_for_the_last_unit_admit_exactly_one() -> TestResult {
        let (fixture, store) = store()?;
        let tote = fixture.product_id("tote")?;

        let rule = store.create_rule(draft("Last tote", 50.0, tote, Some(1))).await?;

        let first = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.record(UserId::new(), None, &[claim(rule.id, tote)]).await }
        });

        let second = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.record(UserId::new(), None, &[claim(rule.id, tote)]).await }
        });

        let outcomes = [first.await?, second.await?];

        let committed = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        let conflicts: Vec<ConflictReason> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                Err(LedgerError::ConcurrencyConflict { conflicts }) => {
                    conflicts.first().map(|conflict| conflict.reason)
                }
                _ => None,
            })
            .collect();

        assert_eq!(committed, 1);
        assert_eq!(conflicts, vec![ConflictReason::Stock]);

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_checkouts_never_oversell_the_last_gift() -> TestResult {
        let (fixture, store) = store()?;
        let tote = fixture.product_id("tote")?;
        let tote_product = fixture.product("tote")?.product;

        let rule = store.create_rule(draft("Last tote", 50.0, tote, Some(1))).await?;

        let gifting = Arc::new(EngineGiftingService::new(
            store.clone(),
            store.clone(),
            Arc::new(FixtureCatalog::from_fixture(&fixture)),
        ));

        let checkout = |gifting: Arc<EngineGiftingService>| -> TestResult<_> {
            let context = fixture
                .context()?
                .with_line(CartLine::gift(rule.id, tote, 1, tote_product));

            Ok(tokio::spawn(async move {
                gifting.commit_order_gifts(OrderId::new(), &context).await
            }))
        };

        let first = checkout(Arc::clone(&gifting))?;
        let second = checkout(Arc::clone(&gifting))?;

        let outcomes = [first.await?, second.await?];

        let committed = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        let lost = outcomes
            .iter()
            .filter(|outcome| {
                matches!(
                    outcome,
                    Err(GiftingServiceError::Conflict { .. } | GiftingServiceError::Rejected(_))
                )
            })
            .count();

        assert_eq!((committed, lost), (1, 1));
        assert_eq!(
            store
                .get_rule(rule.id)
                .await?
                .gift_product(tote)
                .and_then(|gift| gift.remaining_stock),
            Some(0)
        );

        Ok(())
    }
}
