//! Usage Ledger Service

use async_trait::async_trait;
use gifting::{
    ids::{OrderId, UsageId, UserId},
    rules::GiftRuleUsage,
    usage::UsageCounts,
};
use mockall::automock;
use sqlx::{Postgres, Transaction};
use tracing::{Span, info, warn};

use crate::{
    database::Db,
    domain::ledger::{
        LedgerError,
        data::{ConflictReason, GiftClaim, GiftConflict},
        repository::PgUsageRepository,
    },
};

#[derive(Debug, Clone)]
pub struct PgUsageLedger {
    db: Db,
    usages: PgUsageRepository,
}

impl PgUsageLedger {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self {
            db,
            usages: PgUsageRepository::new(),
        }
    }

    /// Record `claims` inside a transaction owned by the caller, such as the order's own.
    ///
    /// Every claim is attempted so that all conflicts are reported together. On error the
    /// caller must roll back: earlier claims in the batch have already been applied to `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConcurrencyConflict`] listing every claim whose quota or stock
    /// was taken, or whose rule was retired, since validation, or a storage error.
    #[tracing::instrument(
        name = "ledger.record_in",
        skip(self, tx, claims),
        fields(
            user_uuid = %user,
            claim_count = claims.len(),
            conflict_count = tracing::field::Empty
        ),
        err
    )]
    pub async fn record_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
        order: Option<OrderId>,
        claims: &[GiftClaim],
    ) -> Result<Vec<GiftRuleUsage>, LedgerError> {
        let mut conflicts = Vec::new();
        let mut recorded = Vec::with_capacity(claims.len());

        for claim in claims {
            let Some(customer_limit) = self.usages.claim_rule_use(tx, claim.rule).await? else {
                let reason = if self.usages.rule_redeemable(tx, claim.rule).await? {
                    ConflictReason::GlobalQuota
                } else {
                    ConflictReason::RuleRetired
                };

                conflicts.push(GiftConflict::new(claim, reason));
                continue;
            };

            if let Some(limit) = customer_limit {
                let used = self
                    .usages
                    .count_customer_uses(tx, user, claim.rule)
                    .await?;

                if used >= limit {
                    conflicts.push(GiftConflict::new(claim, ConflictReason::CustomerQuota));
                    continue;
                }
            }

            let claimed = self
                .usages
                .claim_gift_stock(tx, claim.rule, claim.product, claim.quantity)
                .await?;

            if claimed == 0 {
                conflicts.push(GiftConflict::new(claim, ConflictReason::Stock));
                continue;
            }

            let id = UsageId::new();

            let used_at = self
                .usages
                .create_usage(tx, id, user, claim.rule, claim.product, order)
                .await?;

            recorded.push(GiftRuleUsage {
                id,
                user,
                rule: claim.rule,
                product: claim.product,
                order,
                used_at,
            });
        }

        if !conflicts.is_empty() {
            Span::current().record("conflict_count", tracing::field::display(conflicts.len()));

            for conflict in &conflicts {
                warn!(
                    line_uuid = %conflict.line,
                    rule_uuid = %conflict.rule,
                    product_uuid = %conflict.product,
                    reason = %conflict.reason,
                    "gift claim lost to a concurrent redemption"
                );
            }

            return Err(LedgerError::ConcurrencyConflict { conflicts });
        }

        Ok(recorded)
    }
}

#[async_trait]
impl UsageLedger for PgUsageLedger {
    #[tracing::instrument(name = "ledger.usage_counts", skip(self), fields(user_uuid = %user), err)]
    async fn usage_counts(&self, user: UserId) -> Result<UsageCounts, LedgerError> {
        let mut tx = self.db.begin().await?;

        let counts = self.usages.count_usages_by_rule(&mut tx, user).await?;

        tx.commit().await?;

        Ok(counts.into_iter().collect())
    }

    #[tracing::instrument(name = "ledger.usages", skip(self), fields(user_uuid = %user), err)]
    async fn usages(&self, user: UserId) -> Result<Vec<GiftRuleUsage>, LedgerError> {
        let mut tx = self.db.begin().await?;

        let usages = self.usages.list_usages(&mut tx, user).await?;

        tx.commit().await?;

        Ok(usages)
    }

    async fn record(
        &self,
        user: UserId,
        order: Option<OrderId>,
        claims: &[GiftClaim],
    ) -> Result<Vec<GiftRuleUsage>, LedgerError> {
        let mut tx = self.db.begin().await?;

        let recorded = self.record_in(&mut tx, user, order, claims).await?;

        tx.commit().await?;

        info!(user_uuid = %user, usage_count = recorded.len(), "recorded gift usages");

        Ok(recorded)
    }
}

#[automock]
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Redemption counts of one customer, keyed by rule.
    async fn usage_counts(&self, user: UserId) -> Result<UsageCounts, LedgerError>;

    /// Redemption history of one customer, oldest first.
    async fn usages(&self, user: UserId) -> Result<Vec<GiftRuleUsage>, LedgerError>;

    /// Atomically claim quota and stock for every claim and append one usage per claim.
    ///
    /// Either every claim is recorded or none is.
    async fn record(
        &self,
        user: UserId,
        order: Option<OrderId>,
        claims: &[GiftClaim],
    ) -> Result<Vec<GiftRuleUsage>, LedgerError>;
}
