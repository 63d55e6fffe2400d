//! Usage Repository

use gifting::{
    ids::{OrderId, ProductId, RuleId, UsageId, UserId},
    rules::GiftRuleUsage,
};
use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as, query_scalar};
use uuid::Uuid;

use crate::database::{decode_error, try_i32, try_u32};

const CLAIM_RULE_USE_SQL: &str = include_str!("sql/claim_rule_use.sql");
const RULE_REDEEMABLE_SQL: &str = include_str!("sql/rule_redeemable.sql");
const COUNT_CUSTOMER_USES_SQL: &str = include_str!("sql/count_customer_uses.sql");
const CLAIM_GIFT_STOCK_SQL: &str = include_str!("sql/claim_gift_stock.sql");
const CREATE_USAGE_SQL: &str = include_str!("sql/create_usage.sql");
const COUNT_USAGES_BY_RULE_SQL: &str = include_str!("sql/count_usages_by_rule.sql");
const LIST_USAGES_SQL: &str = include_str!("sql/list_usages.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgUsageRepository;

impl PgUsageRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    /// Take one use of the rule's global quota.
    ///
    /// Returns `None` when the quota is exhausted or the rule is inactive, outside its window
    /// or gone, otherwise the rule's per-customer limit. The updated row stays locked until the transaction ends.
    pub(crate) async fn claim_rule_use(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rule: RuleId,
    ) -> Result<Option<Option<u32>>, sqlx::Error> {
        let limit: Option<Option<i32>> = query_scalar(CLAIM_RULE_USE_SQL)
            .bind(rule.into_uuid())
            .fetch_optional(&mut **tx)
            .await?;

        limit
            .map(|limit| {
                limit
                    .map(|limit| try_u32("max_uses_per_customer", limit))
                    .transpose()
            })
            .transpose()
    }

    /// Whether the rule exists, is active and its window contains the transaction time.
    pub(crate) async fn rule_redeemable(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rule: RuleId,
    ) -> Result<bool, sqlx::Error> {
        let redeemable: Option<bool> = query_scalar(RULE_REDEEMABLE_SQL)
            .bind(rule.into_uuid())
            .fetch_optional(&mut **tx)
            .await?;

        Ok(redeemable.unwrap_or(false))
    }

    pub(crate) async fn count_customer_uses(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
        rule: RuleId,
    ) -> Result<u32, sqlx::Error> {
        let count: i64 = query_scalar(COUNT_CUSTOMER_USES_SQL)
            .bind(user.into_uuid())
            .bind(rule.into_uuid())
            .fetch_one(&mut **tx)
            .await?;

        u32::try_from(count).map_err(|e| decode_error("count", e))
    }

    /// Take `quantity` units of the rule's allocation for `product`; returns rows affected.
    pub(crate) async fn claim_gift_stock(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rule: RuleId,
        product: ProductId,
        quantity: u32,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(CLAIM_GIFT_STOCK_SQL)
            .bind(rule.into_uuid())
            .bind(product.into_uuid())
            .bind(try_i32("quantity", quantity)?)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    pub(crate) async fn create_usage(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: UsageId,
        user: UserId,
        rule: RuleId,
        product: ProductId,
        order: Option<OrderId>,
    ) -> Result<Timestamp, sqlx::Error> {
        let used_at: SqlxTimestamp = query_scalar(CREATE_USAGE_SQL)
            .bind(id.into_uuid())
            .bind(user.into_uuid())
            .bind(rule.into_uuid())
            .bind(product.into_uuid())
            .bind(order.map(OrderId::into_uuid))
            .fetch_one(&mut **tx)
            .await?;

        Ok(used_at.to_jiff())
    }

    pub(crate) async fn count_usages_by_rule(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
    ) -> Result<Vec<(RuleId, u32)>, sqlx::Error> {
        let rows: Vec<(Uuid, i64)> = query_as(COUNT_USAGES_BY_RULE_SQL)
            .bind(user.into_uuid())
            .fetch_all(&mut **tx)
            .await?;

        rows.into_iter()
            .map(|(rule, uses)| {
                u32::try_from(uses)
                    .map(|uses| (RuleId::from_uuid(rule), uses))
                    .map_err(|e| decode_error("uses", e))
            })
            .collect()
    }

    pub(crate) async fn list_usages(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
    ) -> Result<Vec<GiftRuleUsage>, sqlx::Error> {
        let rows: Vec<UsageRow> = query_as(LIST_USAGES_SQL)
            .bind(user.into_uuid())
            .fetch_all(&mut **tx)
            .await?;

        Ok(rows.into_iter().map(|row| row.0).collect())
    }
}

struct UsageRow(GiftRuleUsage);

impl<'r> FromRow<'r, PgRow> for UsageRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self(GiftRuleUsage {
            id: UsageId::from_uuid(row.try_get("uuid")?),
            user: UserId::from_uuid(row.try_get("user_uuid")?),
            rule: RuleId::from_uuid(row.try_get("gift_rule_uuid")?),
            product: ProductId::from_uuid(row.try_get("product_uuid")?),
            order: row
                .try_get::<Option<Uuid>, _>("order_uuid")?
                .map(OrderId::from_uuid),
            used_at: row.try_get::<SqlxTimestamp, _>("used_at")?.to_jiff(),
        }))
    }
}
