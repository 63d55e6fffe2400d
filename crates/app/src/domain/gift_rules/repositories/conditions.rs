//! Conditions Repository

use std::str::FromStr;

use gifting::{
    conditions::{BoolOp, ConditionKind, rows::ConditionRow},
    ids::{CategoryId, ConditionId, ProductId, RuleId},
};
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as};
use uuid::Uuid;

use crate::database::{decode_error, try_i32, try_i64, try_u32, try_u64};

const CREATE_CONDITION_SQL: &str = include_str!("sql/create_condition.sql");
const DELETE_CONDITIONS_SQL: &str = include_str!("sql/delete_conditions.sql");
const LIST_CONDITIONS_SQL: &str = include_str!("sql/list_conditions.sql");

/// A stored condition row with the rule it belongs to.
#[derive(Debug, Clone)]
pub(crate) struct StoredCondition {
    pub(crate) rule: RuleId,
    pub(crate) row: ConditionRow,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PgConditionsRepository;

impl PgConditionsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    /// Insert flattened rows; parents must precede their children.
    pub(crate) async fn create_conditions(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rule: RuleId,
        rows: &[ConditionRow],
    ) -> Result<(), sqlx::Error> {
        for row in rows {
            query(CREATE_CONDITION_SQL)
                .bind(row.id.into_uuid())
                .bind(rule.into_uuid())
                .bind(row.parent.map(ConditionId::into_uuid))
                .bind(try_i32("position", row.position)?)
                .bind(row.kind.map(ConditionKind::as_str))
                .bind(row.logic.map(BoolOp::as_str))
                .bind(row.amount.map(|amount| try_i64("amount", amount)).transpose()?)
                .bind(row.product.map(ProductId::into_uuid))
                .bind(row.category.map(CategoryId::into_uuid))
                .bind(
                    row.min_quantity
                        .map(|quantity| try_i32("min_quantity", quantity))
                        .transpose()?,
                )
                .bind(
                    row.min_category_amount
                        .map(|amount| try_i64("min_category_amount", amount))
                        .transpose()?,
                )
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    pub(crate) async fn delete_conditions(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rule: RuleId,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(DELETE_CONDITIONS_SQL)
            .bind(rule.into_uuid())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    /// Condition rows of every listed rule, in no particular order.
    pub(crate) async fn list_conditions(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rules: &[RuleId],
    ) -> Result<Vec<StoredCondition>, sqlx::Error> {
        let uuids: Vec<Uuid> = rules.iter().copied().map(RuleId::into_uuid).collect();

        query_as::<Postgres, StoredCondition>(LIST_CONDITIONS_SQL)
            .bind(uuids)
            .fetch_all(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for StoredCondition {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let kind = row
            .try_get::<Option<String>, _>("kind")?
            .map(|kind| ConditionKind::from_str(&kind).map_err(|e| decode_error("kind", e)))
            .transpose()?;

        let logic = row
            .try_get::<Option<String>, _>("logic")?
            .map(|logic| BoolOp::from_str(&logic).map_err(|e| decode_error("logic", e)))
            .transpose()?;

        Ok(Self {
            rule: RuleId::from_uuid(row.try_get("gift_rule_uuid")?),
            row: ConditionRow {
                id: ConditionId::from_uuid(row.try_get("uuid")?),
                parent: row
                    .try_get::<Option<Uuid>, _>("parent_uuid")?
                    .map(ConditionId::from_uuid),
                position: try_u32("position", row.try_get("position")?)?,
                kind,
                logic,
                amount: row
                    .try_get::<Option<i64>, _>("amount")?
                    .map(|amount| try_u64("amount", amount))
                    .transpose()?,
                product: row
                    .try_get::<Option<Uuid>, _>("product_uuid")?
                    .map(ProductId::from_uuid),
                category: row
                    .try_get::<Option<Uuid>, _>("category_uuid")?
                    .map(CategoryId::from_uuid),
                min_quantity: row
                    .try_get::<Option<i32>, _>("min_quantity")?
                    .map(|quantity| try_u32("min_quantity", quantity))
                    .transpose()?,
                min_category_amount: row
                    .try_get::<Option<i64>, _>("min_category_amount")?
                    .map(|amount| try_u64("min_category_amount", amount))
                    .transpose()?,
            },
        })
    }
}
