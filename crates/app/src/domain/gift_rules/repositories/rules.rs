//! Gift Rules Repository

use std::str::FromStr;

use gifting::{
    conditions::BoolOp,
    ids::RuleId,
    rules::{Priority, Quota, ValidityWindow, authoring::NewGiftRule},
};
use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{
    FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as, query_scalar,
};

use crate::database::{decode_error, try_i32, try_u32};

const CREATE_GIFT_RULE_SQL: &str = include_str!("sql/create_gift_rule.sql");
const UPDATE_GIFT_RULE_SQL: &str = include_str!("sql/update_gift_rule.sql");
const LOCK_GIFT_RULE_SQL: &str = include_str!("sql/lock_gift_rule.sql");
const SET_GIFT_RULE_ACTIVE_SQL: &str = include_str!("sql/set_gift_rule_active.sql");
const DELETE_GIFT_RULE_SQL: &str = include_str!("sql/delete_gift_rule.sql");
const GET_GIFT_RULE_SQL: &str = include_str!("sql/get_gift_rule.sql");
const LIST_GIFT_RULES_SQL: &str = include_str!("sql/list_gift_rules.sql");

/// A `gift_rules` row without its conditions and gift products.
#[derive(Debug, Clone)]
pub(crate) struct GiftRuleRow {
    pub(crate) id: RuleId,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) priority: Priority,
    pub(crate) is_active: bool,
    pub(crate) condition_logic: BoolOp,
    pub(crate) quota: Quota,
    pub(crate) window: ValidityWindow,
    pub(crate) created_at: Timestamp,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PgGiftRulesRepository;

impl PgGiftRulesRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    /// Insert the rule row and return its creation time.
    pub(crate) async fn create_rule(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: RuleId,
        rule: &NewGiftRule,
    ) -> Result<Timestamp, sqlx::Error> {
        let (created_at,) = bind_rule(
            query_as::<Postgres, (SqlxTimestamp,)>(CREATE_GIFT_RULE_SQL),
            id,
            rule,
        )?
        .fetch_one(&mut **tx)
        .await?;

        Ok(created_at.to_jiff())
    }

    /// Lock the rule row until the transaction ends and return its recorded uses.
    pub(crate) async fn lock_total_uses(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: RuleId,
    ) -> Result<u32, sqlx::Error> {
        let current_total_uses: i32 = query_scalar(LOCK_GIFT_RULE_SQL)
            .bind(id.into_uuid())
            .fetch_one(&mut **tx)
            .await?;

        try_u32("current_total_uses", current_total_uses)
    }

    /// Overwrite the rule row, returning its creation time and current usage count.
    pub(crate) async fn update_rule(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: RuleId,
        rule: &NewGiftRule,
    ) -> Result<(Timestamp, u32), sqlx::Error> {
        let (created_at, current_total_uses) = bind_rule(
            query_as::<Postgres, (SqlxTimestamp, i32)>(UPDATE_GIFT_RULE_SQL),
            id,
            rule,
        )?
        .fetch_one(&mut **tx)
        .await?;

        Ok((
            created_at.to_jiff(),
            try_u32("current_total_uses", current_total_uses)?,
        ))
    }

    pub(crate) async fn set_active(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: RuleId,
        is_active: bool,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(SET_GIFT_RULE_ACTIVE_SQL)
            .bind(id.into_uuid())
            .bind(is_active)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    pub(crate) async fn delete_rule(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: RuleId,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(DELETE_GIFT_RULE_SQL)
            .bind(id.into_uuid())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    pub(crate) async fn get_rule(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: RuleId,
    ) -> Result<GiftRuleRow, sqlx::Error> {
        query_as::<Postgres, GiftRuleRow>(GET_GIFT_RULE_SQL)
            .bind(id.into_uuid())
            .fetch_one(&mut **tx)
            .await
    }

    /// Rules ordered by priority, then creation time.
    pub(crate) async fn list_rules(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        active_only: bool,
    ) -> Result<Vec<GiftRuleRow>, sqlx::Error> {
        query_as::<Postgres, GiftRuleRow>(LIST_GIFT_RULES_SQL)
            .bind(active_only)
            .fetch_all(&mut **tx)
            .await
    }
}

type RuleQuery<'q, O> = sqlx::query::QueryAs<'q, Postgres, O, sqlx::postgres::PgArguments>;

fn bind_rule<'q, O>(
    statement: RuleQuery<'q, O>,
    id: RuleId,
    rule: &'q NewGiftRule,
) -> Result<RuleQuery<'q, O>, sqlx::Error> {
    let max_uses_per_customer = rule
        .quota
        .max_uses_per_customer
        .map(|limit| try_i32("max_uses_per_customer", limit))
        .transpose()?;

    let max_total_uses = rule
        .quota
        .max_total_uses
        .map(|limit| try_i32("max_total_uses", limit))
        .transpose()?;

    Ok(statement
        .bind(id.into_uuid())
        .bind(rule.name.as_str())
        .bind(rule.description.as_deref())
        .bind(i32::from(rule.priority.get()))
        .bind(rule.is_active)
        .bind(rule.conditions.op.as_str())
        .bind(max_uses_per_customer)
        .bind(max_total_uses)
        .bind(rule.window.valid_from().map(SqlxTimestamp::from))
        .bind(rule.window.valid_until().map(SqlxTimestamp::from)))
}

impl<'r> FromRow<'r, PgRow> for GiftRuleRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let priority: i32 = row.try_get("priority")?;
        let priority =
            Priority::try_from(i64::from(priority)).map_err(|e| decode_error("priority", e))?;

        let condition_logic: String = row.try_get("condition_logic")?;
        let condition_logic =
            BoolOp::from_str(&condition_logic).map_err(|e| decode_error("condition_logic", e))?;

        let quota = Quota {
            max_uses_per_customer: row
                .try_get::<Option<i32>, _>("max_uses_per_customer")?
                .map(|limit| try_u32("max_uses_per_customer", limit))
                .transpose()?,
            max_total_uses: row
                .try_get::<Option<i32>, _>("max_total_uses")?
                .map(|limit| try_u32("max_total_uses", limit))
                .transpose()?,
            current_total_uses: try_u32(
                "current_total_uses",
                row.try_get("current_total_uses")?,
            )?,
        };

        let window = ValidityWindow::new(
            row.try_get::<Option<SqlxTimestamp>, _>("valid_from")?
                .map(SqlxTimestamp::to_jiff),
            row.try_get::<Option<SqlxTimestamp>, _>("valid_until")?
                .map(SqlxTimestamp::to_jiff),
        )
        .map_err(|e| decode_error("valid_until", e))?;

        Ok(Self {
            id: RuleId::from_uuid(row.try_get("uuid")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            priority,
            is_active: row.try_get("is_active")?,
            condition_logic,
            quota,
            window,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
        })
    }
}
