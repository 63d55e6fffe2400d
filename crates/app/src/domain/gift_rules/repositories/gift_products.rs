//! Gift Products Repository

use gifting::{
    ids::{ProductId, RuleId},
    rules::GiftProduct,
};
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as};
use uuid::Uuid;

use crate::database::{try_i32, try_u32};

const CREATE_GIFT_PRODUCT_SQL: &str = include_str!("sql/create_gift_product.sql");
const DELETE_GIFT_PRODUCTS_SQL: &str = include_str!("sql/delete_gift_products.sql");
const LIST_GIFT_PRODUCTS_SQL: &str = include_str!("sql/list_gift_products.sql");

#[derive(Debug, Clone)]
pub(crate) struct StoredGiftProduct {
    pub(crate) rule: RuleId,
    pub(crate) gift: GiftProduct,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PgGiftProductsRepository;

impl PgGiftProductsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn create_gift_products(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rule: RuleId,
        gifts: &[GiftProduct],
    ) -> Result<(), sqlx::Error> {
        for (position, gift) in (0_i32..).zip(gifts) {
            query(CREATE_GIFT_PRODUCT_SQL)
                .bind(rule.into_uuid())
                .bind(gift.product_id.into_uuid())
                .bind(position)
                .bind(try_i32("max_quantity_per_order", gift.max_quantity_per_order)?)
                .bind(
                    gift.remaining_stock
                        .map(|stock| try_i32("remaining_stock", stock))
                        .transpose()?,
                )
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    pub(crate) async fn delete_gift_products(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rule: RuleId,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(DELETE_GIFT_PRODUCTS_SQL)
            .bind(rule.into_uuid())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    /// Gift products of every listed rule, in declaration order per rule.
    pub(crate) async fn list_gift_products(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rules: &[RuleId],
    ) -> Result<Vec<StoredGiftProduct>, sqlx::Error> {
        let uuids: Vec<Uuid> = rules.iter().copied().map(RuleId::into_uuid).collect();

        query_as::<Postgres, StoredGiftProduct>(LIST_GIFT_PRODUCTS_SQL)
            .bind(uuids)
            .fetch_all(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for StoredGiftProduct {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            rule: RuleId::from_uuid(row.try_get("gift_rule_uuid")?),
            gift: GiftProduct {
                product_id: ProductId::from_uuid(row.try_get("product_uuid")?),
                max_quantity_per_order: try_u32(
                    "max_quantity_per_order",
                    row.try_get("max_quantity_per_order")?,
                )?,
                remaining_stock: row
                    .try_get::<Option<i32>, _>("remaining_stock")?
                    .map(|stock| try_u32("remaining_stock", stock))
                    .transpose()?,
            },
        })
    }
}
