//! Rule Fixtures

use jiff::Timestamp;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::{
    fixtures::{Fixture, FixtureError},
    rules::authoring::{ConditionDraft, GiftProductDraft, RuleDraft},
};

/// Wrapper for rules in YAML
#[derive(Debug, Deserialize)]
pub struct RulesFixture {
    /// Map of rule key -> rule fixture
    pub rules: FxHashMap<String, RuleFixture>,
}

/// Rule Fixture
#[derive(Debug, Deserialize)]
pub struct RuleFixture {
    /// Rule name
    pub name: String,

    /// Rule description
    #[serde(default)]
    pub description: Option<String>,

    /// Priority (1-100)
    pub priority: f64,

    /// Activation flag
    #[serde(default = "default_active")]
    pub active: bool,

    /// Root logic (`AND` / `OR`)
    #[serde(default)]
    pub logic: Option<String>,

    /// Top-level conditions
    #[serde(default)]
    pub conditions: Vec<ConditionFixture>,

    /// Gift products
    #[serde(default)]
    pub gifts: Vec<GiftFixture>,

    /// Per-customer limit
    #[serde(default)]
    pub max_uses_per_customer: Option<i64>,

    /// Global limit
    #[serde(default)]
    pub max_total_uses: Option<i64>,

    /// Redemptions already recorded
    #[serde(default)]
    pub current_total_uses: u32,

    /// Start of validity
    #[serde(default)]
    pub valid_from: Option<Timestamp>,

    /// End of validity
    #[serde(default)]
    pub valid_until: Option<Timestamp>,

    /// Creation time, used for priority tie-breaks
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

const fn default_active() -> bool {
    true
}

/// Condition Fixture
#[derive(Debug, Deserialize)]
pub struct ConditionFixture {
    /// Leaf type (e.g., `MIN_AMOUNT`)
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Group logic
    #[serde(default)]
    pub logic: Option<String>,

    /// Amount with currency (e.g., "100.00 GBP")
    #[serde(default)]
    pub amount: Option<String>,

    /// Product key
    #[serde(default)]
    pub product: Option<String>,

    /// Category key
    #[serde(default)]
    pub category: Option<String>,

    /// Minimum quantity
    #[serde(default)]
    pub min_quantity: Option<i64>,

    /// Minimum category spend with currency
    #[serde(default)]
    pub min_category_amount: Option<String>,

    /// Child conditions
    #[serde(default)]
    pub conditions: Vec<ConditionFixture>,
}

/// Gift Fixture
#[derive(Debug, Deserialize)]
pub struct GiftFixture {
    /// Product key
    pub product: String,

    /// Units per order
    #[serde(default)]
    pub max_quantity_per_order: Option<i64>,

    /// Rule-scoped stock
    #[serde(default)]
    pub remaining_stock: Option<i64>,
}

impl RuleFixture {
    /// Resolve fixture keys and prices into an authoring draft.
    ///
    /// # Errors
    ///
    /// Returns an error if a product or category key is unknown or an amount is malformed.
    pub fn to_draft(&self, fixture: &Fixture) -> Result<RuleDraft, FixtureError> {
        let conditions = self
            .conditions
            .iter()
            .map(|condition| condition.to_draft(fixture))
            .collect::<Result<_, _>>()?;

        let gift_products = self
            .gifts
            .iter()
            .map(|gift| {
                Ok(GiftProductDraft {
                    product: fixture.product_id(&gift.product)?,
                    max_quantity_per_order: gift.max_quantity_per_order,
                    remaining_stock: gift.remaining_stock,
                })
            })
            .collect::<Result<_, FixtureError>>()?;

        Ok(RuleDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            priority: self.priority,
            is_active: self.active,
            condition_logic: self.logic.clone(),
            conditions,
            gift_products,
            max_uses_per_customer: self.max_uses_per_customer,
            max_total_uses: self.max_total_uses,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
        })
    }
}

impl ConditionFixture {
    fn to_draft(&self, fixture: &Fixture) -> Result<ConditionDraft, FixtureError> {
        let amount = |value: Option<&str>| -> Result<Option<i64>, FixtureError> {
            value
                .map(|value| fixture.parse_amount(value))
                .transpose()
        };

        Ok(ConditionDraft {
            kind: self.kind.clone(),
            logic: self.logic.clone(),
            amount: amount(self.amount.as_deref())?,
            product: self
                .product
                .as_deref()
                .map(|key| fixture.product_id(key))
                .transpose()?,
            category: self
                .category
                .as_deref()
                .map(|key| fixture.category_id(key))
                .transpose()?,
            min_quantity: self.min_quantity,
            min_category_amount: amount(self.min_category_amount.as_deref())?,
            conditions: self
                .conditions
                .iter()
                .map(|condition| condition.to_draft(fixture))
                .collect::<Result<_, _>>()?,
        })
    }
}
