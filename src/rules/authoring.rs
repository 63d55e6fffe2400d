//! Rule Authoring
//!
//! Untrusted rule definitions arrive as a [`RuleDraft`] and are validated field by field into a
//! [`NewGiftRule`] before anything is persisted.

use std::fmt;

use jiff::Timestamp;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    conditions::{BoolOp, Condition, ConditionGroup, ConditionKind, Leaf},
    ids::{CategoryId, ProductId, RuleId},
    rules::{GiftProduct, GiftRule, Priority, Quota, ValidityWindow},
};

/// Rule definition as submitted by an author.
///
/// Amounts are minor units. Numeric fields are deliberately wide so out-of-range input is
/// reported as a validation error rather than a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    /// Display name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Priority, must be an integer in `1..=100`
    pub priority: f64,

    /// Activation flag
    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Root-level combinator (`AND` or `OR`)
    #[serde(default)]
    pub condition_logic: Option<String>,

    /// Top-level conditions
    #[serde(default)]
    pub conditions: Vec<ConditionDraft>,

    /// Gift products
    #[serde(default)]
    pub gift_products: Vec<GiftProductDraft>,

    /// Per-customer redemption limit
    #[serde(default)]
    pub max_uses_per_customer: Option<i64>,

    /// Global redemption limit
    #[serde(default)]
    pub max_total_uses: Option<i64>,

    /// Start of validity
    #[serde(default)]
    pub valid_from: Option<Timestamp>,

    /// End of validity
    #[serde(default)]
    pub valid_until: Option<Timestamp>,
}

const fn default_active() -> bool {
    true
}

/// Condition node as submitted by an author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionDraft {
    /// Leaf type; ignored when `conditions` is non-empty
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Group logic for child conditions
    #[serde(default)]
    pub logic: Option<String>,

    /// `min_amount` threshold
    #[serde(default)]
    pub amount: Option<i64>,

    /// Product for product conditions
    #[serde(default)]
    pub product: Option<ProductId>,

    /// Category for category conditions
    #[serde(default)]
    pub category: Option<CategoryId>,

    /// Minimum quantity for product conditions
    #[serde(default)]
    pub min_quantity: Option<i64>,

    /// Minimum category spend
    #[serde(default)]
    pub min_category_amount: Option<i64>,

    /// Child conditions
    #[serde(default)]
    pub conditions: Vec<ConditionDraft>,
}

/// Gift product as submitted by an author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftProductDraft {
    /// Catalog product
    pub product: ProductId,

    /// Units per order, defaults to 1
    #[serde(default)]
    pub max_quantity_per_order: Option<i64>,

    /// Rule-scoped stock cap
    #[serde(default)]
    pub remaining_stock: Option<i64>,
}

/// Validated rule ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGiftRule {
    /// Trimmed display name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Ordering weight
    pub priority: Priority,

    /// Activation flag
    pub is_active: bool,

    /// Condition tree
    pub conditions: ConditionGroup,

    /// Usage limits, with no recorded uses
    pub quota: Quota,

    /// Validity bounds
    pub window: ValidityWindow,

    /// Gift products
    pub gift_products: SmallVec<[GiftProduct; 2]>,
}

impl NewGiftRule {
    /// Assign an identity, producing a rule with no recorded redemptions.
    #[must_use]
    pub fn into_rule(self, id: RuleId, created_at: Timestamp) -> GiftRule {
        GiftRule {
            id,
            name: self.name,
            description: self.description,
            priority: self.priority,
            is_active: self.is_active,
            conditions: self.conditions,
            quota: self.quota,
            window: self.window,
            gift_products: self.gift_products,
            created_at,
        }
    }

    /// Check the new limits against a rule that already has `used` redemptions.
    ///
    /// # Errors
    ///
    /// Returns [`AuthoringError::Invalid`] when `max_total_uses` is below `used`.
    pub fn check_recorded_uses(&self, used: u32) -> Result<(), AuthoringError> {
        match self.quota.max_total_uses {
            Some(limit) if limit < used => {
                let mut errors = RuleValidationErrors::default();

                errors.push(
                    "max_total_uses",
                    RuleValidationError::LimitBelowUsage { used },
                );

                Err(AuthoringError::Invalid(errors))
            }
            _ => Ok(()),
        }
    }
}

/// A single field-level problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleValidationError {
    /// Name is empty after trimming.
    #[error("name must not be empty")]
    EmptyName,

    /// Priority has a fractional part or is not finite.
    #[error("priority must be an integer")]
    PriorityNotInteger,

    /// Priority is outside `1..=100`.
    #[error("priority must be between {min} and {max}", min = Priority::MIN, max = Priority::MAX)]
    PriorityOutOfRange,

    /// No conditions were given.
    #[error("at least one condition is required")]
    NoConditions,

    /// No gift products were given.
    #[error("at least one gift product is required")]
    NoGiftProducts,

    /// Leaf without a type.
    #[error("condition type is required")]
    MissingConditionType,

    /// Leaf type is not recognised.
    #[error("unknown condition type {0:?}")]
    UnknownConditionType(String),

    /// Logic is not `AND` or `OR`.
    #[error("unknown condition logic {0:?}")]
    UnknownLogic(String),

    /// A field required by the condition type is missing.
    #[error("{kind} condition requires this field")]
    MissingField {
        /// Condition type
        kind: ConditionKind,
    },

    /// Amount is zero or negative.
    #[error("amount must be positive")]
    NonPositiveAmount,

    /// Quantity is zero or negative.
    #[error("quantity must be positive")]
    NonPositiveQuantity,

    /// Bounds are not strictly ordered.
    #[error("valid_from must be before valid_until")]
    InvalidWindow,

    /// Quota is zero or negative.
    #[error("quota must be positive")]
    NonPositiveQuota,

    /// `max_total_uses` would fall below the redemptions already recorded.
    #[error("max_total_uses is below the {used} redemptions already recorded")]
    LimitBelowUsage {
        /// Recorded redemptions
        used: u32,
    },

    /// Stock is negative.
    #[error("remaining stock must not be negative")]
    NegativeStock,

    /// A numeric value does not fit its storage type.
    #[error("value is too large")]
    TooLarge,

    /// The same product is listed twice as a gift.
    #[error("gift product {0} is listed more than once")]
    DuplicateGiftProduct(ProductId),

    /// The gift product does not exist in the catalog.
    #[error("gift product {0} does not exist")]
    UnresolvedGiftProduct(ProductId),
}

/// A validation error tied to the field that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted field path, e.g. `conditions[0].amount`
    pub field: String,

    /// The problem
    pub error: RuleValidationError,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.error)
    }
}

/// Every field-level problem found in a draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
pub struct RuleValidationErrors(pub Vec<FieldError>);

impl RuleValidationErrors {
    fn push(&mut self, field: impl Into<String>, error: RuleValidationError) {
        self.0.push(FieldError {
            field: field.into(),
            error,
        });
    }

    /// Whether any error was recorded for `field`.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|error| error.field == field)
    }

    /// Whether `error` was recorded for any field.
    #[must_use]
    pub fn contains(&self, error: &RuleValidationError) -> bool {
        self.0.iter().any(|field| &field.error == error)
    }

    /// Recorded errors.
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }
}

impl fmt::Display for RuleValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(ToString::to_string).collect();

        write!(f, "invalid gift rule: {}", rendered.join(", "))
    }
}

/// A condition referencing something the catalog does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissingReference {
    /// Unknown product.
    Product(ProductId),

    /// Unknown category.
    Category(CategoryId),
}

impl fmt::Display for MissingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product(product) => write!(f, "product {product}"),
            Self::Category(category) => write!(f, "category {category}"),
        }
    }
}

/// Authoring failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthoringError {
    /// The draft is malformed.
    #[error(transparent)]
    Invalid(#[from] RuleValidationErrors),

    /// A condition references a product or category that does not exist.
    #[error("{0} not found")]
    NotFound(MissingReference),
}

/// Lookup of catalog references during validation.
pub trait ReferenceResolver {
    /// Whether `product` exists.
    fn product_exists(&self, product: ProductId) -> bool;

    /// Whether `category` exists.
    fn category_exists(&self, category: CategoryId) -> bool;
}

/// A resolver over pre-fetched sets of known identifiers.
#[derive(Debug, Clone, Default)]
pub struct KnownReferences {
    /// Products known to exist
    pub products: FxHashSet<ProductId>,

    /// Categories known to exist
    pub categories: FxHashSet<CategoryId>,
}

impl ReferenceResolver for KnownReferences {
    fn product_exists(&self, product: ProductId) -> bool {
        self.products.contains(&product)
    }

    fn category_exists(&self, category: CategoryId) -> bool {
        self.categories.contains(&category)
    }
}

impl RuleDraft {
    /// Every product the draft refers to, gifts included.
    #[must_use]
    pub fn referenced_products(&self) -> FxHashSet<ProductId> {
        let mut products: FxHashSet<ProductId> =
            self.gift_products.iter().map(|gift| gift.product).collect();

        walk_drafts(&self.conditions, &mut |draft| {
            products.extend(draft.product);
        });

        products
    }

    /// Every category the draft refers to.
    #[must_use]
    pub fn referenced_categories(&self) -> FxHashSet<CategoryId> {
        let mut categories = FxHashSet::default();

        walk_drafts(&self.conditions, &mut |draft| {
            categories.extend(draft.category);
        });

        categories
    }

    /// Validate the draft into a rule that can be stored.
    ///
    /// Structural problems are collected for every field before returning. Reference checks
    /// run only on a structurally valid draft.
    ///
    /// # Errors
    ///
    /// Returns [`AuthoringError::Invalid`] with every field problem, or
    /// [`AuthoringError::NotFound`] for the first condition reference the resolver does not
    /// know.
    pub fn validate(
        &self,
        resolver: &impl ReferenceResolver,
    ) -> Result<NewGiftRule, AuthoringError> {
        let mut errors = RuleValidationErrors::default();

        let name = self.name.trim();

        if name.is_empty() {
            errors.push("name", RuleValidationError::EmptyName);
        }

        let priority = validate_priority(self.priority, &mut errors);

        let root_op = parse_logic(
            self.condition_logic.as_deref(),
            "condition_logic",
            &mut errors,
        );

        if self.conditions.is_empty() {
            errors.push("conditions", RuleValidationError::NoConditions);
        }

        let children = validate_conditions(&self.conditions, "conditions", &mut errors);

        let window = match ValidityWindow::new(self.valid_from, self.valid_until) {
            Ok(window) => Some(window),
            Err(_invalid) => {
                errors.push("valid_from", RuleValidationError::InvalidWindow);

                None
            }
        };

        let quota = Quota {
            max_uses_per_customer: validate_quota(
                self.max_uses_per_customer,
                "max_uses_per_customer",
                &mut errors,
            ),
            max_total_uses: validate_quota(self.max_total_uses, "max_total_uses", &mut errors),
            current_total_uses: 0,
        };

        let gift_products = self.validate_gift_products(resolver, &mut errors);

        if !errors.0.is_empty() {
            return Err(AuthoringError::Invalid(errors));
        }

        let missing = walk_missing(&self.conditions, resolver);

        if let Some(reference) = missing {
            return Err(AuthoringError::NotFound(reference));
        }

        let (Some(priority), Some(root_op), Some(children), Some(window)) =
            (priority, root_op, children, window)
        else {
            return Err(AuthoringError::Invalid(errors));
        };

        Ok(NewGiftRule {
            name: name.to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|description| !description.is_empty())
                .map(ToString::to_string),
            priority,
            is_active: self.is_active,
            conditions: ConditionGroup::new(root_op, children),
            quota,
            window,
            gift_products,
        })
    }

    fn validate_gift_products(
        &self,
        resolver: &impl ReferenceResolver,
        errors: &mut RuleValidationErrors,
    ) -> SmallVec<[GiftProduct; 2]> {
        if self.gift_products.is_empty() {
            errors.push("gift_products", RuleValidationError::NoGiftProducts);
        }

        let mut seen = FxHashSet::default();
        let mut gifts = SmallVec::with_capacity(self.gift_products.len());

        for (index, draft) in self.gift_products.iter().enumerate() {
            let field = format!("gift_products[{index}]");

            if !seen.insert(draft.product) {
                errors.push(
                    format!("{field}.product"),
                    RuleValidationError::DuplicateGiftProduct(draft.product),
                );
            }

            if !resolver.product_exists(draft.product) {
                errors.push(
                    format!("{field}.product"),
                    RuleValidationError::UnresolvedGiftProduct(draft.product),
                );
            }

            let max_quantity_per_order = match draft.max_quantity_per_order {
                None => Some(1),
                Some(quantity) => positive_u32(
                    quantity,
                    &format!("{field}.max_quantity_per_order"),
                    RuleValidationError::NonPositiveQuantity,
                    errors,
                ),
            };

            let remaining_stock = match draft.remaining_stock {
                None => Some(None),
                Some(stock) if stock < 0 => {
                    errors.push(
                        format!("{field}.remaining_stock"),
                        RuleValidationError::NegativeStock,
                    );

                    None
                }
                Some(stock) => {
                    stored_count(stock, &format!("{field}.remaining_stock"), errors).map(Some)
                }
            };

            if let (Some(max_quantity_per_order), Some(remaining_stock)) =
                (max_quantity_per_order, remaining_stock)
            {
                gifts.push(GiftProduct {
                    product_id: draft.product,
                    max_quantity_per_order,
                    remaining_stock,
                });
            }
        }

        gifts
    }
}

fn walk_drafts(drafts: &[ConditionDraft], visit: &mut impl FnMut(&ConditionDraft)) {
    for draft in drafts {
        visit(draft);
        walk_drafts(&draft.conditions, visit);
    }
}

fn walk_missing(
    drafts: &[ConditionDraft],
    resolver: &impl ReferenceResolver,
) -> Option<MissingReference> {
    drafts.iter().find_map(|draft| {
        if !draft.conditions.is_empty() {
            return walk_missing(&draft.conditions, resolver);
        }

        if let Some(product) = draft.product
            && !resolver.product_exists(product)
        {
            return Some(MissingReference::Product(product));
        }

        if let Some(category) = draft.category
            && !resolver.category_exists(category)
        {
            return Some(MissingReference::Category(category));
        }

        None
    })
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "the value is checked to be an integer within 1..=100 before the cast"
)]
fn validate_priority(priority: f64, errors: &mut RuleValidationErrors) -> Option<Priority> {
    if !priority.is_finite() || priority.fract() != 0.0 {
        errors.push("priority", RuleValidationError::PriorityNotInteger);

        return None;
    }

    if !(f64::from(Priority::MIN)..=f64::from(Priority::MAX)).contains(&priority) {
        errors.push("priority", RuleValidationError::PriorityOutOfRange);

        return None;
    }

    Priority::try_from(priority as i64).ok()
}

fn parse_logic(
    logic: Option<&str>,
    field: &str,
    errors: &mut RuleValidationErrors,
) -> Option<BoolOp> {
    let Some(logic) = logic else {
        return Some(BoolOp::And);
    };

    match logic.parse() {
        Ok(op) => Some(op),
        Err(_unknown) => {
            errors.push(field, RuleValidationError::UnknownLogic(logic.to_string()));

            None
        }
    }
}

fn validate_quota(
    value: Option<i64>,
    field: &str,
    errors: &mut RuleValidationErrors,
) -> Option<u32> {
    let value = value?;

    if value <= 0 {
        errors.push(field, RuleValidationError::NonPositiveQuota);

        return None;
    }

    stored_count(value, field, errors)
}

fn positive_u32(
    value: i64,
    field: &str,
    non_positive: RuleValidationError,
    errors: &mut RuleValidationErrors,
) -> Option<u32> {
    if value <= 0 {
        errors.push(field, non_positive);

        return None;
    }

    stored_count(value, field, errors)
}

/// A non-negative count bounded by the store's 32-bit signed columns.
fn stored_count(value: i64, field: &str, errors: &mut RuleValidationErrors) -> Option<u32> {
    match i32::try_from(value) {
        Ok(value) => Some(value.unsigned_abs()),
        Err(_overflow) => {
            errors.push(field, RuleValidationError::TooLarge);

            None
        }
    }
}

fn positive_u64(value: i64, field: &str, errors: &mut RuleValidationErrors) -> Option<u64> {
    if value <= 0 {
        errors.push(field, RuleValidationError::NonPositiveAmount);

        return None;
    }

    u64::try_from(value).ok()
}

fn validate_conditions(
    drafts: &[ConditionDraft],
    path: &str,
    errors: &mut RuleValidationErrors,
) -> Option<SmallVec<[Condition; 2]>> {
    let mut nodes = SmallVec::with_capacity(drafts.len());
    let mut complete = true;

    for (index, draft) in drafts.iter().enumerate() {
        match validate_condition(draft, &format!("{path}[{index}]"), errors) {
            Some(node) => nodes.push(node),
            None => complete = false,
        }
    }

    complete.then_some(nodes)
}

fn validate_condition(
    draft: &ConditionDraft,
    path: &str,
    errors: &mut RuleValidationErrors,
) -> Option<Condition> {
    if !draft.conditions.is_empty() {
        let op = parse_logic(draft.logic.as_deref(), &format!("{path}.logic"), errors);
        let children =
            validate_conditions(&draft.conditions, &format!("{path}.conditions"), errors);

        return Some(Condition::Group(ConditionGroup::new(op?, children?)));
    }

    let Some(kind) = draft.kind.as_deref() else {
        errors.push(
            format!("{path}.type"),
            RuleValidationError::MissingConditionType,
        );

        return None;
    };

    let Ok(kind) = kind.parse::<ConditionKind>() else {
        errors.push(
            format!("{path}.type"),
            RuleValidationError::UnknownConditionType(kind.to_string()),
        );

        return None;
    };

    let mut require = |present: bool, field: &str| {
        if !present {
            errors.push(
                format!("{path}.{field}"),
                RuleValidationError::MissingField { kind },
            );
        }

        present
    };

    match kind {
        ConditionKind::MinAmount => {
            require(draft.amount.is_some(), "amount");

            let amount = positive_u64(draft.amount?, &format!("{path}.amount"), errors)?;

            Some(Condition::Leaf(Leaf::MinAmount { amount }))
        }
        ConditionKind::SpecificProduct | ConditionKind::ProductQuantity => {
            require(draft.product.is_some(), "product");

            let min_quantity = match draft.min_quantity {
                None => Some(1),
                Some(quantity) => positive_u32(
                    quantity,
                    &format!("{path}.min_quantity"),
                    RuleValidationError::NonPositiveQuantity,
                    errors,
                ),
            };

            let product = draft.product?;
            let min_quantity = min_quantity?;

            Some(Condition::Leaf(if kind == ConditionKind::SpecificProduct {
                Leaf::SpecificProduct {
                    product,
                    min_quantity,
                }
            } else {
                Leaf::ProductQuantity {
                    product,
                    min_quantity,
                }
            }))
        }
        ConditionKind::ProductCategory => {
            require(draft.category.is_some(), "category");

            let min_category_amount = match draft.min_category_amount {
                None => Some(None),
                Some(amount) => {
                    positive_u64(amount, &format!("{path}.min_category_amount"), errors).map(Some)
                }
            };

            Some(Condition::Leaf(Leaf::ProductCategory {
                category: draft.category?,
                min_category_amount: min_category_amount?,
            }))
        }
    }
}
