//! Cart Snapshots
//!
//! The read-only view of a cart that conditions are evaluated against.

use rustc_hash::FxHashSet;

use crate::ids::{CartLineId, CategoryId, ProductId, RuleId, UserId};

/// Catalog facts about the product on a cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartProduct {
    /// Unit price in minor units
    pub price: u64,

    /// Catalog category, if the product is categorised
    pub category: Option<CategoryId>,

    /// Catalog stock on hand
    pub stock: u32,
}

/// A single cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    /// Line identifier
    pub id: CartLineId,

    /// Product on this line
    pub product_id: ProductId,

    /// Units on this line
    pub quantity: u32,

    /// Whether this line is a free gift
    pub is_gift: bool,

    /// Rule that granted the gift, for gift lines
    pub gift_rule_id: Option<RuleId>,

    /// Catalog facts for the product
    pub product: CartProduct,
}

impl CartLine {
    /// Create a purchased (non-gift) line.
    #[must_use]
    pub fn purchased(product_id: ProductId, quantity: u32, product: CartProduct) -> Self {
        Self {
            id: CartLineId::new(),
            product_id,
            quantity,
            is_gift: false,
            gift_rule_id: None,
            product,
        }
    }

    /// Create a gift line granted by `rule`.
    #[must_use]
    pub fn gift(rule: RuleId, product_id: ProductId, quantity: u32, product: CartProduct) -> Self {
        Self {
            id: CartLineId::new(),
            product_id,
            quantity,
            is_gift: true,
            gift_rule_id: Some(rule),
            product,
        }
    }

    /// Price multiplied by quantity, in minor units.
    #[must_use]
    pub fn line_total(&self) -> u64 {
        self.product.price.saturating_mul(u64::from(self.quantity))
    }
}

/// Evaluation context for one customer's cart.
///
/// `subtotal` and `existing_gift_rule_ids` are derived once from the lines and cannot drift
/// from them.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    user: UserId,
    lines: Vec<CartLine>,
    subtotal: u64,
    existing_gift_rule_ids: FxHashSet<RuleId>,
}

impl EvaluationContext {
    /// Build a context from the cart lines of `user`.
    #[must_use]
    pub fn new(user: UserId, lines: Vec<CartLine>) -> Self {
        let subtotal = lines
            .iter()
            .filter(|line| !line.is_gift)
            .fold(0_u64, |total, line| total.saturating_add(line.line_total()));

        let existing_gift_rule_ids = lines
            .iter()
            .filter(|line| line.is_gift)
            .filter_map(|line| line.gift_rule_id)
            .collect();

        Self {
            user,
            lines,
            subtotal,
            existing_gift_rule_ids,
        }
    }

    /// Customer owning the cart.
    #[must_use]
    pub const fn user(&self) -> UserId {
        self.user
    }

    /// All cart lines, gifts included.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Sum of price × quantity over non-gift lines.
    #[must_use]
    pub const fn subtotal(&self) -> u64 {
        self.subtotal
    }

    /// Rules already represented by a gift line.
    #[must_use]
    pub const fn existing_gift_rule_ids(&self) -> &FxHashSet<RuleId> {
        &self.existing_gift_rule_ids
    }

    /// Whether a gift line for `rule` is already in the cart.
    #[must_use]
    pub fn has_gift_for(&self, rule: RuleId) -> bool {
        self.existing_gift_rule_ids.contains(&rule)
    }

    /// Non-gift lines.
    pub fn purchased_lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.iter().filter(|line| !line.is_gift)
    }

    /// Gift lines.
    pub fn gift_lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.iter().filter(|line| line.is_gift)
    }

    /// Whether a single non-gift line of `product` carries at least `min_quantity` units.
    #[must_use]
    pub fn has_purchased_quantity(&self, product: ProductId, min_quantity: u32) -> bool {
        self.purchased_lines()
            .any(|line| line.product_id == product && line.quantity >= min_quantity)
    }

    /// Whether any non-gift line belongs to `category`.
    #[must_use]
    pub fn has_category(&self, category: CategoryId) -> bool {
        self.purchased_lines()
            .any(|line| line.product.category == Some(category))
    }

    /// Summed price × quantity of non-gift lines in `category`.
    #[must_use]
    pub fn category_amount(&self, category: CategoryId) -> u64 {
        self.purchased_lines()
            .filter(|line| line.product.category == Some(category))
            .fold(0_u64, |total, line| total.saturating_add(line.line_total()))
    }

    /// Return a copy of this context with `line` appended.
    #[must_use]
    pub fn with_line(&self, line: CartLine) -> Self {
        let mut lines = self.lines.clone();

        lines.push(line);

        Self::new(self.user, lines)
    }

    /// Return a copy of this context without the line `id`.
    #[must_use]
    pub fn without_line(&self, id: CartLineId) -> Self {
        let lines = self
            .lines
            .iter()
            .filter(|line| line.id != id)
            .cloned()
            .collect();

        Self::new(self.user, lines)
    }
}
