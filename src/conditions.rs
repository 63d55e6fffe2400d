//! Gift Conditions
//!
//! Nested boolean condition trees evaluated against a cart snapshot. Evaluation is a pure
//! function of the [`EvaluationContext`]; nothing here performs I/O.

use std::{fmt, str::FromStr};

use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    cart::EvaluationContext,
    ids::{CategoryId, ProductId},
};

pub mod rows;

/// Boolean operation used to combine child conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    /// All child conditions must hold.
    And,

    /// At least one child condition must hold.
    Or,
}

impl BoolOp {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

impl fmt::Display for BoolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised condition logic or kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what}: {value}")]
pub struct UnknownValue {
    /// What was being parsed
    pub what: &'static str,

    /// The rejected input
    pub value: String,
}

impl FromStr for BoolOp {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            _ => Err(UnknownValue {
                what: "condition logic",
                value: s.to_string(),
            }),
        }
    }
}

/// Leaf condition type, preserved as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    /// Cart subtotal must reach an amount.
    MinAmount,

    /// A product must be in the cart with a minimum quantity.
    SpecificProduct,

    /// A product from a category must be in the cart, optionally with a minimum spend.
    ProductCategory,

    /// A product must be in the cart with a minimum quantity.
    ///
    /// Shares its predicate with [`ConditionKind::SpecificProduct`]; kept distinct so stored
    /// data keeps its original type.
    ProductQuantity,
}

impl ConditionKind {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MinAmount => "min_amount",
            Self::SpecificProduct => "specific_product",
            Self::ProductCategory => "product_category",
            Self::ProductQuantity => "product_quantity",
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionKind {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min_amount" => Ok(Self::MinAmount),
            "specific_product" => Ok(Self::SpecificProduct),
            "product_category" => Ok(Self::ProductCategory),
            "product_quantity" => Ok(Self::ProductQuantity),
            _ => Err(UnknownValue {
                what: "condition type",
                value: s.to_string(),
            }),
        }
    }
}

/// Leaf predicate with its type-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leaf {
    /// Subtotal of non-gift lines must be at least `amount` (minor units).
    MinAmount {
        /// Threshold in minor units
        amount: u64,
    },

    /// A non-gift line of `product` with at least `min_quantity` units.
    SpecificProduct {
        /// Required product
        product: ProductId,

        /// Minimum units on a single line
        min_quantity: u32,
    },

    /// A non-gift line in `category`, optionally with a minimum summed spend.
    ProductCategory {
        /// Required category
        category: CategoryId,

        /// Minimum spend across the category in minor units
        min_category_amount: Option<u64>,
    },

    /// A non-gift line of `product` with at least `min_quantity` units.
    ProductQuantity {
        /// Required product
        product: ProductId,

        /// Minimum units on a single line
        min_quantity: u32,
    },
}

impl Leaf {
    /// Stored condition type of this leaf.
    #[must_use]
    pub const fn kind(&self) -> ConditionKind {
        match self {
            Self::MinAmount { .. } => ConditionKind::MinAmount,
            Self::SpecificProduct { .. } => ConditionKind::SpecificProduct,
            Self::ProductCategory { .. } => ConditionKind::ProductCategory,
            Self::ProductQuantity { .. } => ConditionKind::ProductQuantity,
        }
    }

    /// Evaluate the leaf against a cart.
    #[must_use]
    pub fn matches(&self, context: &EvaluationContext) -> bool {
        match self {
            Self::MinAmount { amount } => context.subtotal() >= *amount,
            Self::SpecificProduct {
                product,
                min_quantity,
            }
            | Self::ProductQuantity {
                product,
                min_quantity,
            } => context.has_purchased_quantity(*product, *min_quantity),
            Self::ProductCategory {
                category,
                min_category_amount,
            } => {
                if !context.has_category(*category) {
                    return false;
                }

                min_category_amount
                    .is_none_or(|minimum| context.category_amount(*category) >= minimum)
            }
        }
    }

    fn shortfall(&self, context: &EvaluationContext) -> Option<String> {
        if self.matches(context) {
            return None;
        }

        Some(match self {
            Self::MinAmount { amount } => format!(
                "minimum amount of {} not reached (cart subtotal {})",
                format_amount(*amount),
                format_amount(context.subtotal())
            ),
            Self::SpecificProduct {
                product,
                min_quantity,
            }
            | Self::ProductQuantity {
                product,
                min_quantity,
            } => format!("requires at least {min_quantity} of product {product}"),
            Self::ProductCategory {
                category,
                min_category_amount: None,
            } => format!("requires a product from category {category}"),
            Self::ProductCategory {
                category,
                min_category_amount: Some(minimum),
            } => format!(
                "requires {} spent in category {category} (currently {})",
                format_amount(*minimum),
                format_amount(context.category_amount(*category))
            ),
        })
    }
}

/// Condition tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Leaf predicate.
    Leaf(Leaf),

    /// Nested group; its children define its semantics.
    Group(ConditionGroup),
}

/// A group of conditions combined with one operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionGroup {
    /// How `children` are combined.
    pub op: BoolOp,

    /// Child conditions. Empty means "always satisfied".
    pub children: SmallVec<[Condition; 2]>,
}

impl ConditionGroup {
    /// Create a group from operator and children.
    #[must_use]
    pub fn new(op: BoolOp, children: SmallVec<[Condition; 2]>) -> Self {
        Self { op, children }
    }

    /// Evaluate the group against a cart.
    #[must_use]
    pub fn matches(&self, context: &EvaluationContext) -> bool {
        evaluate_group(&self.children, self.op, context)
    }

    /// Explain why the group is unsatisfied, or `None` when it holds.
    #[must_use]
    pub fn shortfall(&self, context: &EvaluationContext) -> Option<String> {
        if self.matches(context) {
            return None;
        }

        match self.op {
            BoolOp::And => self
                .children
                .iter()
                .find_map(|child| child.shortfall(context)),
            BoolOp::Or => {
                let unmet: Vec<String> = self
                    .children
                    .iter()
                    .filter_map(|child| child.shortfall(context))
                    .collect();

                Some(format!("none of: {}", unmet.join("; ")))
            }
        }
    }

    /// Number of nodes below this group.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                Condition::Leaf(_) => 1,
                Condition::Group(group) => 1 + group.node_count(),
            })
            .sum()
    }
}

impl Condition {
    /// Evaluate the node against a cart.
    #[must_use]
    pub fn matches(&self, context: &EvaluationContext) -> bool {
        evaluate(self, context)
    }

    fn shortfall(&self, context: &EvaluationContext) -> Option<String> {
        match self {
            Self::Leaf(leaf) => leaf.shortfall(context),
            Self::Group(group) => group.shortfall(context).map(|reason| format!("({reason})")),
        }
    }
}

/// Evaluate a single condition node.
#[must_use]
pub fn evaluate(node: &Condition, context: &EvaluationContext) -> bool {
    match node {
        Condition::Leaf(leaf) => leaf.matches(context),
        Condition::Group(group) => evaluate_group(&group.children, group.op, context),
    }
}

/// Evaluate a list of children under `op`. An empty list is vacuously true.
#[must_use]
pub fn evaluate_group(children: &[Condition], op: BoolOp, context: &EvaluationContext) -> bool {
    if children.is_empty() {
        return true;
    }

    match op {
        BoolOp::And => children.iter().all(|child| evaluate(child, context)),
        BoolOp::Or => children.iter().any(|child| evaluate(child, context)),
    }
}

/// Render minor units as a decimal amount, e.g. `9999` as `99.99`.
#[must_use]
pub fn format_amount(minor_units: u64) -> String {
    format!("{}.{:02}", minor_units / 100, minor_units % 100)
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;

    use crate::{
        cart::{CartLine, CartProduct},
        ids::UserId,
    };

    use super::*;

    fn always(value: bool) -> Condition {
        // A zero threshold always holds; an unreachable one never does.
        Condition::Leaf(Leaf::MinAmount {
            amount: if value { 0 } else { u64::MAX },
        })
    }

    fn cart(lines: Vec<CartLine>) -> EvaluationContext {
        EvaluationContext::new(UserId::new(), lines)
    }

    fn product(price: u64, category: Option<CategoryId>) -> CartProduct {
        CartProduct {
            price,
            category,
            stock: 5,
        }
    }

    #[test]
    fn empty_group_is_vacuously_true() {
        let context = cart(vec![]);

        assert!(evaluate_group(&[], BoolOp::And, &context));
        assert!(evaluate_group(&[], BoolOp::Or, &context));
    }

    #[test]
    fn and_and_or_follow_boolean_semantics() {
        let context = cart(vec![]);

        assert!(!evaluate_group(
            &[always(true), always(false)],
            BoolOp::And,
            &context
        ));
        assert!(!evaluate_group(
            &[always(false), always(false)],
            BoolOp::Or,
            &context
        ));
        assert!(evaluate_group(
            &[always(false), always(true)],
            BoolOp::Or,
            &context
        ));
    }

    #[test]
    fn min_amount_compares_against_non_gift_subtotal() {
        let condition = Leaf::MinAmount { amount: 10_000 };

        let exact = cart(vec![CartLine::purchased(
            ProductId::new(),
            1,
            product(10_000, None),
        )]);

        let short = cart(vec![
            CartLine::purchased(ProductId::new(), 1, product(9_999, None)),
            CartLine::gift(
                crate::ids::RuleId::new(),
                ProductId::new(),
                1,
                product(5_000, None),
            ),
        ]);

        assert!(condition.matches(&exact));
        assert!(!condition.matches(&short));
    }

    #[test]
    fn specific_product_and_product_quantity_share_a_predicate() {
        let sku = ProductId::new();
        let context = cart(vec![CartLine::purchased(sku, 3, product(100, None))]);

        for min_quantity in [1, 3, 4] {
            let specific = Leaf::SpecificProduct {
                product: sku,
                min_quantity,
            };
            let quantity = Leaf::ProductQuantity {
                product: sku,
                min_quantity,
            };

            assert_eq!(specific.matches(&context), quantity.matches(&context));
        }

        assert!(
            !Leaf::SpecificProduct {
                product: sku,
                min_quantity: 4
            }
            .matches(&context)
        );
    }

    #[test]
    fn gift_lines_do_not_satisfy_product_conditions() {
        let sku = ProductId::new();
        let context = cart(vec![CartLine::gift(
            crate::ids::RuleId::new(),
            sku,
            1,
            product(100, None),
        )]);

        assert!(
            !Leaf::SpecificProduct {
                product: sku,
                min_quantity: 1
            }
            .matches(&context)
        );
    }

    #[test]
    fn product_category_checks_presence_then_spend() {
        let category = CategoryId::new();
        let context = cart(vec![
            CartLine::purchased(ProductId::new(), 2, product(1_500, Some(category))),
            CartLine::purchased(ProductId::new(), 1, product(700, None)),
        ]);

        assert!(
            Leaf::ProductCategory {
                category,
                min_category_amount: None
            }
            .matches(&context)
        );
        assert!(
            Leaf::ProductCategory {
                category,
                min_category_amount: Some(3_000)
            }
            .matches(&context)
        );
        assert!(
            !Leaf::ProductCategory {
                category,
                min_category_amount: Some(3_001)
            }
            .matches(&context)
        );
        assert!(
            !Leaf::ProductCategory {
                category: CategoryId::new(),
                min_category_amount: None
            }
            .matches(&context)
        );
    }

    #[test]
    fn nested_groups_evaluate_recursively() {
        let sku = ProductId::new();
        let tree = ConditionGroup::new(
            BoolOp::And,
            smallvec![
                Condition::Leaf(Leaf::MinAmount { amount: 1_000 }),
                Condition::Group(ConditionGroup::new(
                    BoolOp::Or,
                    smallvec![
                        Condition::Leaf(Leaf::SpecificProduct {
                            product: sku,
                            min_quantity: 2,
                        }),
                        Condition::Leaf(Leaf::MinAmount { amount: 5_000 }),
                    ],
                )),
            ],
        );

        let with_product = cart(vec![CartLine::purchased(sku, 2, product(600, None))]);
        let without = cart(vec![CartLine::purchased(
            ProductId::new(),
            1,
            product(1_200, None),
        )]);

        assert!(tree.matches(&with_product));
        assert!(!tree.matches(&without));
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn shortfall_names_the_failing_amount() {
        let tree = ConditionGroup::new(
            BoolOp::And,
            smallvec![Condition::Leaf(Leaf::MinAmount { amount: 10_000 })],
        );

        let context = cart(vec![CartLine::purchased(
            ProductId::new(),
            1,
            product(9_999, None),
        )]);

        let reason = tree.shortfall(&context);

        assert_eq!(
            reason.as_deref(),
            Some("minimum amount of 100.00 not reached (cart subtotal 99.99)")
        );
    }

    #[test]
    fn parses_stored_and_upper_case_names() -> Result<(), UnknownValue> {
        assert_eq!("AND".parse::<BoolOp>()?, BoolOp::And);
        assert_eq!("or".parse::<BoolOp>()?, BoolOp::Or);
        assert_eq!(
            "MIN_AMOUNT".parse::<ConditionKind>()?,
            ConditionKind::MinAmount
        );
        assert_eq!(
            "product_quantity".parse::<ConditionKind>()?,
            ConditionKind::ProductQuantity
        );
        assert!("XOR".parse::<BoolOp>().is_err());
        assert!("CUSTOMER_TIER".parse::<ConditionKind>().is_err());

        Ok(())
    }
}
