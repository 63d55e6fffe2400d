//! Condition Rows
//!
//! Conditions are persisted as flat rows with parent pointers. This module rebuilds the
//! materialised [`ConditionGroup`] tree from those rows and flattens a tree back into rows.

use rustc_hash::FxHashMap;
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    conditions::{BoolOp, Condition, ConditionGroup, ConditionKind, Leaf},
    ids::{CategoryId, ConditionId, ProductId},
};

new_key_type! {
    /// Arena key for a row while a tree is being rebuilt
    struct RowKey;
}

/// One persisted condition node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionRow {
    /// Row identifier
    pub id: ConditionId,

    /// Parent row; `None` for top-level conditions of a rule
    pub parent: Option<ConditionId>,

    /// Order among siblings
    pub position: u32,

    /// Leaf type; ignored when the row has children
    pub kind: Option<ConditionKind>,

    /// Group logic; only meaningful when the row has children
    pub logic: Option<BoolOp>,

    /// `min_amount` threshold
    pub amount: Option<u64>,

    /// Product for product conditions
    pub product: Option<ProductId>,

    /// Category for category conditions
    pub category: Option<CategoryId>,

    /// Minimum quantity for product conditions
    pub min_quantity: Option<u32>,

    /// Minimum spend for category conditions
    pub min_category_amount: Option<u64>,
}

impl ConditionRow {
    fn empty(id: ConditionId, parent: Option<ConditionId>, position: u32) -> Self {
        Self {
            id,
            parent,
            position,
            kind: None,
            logic: None,
            amount: None,
            product: None,
            category: None,
            min_quantity: None,
            min_category_amount: None,
        }
    }
}

/// Errors rebuilding a tree from stored rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionTreeError {
    /// Two rows share an identifier.
    #[error("duplicate condition {0}")]
    DuplicateCondition(ConditionId),

    /// A row points at a parent that is not part of the rule.
    #[error("condition {id} references missing parent {parent}")]
    OrphanCondition {
        /// Offending row
        id: ConditionId,

        /// Missing parent
        parent: ConditionId,
    },

    /// Some rows are not reachable from the top level, which means their parents form a cycle.
    #[error("{unreachable} condition rows form a cycle")]
    Cycle {
        /// Number of rows not reachable from the top level
        unreachable: usize,
    },

    /// A leaf row without its type.
    #[error("condition {0} has neither children nor a type")]
    MissingKind(ConditionId),

    /// A leaf row without a field its type requires.
    #[error("{kind} condition {id} is missing {field}")]
    MissingField {
        /// Offending row
        id: ConditionId,

        /// Leaf type
        kind: ConditionKind,

        /// Missing field name
        field: &'static str,
    },
}

/// Rebuild the condition tree of a rule from its flat rows.
///
/// Top-level rows are combined with `root_op`, the rule's own condition logic. Children are
/// ordered by `position`, then by identifier.
///
/// # Errors
///
/// Returns an error when rows reference missing parents, form a cycle, or a leaf lacks a field
/// required by its type.
pub fn build_tree(
    root_op: BoolOp,
    rows: Vec<ConditionRow>,
) -> Result<ConditionGroup, ConditionTreeError> {
    let total = rows.len();

    let mut arena: SlotMap<RowKey, ConditionRow> = SlotMap::with_capacity_and_key(total);
    let mut keys: FxHashMap<ConditionId, RowKey> = FxHashMap::default();

    for row in rows {
        let id = row.id;

        if keys.insert(id, arena.insert(row)).is_some() {
            return Err(ConditionTreeError::DuplicateCondition(id));
        }
    }

    let mut children: SecondaryMap<RowKey, SmallVec<[RowKey; 4]>> = SecondaryMap::new();
    let mut roots: SmallVec<[RowKey; 4]> = SmallVec::new();

    for (key, row) in &arena {
        match row.parent {
            None => roots.push(key),
            Some(parent) => {
                let parent_key = keys
                    .get(&parent)
                    .copied()
                    .ok_or(ConditionTreeError::OrphanCondition { id: row.id, parent })?;

                if let Some(entry) = children.entry(parent_key) {
                    entry.or_default().push(key);
                }
            }
        }
    }

    let order = |key: &RowKey| arena.get(*key).map(|row| (row.position, row.id));

    roots.sort_by_key(order);

    for siblings in children.values_mut() {
        siblings.sort_by_key(order);
    }

    let mut visited = 0_usize;
    let mut nodes = SmallVec::with_capacity(roots.len());

    for root in roots {
        nodes.push(build_node(root, &arena, &children, &mut visited)?);
    }

    if visited != total {
        return Err(ConditionTreeError::Cycle {
            unreachable: total - visited,
        });
    }

    Ok(ConditionGroup::new(root_op, nodes))
}

fn build_node(
    key: RowKey,
    arena: &SlotMap<RowKey, ConditionRow>,
    children: &SecondaryMap<RowKey, SmallVec<[RowKey; 4]>>,
    visited: &mut usize,
) -> Result<Condition, ConditionTreeError> {
    *visited += 1;

    let Some(row) = arena.get(key) else {
        return Err(ConditionTreeError::Cycle { unreachable: 0 });
    };

    match children.get(key) {
        Some(child_keys) if !child_keys.is_empty() => {
            let mut nodes = SmallVec::with_capacity(child_keys.len());

            for child in child_keys {
                nodes.push(build_node(*child, arena, children, visited)?);
            }

            Ok(Condition::Group(ConditionGroup::new(
                row.logic.unwrap_or(BoolOp::And),
                nodes,
            )))
        }
        _ => match (row.kind, row.logic) {
            (Some(kind), _) => leaf_from_row(row, kind).map(Condition::Leaf),
            (None, Some(op)) => Ok(Condition::Group(ConditionGroup::new(op, SmallVec::new()))),
            (None, None) => Err(ConditionTreeError::MissingKind(row.id)),
        },
    }
}

fn leaf_from_row(row: &ConditionRow, kind: ConditionKind) -> Result<Leaf, ConditionTreeError> {
    let missing = |field| ConditionTreeError::MissingField {
        id: row.id,
        kind,
        field,
    };

    let min_quantity = row.min_quantity.unwrap_or(1);

    match kind {
        ConditionKind::MinAmount => Ok(Leaf::MinAmount {
            amount: row.amount.ok_or_else(|| missing("amount"))?,
        }),
        ConditionKind::SpecificProduct => Ok(Leaf::SpecificProduct {
            product: row.product.ok_or_else(|| missing("product"))?,
            min_quantity,
        }),
        ConditionKind::ProductQuantity => Ok(Leaf::ProductQuantity {
            product: row.product.ok_or_else(|| missing("product"))?,
            min_quantity,
        }),
        ConditionKind::ProductCategory => Ok(Leaf::ProductCategory {
            category: row.category.ok_or_else(|| missing("category"))?,
            min_category_amount: row.min_category_amount,
        }),
    }
}

/// Flatten a rule's condition tree into rows, parents before children.
///
/// The root group itself is not stored: its operator is the rule's condition logic.
#[must_use]
pub fn flatten(root: &ConditionGroup) -> Vec<ConditionRow> {
    let mut rows = Vec::with_capacity(root.node_count());

    flatten_children(&root.children, None, &mut rows);

    rows
}

fn flatten_children(
    children: &[Condition],
    parent: Option<ConditionId>,
    rows: &mut Vec<ConditionRow>,
) {
    for (position, child) in (0_u32..).zip(children) {
        let mut row = ConditionRow::empty(ConditionId::new(), parent, position);

        match child {
            Condition::Group(group) => {
                row.logic = Some(group.op);

                let id = row.id;

                rows.push(row);

                flatten_children(&group.children, Some(id), rows);
            }
            Condition::Leaf(leaf) => {
                row.kind = Some(leaf.kind());

                match *leaf {
                    Leaf::MinAmount { amount } => row.amount = Some(amount),
                    Leaf::SpecificProduct {
                        product,
                        min_quantity,
                    }
                    | Leaf::ProductQuantity {
                        product,
                        min_quantity,
                    } => {
                        row.product = Some(product);
                        row.min_quantity = Some(min_quantity);
                    }
                    Leaf::ProductCategory {
                        category,
                        min_category_amount,
                    } => {
                        row.category = Some(category);
                        row.min_category_amount = min_category_amount;
                    }
                }

                rows.push(row);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;

    use super::*;

    fn nested_tree() -> ConditionGroup {
        ConditionGroup::new(
            BoolOp::Or,
            smallvec![
                Condition::Leaf(Leaf::MinAmount { amount: 25_000 }),
                Condition::Group(ConditionGroup::new(
                    BoolOp::And,
                    smallvec![
                        Condition::Leaf(Leaf::ProductCategory {
                            category: CategoryId::new(),
                            min_category_amount: Some(4_000),
                        }),
                        Condition::Group(ConditionGroup::new(
                            BoolOp::Or,
                            smallvec![
                                Condition::Leaf(Leaf::SpecificProduct {
                                    product: ProductId::new(),
                                    min_quantity: 2,
                                }),
                                Condition::Leaf(Leaf::ProductQuantity {
                                    product: ProductId::new(),
                                    min_quantity: 1,
                                }),
                            ],
                        )),
                    ],
                )),
            ],
        )
    }

    #[test]
    fn nested_tree_round_trips_through_rows() -> Result<(), ConditionTreeError> {
        let tree = nested_tree();
        let rows = flatten(&tree);

        assert_eq!(rows.len(), 6);
        assert_eq!(rows.iter().filter(|row| row.parent.is_none()).count(), 2);

        let rebuilt = build_tree(BoolOp::Or, rows)?;

        assert_eq!(rebuilt, tree);

        Ok(())
    }

    #[test]
    fn rebuild_is_independent_of_row_order() -> Result<(), ConditionTreeError> {
        let tree = nested_tree();
        let mut rows = flatten(&tree);

        rows.reverse();

        assert_eq!(build_tree(BoolOp::Or, rows)?, tree);

        Ok(())
    }

    #[test]
    fn children_override_leaf_fields() -> Result<(), ConditionTreeError> {
        let parent = ConditionId::new();

        let mut group = ConditionRow::empty(parent, None, 0);
        group.kind = Some(ConditionKind::MinAmount);
        group.amount = Some(1);
        group.logic = Some(BoolOp::Or);

        let mut child = ConditionRow::empty(ConditionId::new(), Some(parent), 0);
        child.kind = Some(ConditionKind::MinAmount);
        child.amount = Some(500);

        let tree = build_tree(BoolOp::And, vec![child, group])?;

        assert_eq!(
            tree.children.first(),
            Some(&Condition::Group(ConditionGroup::new(
                BoolOp::Or,
                smallvec![Condition::Leaf(Leaf::MinAmount { amount: 500 })],
            )))
        );

        Ok(())
    }

    #[test]
    fn orphans_are_rejected() {
        let mut row = ConditionRow::empty(ConditionId::new(), Some(ConditionId::new()), 0);
        row.kind = Some(ConditionKind::MinAmount);
        row.amount = Some(1);

        assert!(matches!(
            build_tree(BoolOp::And, vec![row]),
            Err(ConditionTreeError::OrphanCondition { .. })
        ));
    }

    #[test]
    fn cycles_are_rejected() {
        let a = ConditionId::new();
        let b = ConditionId::new();

        let mut first = ConditionRow::empty(a, Some(b), 0);
        first.logic = Some(BoolOp::And);

        let mut second = ConditionRow::empty(b, Some(a), 0);
        second.logic = Some(BoolOp::And);

        assert_eq!(
            build_tree(BoolOp::And, vec![first, second]),
            Err(ConditionTreeError::Cycle { unreachable: 2 })
        );
    }

    #[test]
    fn leaves_without_required_fields_are_rejected() {
        let mut row = ConditionRow::empty(ConditionId::new(), None, 0);
        row.kind = Some(ConditionKind::ProductCategory);

        assert!(matches!(
            build_tree(BoolOp::And, vec![row]),
            Err(ConditionTreeError::MissingField {
                field: "category",
                ..
            })
        ));
    }

    #[test]
    fn missing_min_quantity_defaults_to_one() -> Result<(), ConditionTreeError> {
        let product = ProductId::new();

        let mut row = ConditionRow::empty(ConditionId::new(), None, 0);
        row.kind = Some(ConditionKind::SpecificProduct);
        row.product = Some(product);

        let tree = build_tree(BoolOp::And, vec![row])?;

        assert_eq!(
            tree.children.first(),
            Some(&Condition::Leaf(Leaf::SpecificProduct {
                product,
                min_quantity: 1
            }))
        );

        Ok(())
    }
}
