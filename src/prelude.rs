//! Gifting prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    cart::{CartLine, CartProduct, EvaluationContext},
    conditions::{
        BoolOp, Condition, ConditionGroup, ConditionKind, Leaf, evaluate, evaluate_group,
        format_amount,
        rows::{ConditionRow, ConditionTreeError, build_tree, flatten},
    },
    eligibility::{Denial, Gate, RuleEligibility},
    ids::{
        CartLineId, CategoryId, ConditionId, OrderId, ProductId, RuleId, TypedUuid, UsageId,
        UserId,
    },
    matcher::{RuleMatcher, offer_order, rank},
    rules::{
        GiftProduct, GiftRule, GiftRuleUsage, Priority, Quota, ValidityWindow,
        authoring::{
            AuthoringError, ConditionDraft, GiftProductDraft, KnownReferences, NewGiftRule,
            ReferenceResolver, RuleDraft, RuleValidationError, RuleValidationErrors,
        },
    },
    usage::UsageCounts,
    validator::{GiftSelection, GiftValidator, InvalidGiftLine, OrderRejection},
};
