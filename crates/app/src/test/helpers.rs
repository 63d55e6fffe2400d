//! Test Helpers

use gifting::{
    fixtures::Fixture,
    ids::ProductId,
    rules::authoring::{ConditionDraft, GiftProductDraft, RuleDraft},
};
use testresult::TestResult;

/// Active rule gifting `gift` once the cart subtotal reaches `amount`.
pub(crate) fn min_amount_draft(name: &str, amount: i64, gift: ProductId) -> RuleDraft {
    RuleDraft {
        name: name.to_string(),
        description: None,
        priority: 50.0,
        is_active: true,
        condition_logic: None,
        conditions: vec![ConditionDraft {
            kind: Some("MIN_AMOUNT".to_string()),
            amount: Some(amount),
            ..ConditionDraft::default()
        }],
        gift_products: vec![GiftProductDraft {
            product: gift,
            max_quantity_per_order: None,
            remaining_stock: None,
        }],
        max_uses_per_customer: None,
        max_total_uses: None,
        valid_from: None,
        valid_until: None,
    }
}

/// Two pairs of sneakers, or clothing spend of 30.00 together with a pair of sneakers.
pub(crate) fn or_draft(fixture: &Fixture) -> TestResult<RuleDraft> {
    let sneakers = fixture.product_id("sneakers")?;
    let clothing = fixture.category_id("clothing")?;

    Ok(RuleDraft {
        name: "Shoe care sample".to_string(),
        description: Some("Sneaker or clothing shoppers get a sample".to_string()),
        priority: 80.0,
        is_active: true,
        condition_logic: Some("OR".to_string()),
        conditions: vec![
            ConditionDraft {
                kind: Some("SPECIFIC_PRODUCT".to_string()),
                product: Some(sneakers),
                min_quantity: Some(2),
                ..ConditionDraft::default()
            },
            ConditionDraft {
                logic: Some("AND".to_string()),
                conditions: vec![
                    ConditionDraft {
                        kind: Some("PRODUCT_CATEGORY".to_string()),
                        category: Some(clothing),
                        min_category_amount: Some(3_000),
                        ..ConditionDraft::default()
                    },
                    ConditionDraft {
                        kind: Some("SPECIFIC_PRODUCT".to_string()),
                        product: Some(sneakers),
                        ..ConditionDraft::default()
                    },
                ],
                ..ConditionDraft::default()
            },
        ],
        gift_products: vec![GiftProductDraft {
            product: fixture.product_id("sample")?,
            max_quantity_per_order: Some(2),
            remaining_stock: Some(100),
        }],
        max_uses_per_customer: None,
        max_total_uses: Some(500),
        valid_from: None,
        valid_until: None,
    })
}
