//! Gifting Service

use std::sync::Arc;

use async_trait::async_trait;
use gifting::{
    cart::{CartLine, EvaluationContext},
    eligibility::{Denial, Gate, RuleEligibility},
    ids::{CartLineId, OrderId, ProductId, RuleId},
    matcher::RuleMatcher,
    rules::{GiftRule, GiftRuleUsage},
    validator::{GiftSelection, GiftValidator, InvalidGiftLine, OrderRejection},
};
use jiff::Timestamp;
use mockall::automock;
use rustc_hash::FxHashMap;
use tracing::{Span, info, warn};

use crate::domain::{
    catalog::CatalogReader,
    gift_rules::{GiftRulesService, GiftRulesServiceError, data::RuleFilter},
    gifting::GiftingServiceError,
    ledger::{UsageLedger, data::GiftClaim},
};

/// Gifting over the pure rule engine, with rules, usage and catalog facts loaded per request.
#[derive(Clone)]
pub struct EngineGiftingService {
    rules: Arc<dyn GiftRulesService>,
    ledger: Arc<dyn UsageLedger>,
    catalog: Arc<dyn CatalogReader>,
    matcher: RuleMatcher,
    validator: GiftValidator,
}

impl EngineGiftingService {
    #[must_use]
    pub fn new(
        rules: Arc<dyn GiftRulesService>,
        ledger: Arc<dyn UsageLedger>,
        catalog: Arc<dyn CatalogReader>,
    ) -> Self {
        Self {
            rules,
            ledger,
            catalog,
            matcher: RuleMatcher,
            validator: GiftValidator,
        }
    }

    async fn find_rule(&self, rule: RuleId) -> Result<Option<GiftRule>, GiftingServiceError> {
        match self.rules.get_rule(rule).await {
            Ok(found) => Ok(Some(found)),
            Err(GiftRulesServiceError::NotFound) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Re-read every gift line's product from the catalog.
    ///
    /// Gift lines whose product is no longer in the catalog are left out of the returned
    /// context and reported as invalid.
    async fn refresh_gift_products(
        &self,
        context: &EvaluationContext,
    ) -> Result<(EvaluationContext, Vec<InvalidGiftLine>), GiftingServiceError> {
        let ids: Vec<ProductId> = context.gift_lines().map(|line| line.product_id).collect();

        let products = if ids.is_empty() {
            FxHashMap::default()
        } else {
            self.catalog.products(&ids).await?
        };

        let mut lines = Vec::with_capacity(context.lines().len());
        let mut missing = Vec::new();

        for line in context.lines() {
            if !line.is_gift {
                lines.push(line.clone());
                continue;
            }

            match products.get(&line.product_id) {
                Some(product) => lines.push(CartLine {
                    product: *product,
                    ..line.clone()
                }),
                None => {
                    let reason = "gift product is not in the catalog";

                    let denial = match line.gift_rule_id {
                        Some(rule) => Denial::new(Gate::GiftProduct, rule, reason),
                        None => Denial::unattributed(Gate::GiftProduct, reason),
                    };

                    missing.push(InvalidGiftLine {
                        line: line.id,
                        denial: denial.for_product(line.product_id),
                    });
                }
            }
        }

        Ok((EvaluationContext::new(context.user(), lines), missing))
    }
}

#[async_trait]
impl GiftingService for EngineGiftingService {
    #[tracing::instrument(
        name = "gifting.service.match_rules",
        skip(self, context),
        fields(
            user_uuid = %context.user(),
            rule_count = tracing::field::Empty,
            eligible_count = tracing::field::Empty
        ),
        err
    )]
    async fn match_rules(
        &self,
        context: &EvaluationContext,
    ) -> Result<Vec<RuleEligibility>, GiftingServiceError> {
        let rules = self.rules.list_rules(RuleFilter::Active).await?;
        let usage = self.ledger.usage_counts(context.user()).await?;

        let report = self
            .matcher
            .match_all(&rules, &usage, context, Timestamp::now());

        let span = Span::current();

        span.record("rule_count", tracing::field::display(report.len()));

        span.record(
            "eligible_count",
            tracing::field::display(report.iter().filter(|row| row.is_eligible()).count()),
        );

        Ok(report)
    }

    async fn eligible_rules(
        &self,
        context: &EvaluationContext,
    ) -> Result<Vec<GiftRule>, GiftingServiceError> {
        Ok(self
            .match_rules(context)
            .await?
            .into_iter()
            .filter(RuleEligibility::is_eligible)
            .map(|row| row.rule)
            .collect())
    }

    #[tracing::instrument(
        name = "gifting.service.validate_selection",
        skip(self, context),
        fields(user_uuid = %context.user(), rule_uuid = %rule, product_uuid = %product),
        err
    )]
    async fn validate_selection(
        &self,
        rule: RuleId,
        product: ProductId,
        quantity: u32,
        context: &EvaluationContext,
    ) -> Result<(), GiftingServiceError> {
        let found = self.find_rule(rule).await?;
        let usage = self.ledger.usage_counts(context.user()).await?;

        let Some(catalog_product) = self.catalog.products(&[product]).await?.remove(&product)
        else {
            return Err(GiftingServiceError::Denied(
                Denial::new(Gate::GiftProduct, rule, "product is not in the catalog")
                    .for_product(product),
            ));
        };

        let selection = GiftSelection {
            rule,
            product_id: product,
            quantity,
            product: catalog_product,
        };

        self.validator
            .validate_selection(
                found.as_ref(),
                &selection,
                &usage,
                context,
                Timestamp::now(),
            )
            .map_err(GiftingServiceError::Denied)
    }

    #[tracing::instrument(
        name = "gifting.service.validate_order",
        skip(self, context),
        fields(user_uuid = %context.user()),
        err
    )]
    async fn validate_order(&self, context: &EvaluationContext) -> Result<(), GiftingServiceError> {
        let rules = self.rules.list_rules(RuleFilter::All).await?;
        let usage = self.ledger.usage_counts(context.user()).await?;

        let (refreshed, mut invalid_lines) = self.refresh_gift_products(context).await?;

        if let Err(rejection) = self
            .validator
            .validate_order(&rules, &usage, &refreshed, Timestamp::now())
        {
            invalid_lines.extend(rejection.invalid_lines);
        }

        if invalid_lines.is_empty() {
            return Ok(());
        }

        let positions: FxHashMap<CartLineId, usize> = context
            .lines()
            .iter()
            .enumerate()
            .map(|(position, line)| (line.id, position))
            .collect();

        invalid_lines.sort_by_key(|invalid| positions.get(&invalid.line).copied());

        Err(OrderRejection { invalid_lines }.into())
    }

    #[tracing::instrument(
        name = "gifting.service.commit_order_gifts",
        skip(self, context),
        fields(
            order_uuid = %order,
            user_uuid = %context.user(),
            claim_count = tracing::field::Empty
        ),
        err
    )]
    async fn commit_order_gifts(
        &self,
        order: OrderId,
        context: &EvaluationContext,
    ) -> Result<Vec<GiftRuleUsage>, GiftingServiceError> {
        if let Err(error) = self.validate_order(context).await {
            if let GiftingServiceError::Rejected(rejection) = &error {
                for invalid in &rejection.invalid_lines {
                    warn!(
                        line_uuid = %invalid.line,
                        gate = %invalid.denial.gate,
                        reason = %invalid.denial.reason,
                        "rejected gift line"
                    );
                }
            }

            return Err(error);
        }

        let claims: Vec<GiftClaim> = context
            .gift_lines()
            .filter_map(GiftClaim::from_line)
            .collect();

        Span::current().record("claim_count", tracing::field::display(claims.len()));

        if claims.is_empty() {
            return Ok(Vec::new());
        }

        let recorded = self
            .ledger
            .record(context.user(), Some(order), &claims)
            .await?;

        info!(order_uuid = %order, usage_count = recorded.len(), "committed order gifts");

        Ok(recorded)
    }
}

#[automock]
#[async_trait]
pub trait GiftingService: Send + Sync {
    /// Every active rule with its eligibility for the cart, best offer first.
    async fn match_rules(
        &self,
        context: &EvaluationContext,
    ) -> Result<Vec<RuleEligibility>, GiftingServiceError>;

    /// The rules the cart currently qualifies for, best offer first.
    async fn eligible_rules(
        &self,
        context: &EvaluationContext,
    ) -> Result<Vec<GiftRule>, GiftingServiceError>;

    /// Check whether `quantity` units of `product` may be added as a gift from `rule`.
    async fn validate_selection(
        &self,
        rule: RuleId,
        product: ProductId,
        quantity: u32,
        context: &EvaluationContext,
    ) -> Result<(), GiftingServiceError>;

    /// Re-validate every gift line of an order against current rules, usage and catalog data.
    async fn validate_order(&self, context: &EvaluationContext) -> Result<(), GiftingServiceError>;

    /// Validate the order's gift lines, then record them against quotas and stock atomically.
    async fn commit_order_gifts(
        &self,
        order: OrderId,
        context: &EvaluationContext,
    ) -> Result<Vec<GiftRuleUsage>, GiftingServiceError>;
}
