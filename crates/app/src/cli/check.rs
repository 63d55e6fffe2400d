use std::path::PathBuf;

use clap::Args;
use gifting::{
    eligibility::RuleEligibility,
    fixtures::Fixture,
    matcher::RuleMatcher,
    validator::{GiftValidator, OrderRejection},
};
use jiff::Timestamp;
use tabled::{builder::Builder, settings::Style};
use tracing::info;

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    /// Fixture directory
    #[arg(long, default_value = "./fixtures")]
    fixtures: PathBuf,

    /// Fixture set supplying products, rules and cart
    #[arg(long)]
    set: Option<String>,

    /// Product fixture, overrides the set
    #[arg(long)]
    products: Option<String>,

    /// Rule fixture, overrides the set
    #[arg(long)]
    rules: Option<String>,

    /// Cart fixture, overrides the set
    #[arg(long)]
    cart: Option<String>,

    /// Evaluation time, defaults to now
    #[arg(long)]
    at: Option<Timestamp>,
}

impl CheckArgs {
    fn pick<'a>(&'a self, kind: &str, value: Option<&'a String>) -> Result<&'a str, String> {
        value
            .or(self.set.as_ref())
            .map(String::as_str)
            .ok_or_else(|| format!("either --set or --{kind} is required"))
    }

    fn load(&self) -> Result<Fixture, String> {
        let products = self.pick("products", self.products.as_ref())?;
        let rules = self.pick("rules", self.rules.as_ref())?;
        let cart = self.pick("cart", self.cart.as_ref())?;

        let mut fixture = Fixture::with_base_path(&self.fixtures);

        fixture
            .load_products(products)
            .and_then(|fixture| fixture.load_rules(rules))
            .and_then(|fixture| fixture.load_cart(cart))
            .map_err(|error| format!("failed to load fixtures: {error}"))?;

        Ok(fixture)
    }
}

pub(crate) fn run(args: &CheckArgs) -> Result<(), String> {
    let fixture = args.load()?;
    let context = fixture
        .context()
        .map_err(|error| format!("failed to build cart: {error}"))?;

    let now = args.at.unwrap_or_else(Timestamp::now);

    info!(
        rule_count = fixture.rules().len(),
        line_count = context.lines().len(),
        at = %now,
        "checking fixture cart"
    );

    let report = RuleMatcher.match_all(fixture.rules(), fixture.usage(), &context, now);

    println!("{}", eligibility_table(&report));

    if context.gift_lines().next().is_none() {
        return Ok(());
    }

    match GiftValidator.validate_order(fixture.rules(), fixture.usage(), &context, now) {
        Ok(()) => println!("all gift lines are valid"),
        Err(rejection) => println!("{}", rejection_table(&rejection)),
    }

    Ok(())
}

fn eligibility_table(report: &[RuleEligibility]) -> String {
    let mut builder = Builder::default();

    builder.push_record(["Priority", "Rule", "Eligible", "Reason"]);

    for row in report {
        builder.push_record([
            row.rule.priority.to_string(),
            row.rule.name.clone(),
            if row.is_eligible() { "yes" } else { "no" }.to_string(),
            row.reason().unwrap_or_default(),
        ]);
    }

    let mut table = builder.build();

    table.with(Style::modern_rounded());

    table.to_string()
}

fn rejection_table(rejection: &OrderRejection) -> String {
    let mut builder = Builder::default();

    builder.push_record(["Line", "Gate", "Reason"]);

    for invalid in &rejection.invalid_lines {
        builder.push_record([
            invalid.line.to_string(),
            invalid.denial.gate.to_string(),
            invalid.denial.reason.clone(),
        ]);
    }

    let mut table = builder.build();

    table.with(Style::modern_rounded());

    table.to_string()
}
