use std::sync::Arc;

use clap::Args;
use gifting::rules::GiftRule;
use gifting_app::{
    context::AppContext,
    domain::{catalog::FixtureCatalog, gift_rules::data::RuleFilter},
};
use tabled::{builder::Builder, settings::Style};

#[derive(Debug, Args)]
pub(crate) struct ListRulesArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Only list active rules
    #[arg(long)]
    active_only: bool,
}

pub(crate) async fn run(args: ListRulesArgs) -> Result<(), String> {
    let context = AppContext::from_database_url(&args.database_url, Arc::new(FixtureCatalog::new()))
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

    let filter = if args.active_only {
        RuleFilter::Active
    } else {
        RuleFilter::All
    };

    let rules = context
        .gift_rules
        .list_rules(filter)
        .await
        .map_err(|error| format!("failed to list rules: {error}"))?;

    if rules.is_empty() {
        println!("no gift rules found");
        return Ok(());
    }

    println!("{}", rules_table(&rules));

    Ok(())
}

fn rules_table(rules: &[GiftRule]) -> String {
    let mut builder = Builder::default();

    builder.push_record(["Rule", "Name", "Priority", "Active", "Uses", "Valid"]);

    for rule in rules {
        let uses = rule.quota.max_total_uses.map_or_else(
            || rule.quota.current_total_uses.to_string(),
            |limit| format!("{}/{limit}", rule.quota.current_total_uses),
        );

        let valid = format!(
            "{} .. {}",
            rule.window
                .valid_from()
                .map_or_else(String::new, |from| from.to_string()),
            rule.window
                .valid_until()
                .map_or_else(String::new, |until| until.to_string()),
        );

        builder.push_record([
            rule.id.to_string(),
            rule.name.clone(),
            rule.priority.to_string(),
            if rule.is_active { "yes" } else { "no" }.to_string(),
            uses,
            valid,
        ]);
    }

    let mut table = builder.build();

    table.with(Style::modern_rounded());

    table.to_string()
}
