use std::{fs, path::PathBuf};

use clap::Args;
use gifting::rules::authoring::RuleDraft;
use gifting_app::context::AppContext;
use tracing::warn;

use super::CatalogArgs;

#[derive(Debug, Args)]
pub(crate) struct ImportRulesArgs {
    /// YAML file holding a list of rule drafts
    #[arg(long)]
    file: PathBuf,

    #[command(flatten)]
    catalog: CatalogArgs,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,
}

pub(crate) async fn run(args: ImportRulesArgs) -> Result<(), String> {
    let source = fs::read_to_string(&args.file)
        .map_err(|error| format!("failed to read {}: {error}", args.file.display()))?;

    let drafts: Vec<RuleDraft> = serde_norway::from_str(&source)
        .map_err(|error| format!("failed to parse {}: {error}", args.file.display()))?;

    let context = AppContext::from_database_url(&args.database_url, args.catalog.load()?)
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

    let mut failed = 0_usize;

    for draft in drafts {
        let name = draft.name.clone();

        match context.gift_rules.create_rule(draft).await {
            Ok(rule) => {
                println!("rule_uuid: {}", rule.id);
                println!("rule_name: {}", rule.name);
                println!();
            }
            Err(error) => {
                warn!(rule_name = %name, "rule draft rejected: {error}");
                eprintln!("{name}: {error}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} rule draft(s) were not imported"));
    }

    Ok(())
}
