use std::{path::PathBuf, sync::Arc};

use clap::{Args, Subcommand};
use gifting::fixtures::Fixture;
use gifting_app::domain::catalog::FixtureCatalog;

mod import;
mod list;

#[derive(Debug, Args)]
pub(crate) struct RulesCommand {
    #[command(subcommand)]
    command: RulesSubcommand,
}

#[derive(Debug, Subcommand)]
enum RulesSubcommand {
    /// Validate and store rule drafts from a YAML file
    Import(import::ImportRulesArgs),

    /// List stored rules in offer order
    List(list::ListRulesArgs),
}

pub(crate) async fn run(command: RulesCommand) -> Result<(), String> {
    match command.command {
        RulesSubcommand::Import(args) => import::run(args).await,
        RulesSubcommand::List(args) => list::run(args).await,
    }
}

/// Catalog backed by a fixture product file.
#[derive(Debug, Args)]
pub(crate) struct CatalogArgs {
    /// Fixture directory
    #[arg(long, default_value = "./fixtures")]
    fixtures: PathBuf,

    /// Product fixture file used as the catalog
    #[arg(long, default_value = "spend_threshold")]
    catalog: String,
}

impl CatalogArgs {
    pub(crate) fn load(&self) -> Result<Arc<FixtureCatalog>, String> {
        let mut fixture = Fixture::with_base_path(&self.fixtures);

        fixture
            .load_products(&self.catalog)
            .map_err(|error| format!("failed to load catalog {}: {error}", self.catalog))?;

        Ok(Arc::new(FixtureCatalog::from_fixture(&fixture)))
    }
}
