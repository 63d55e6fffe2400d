use clap::{Parser, Subcommand};
use gifting_app::logging::LoggingConfig;

mod check;
mod db;
mod rules;

#[derive(Debug, Parser)]
#[command(name = "gifting-app", about = "Gift rule CLI", long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) logging: LoggingConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Evaluate a fixture cart against fixture rules
    Check(check::CheckArgs),
    Rules(rules::RulesCommand),
    Db(db::DbCommand),
}

impl Cli {
    pub(crate) async fn run(self) -> Result<(), String> {
        match self.command {
            Commands::Check(args) => check::run(&args),
            Commands::Rules(command) => rules::run(command).await,
            Commands::Db(command) => db::run(command).await,
        }
    }
}
