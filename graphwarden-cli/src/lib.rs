//! GraphWarden command-line interface.
//!
//! The binary in `main.rs` only parses arguments and maps errors to exit
//! codes; the handlers live here so they can be tested directly.

pub mod app;
pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;

use cli::{Cli, Commands};
use error::CliError;
use output::OutputWriter;

/// Loads configuration, initializes logging and dispatches the subcommand.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    let loaded = app::load_config(&cli.config).await;

    let mut general = loaded
        .as_ref()
        .map(|config| config.general.clone())
        .unwrap_or_default();
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }
    if let Err(e) = logging::init_tracing(&general) {
        eprintln!("warning: {e}");
    }
    graphwarden_core::metrics::describe_all();
    tracing::debug!(config = %cli.config.display(), "graphwarden starting");

    match cli.command {
        Commands::Config(args) => commands::config::execute(args, loaded, &cli.config, &writer).await,
        Commands::Ingest(args) => {
            let app = app::App::build(loaded?).await?;
            commands::ingest::execute(app, args, &writer).await
        }
        Commands::Consume(args) => {
            let app = app::App::build(loaded?).await?;
            commands::consume::execute(app, args, &writer).await
        }
        Commands::Detect(args) => {
            let app = app::App::build(loaded?).await?;
            commands::detect::execute(app, args, &writer).await
        }
        Commands::Rules(args) => {
            let app = app::App::build(loaded?).await?;
            commands::rules::execute(app, args, &writer).await
        }
    }
}
