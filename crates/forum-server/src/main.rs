//! Forum extension manager CLI
//!
//! Entry point for the `forum` binary.

mod cli;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, ConfigAction};
use forum_server::ServerConfig;
use forum_server::commands::{self, Transition};
use forum_server::error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(&cli.config)?;
    init_tracing(&config, cli.verbose);
    tracing::debug!(config = %cli.config.display(), "Loaded configuration");

    execute_command(cli.command, &config)
}

/// `RUST_LOG` wins over the config file unless `--verbose` is given.
fn init_tracing(config: &ServerConfig, verbose: bool) {
    let directives = config.log_filter(verbose);
    let filter = if verbose {
        EnvFilter::new(directives)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

fn execute_command(cmd: Commands, config: &ServerConfig) -> Result<()> {
    match cmd {
        Commands::Serve { bind } => commands::run_serve(config, bind),
        Commands::List { json } => commands::run_list(config, json),
        Commands::Install { archive, user } => commands::run_install(config, &archive, &user),
        Commands::Uninstall { id } => commands::run_uninstall(config, &id),
        Commands::Enable { id } => commands::run_transition(config, &id, Transition::Enable),
        Commands::Disable { id } => commands::run_transition(config, &id, Transition::Disable),
        Commands::Reload { id } => commands::run_transition(config, &id, Transition::Reload),
        Commands::Activate { id } => commands::run_transition(config, &id, Transition::Activate),
        Commands::Config { action } => match action {
            ConfigAction::Get { id } => commands::run_config_get(config, &id),
            ConfigAction::Set { id, assignments } => {
                commands::run_config_set(config, &id, &assignments)
            }
            ConfigAction::Reset { id } => commands::run_config_reset(config, &id),
        },
        Commands::Token => commands::run_token(),
    }
}
