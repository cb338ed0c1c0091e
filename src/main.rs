// src/main.rs - moonforge entry point

use clap::Parser;

use moonforge::cli::{Cli, Commands};
use moonforge::infra::config::Config;
use moonforge::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging (respects RUST_LOG)
    logger::init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load config (falls back to defaults if no config.toml)
    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    match cli.command {
        Commands::Run(args) => moonforge::cli::run::run_workflow(args, &config).await,
        Commands::Check { workflow } => {
            moonforge::cli::check::run_check(std::path::Path::new(&workflow))
        }
        Commands::Cache { action } => moonforge::cli::cache::run_cache(action, &config).await,
    }
}
