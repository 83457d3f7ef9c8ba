use anyhow::Result;
use clap::Parser;

use pool_refresh::Config;
use pool_refresh::cli::commands::refresh::handle_refresh_command;
use pool_refresh::cli::commands::seed::handle_seed_command;
use pool_refresh::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.database {
        config.database.url = url;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.filter.as_str()),
    )
    .init();

    log::debug!("Using database {}", config.database.url);

    match cli.command {
        Commands::Refresh(args) => handle_refresh_command(args, &config).await,
        Commands::Seed(args) => handle_seed_command(args, &config).await,
    }
}
