//! Command-line interface

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::refresh::RefreshCommands;
use commands::seed::SeedCommands;

#[derive(Parser, Debug)]
#[command(name = "pool-refresh", version, about = "Reconcile subscription pools against an upstream snapshot")]
pub struct Cli {
    /// Config file (defaults to pool-refresh/config.toml in the config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database url, overriding the config file
    #[arg(long, global = true)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh an owner's pools from an upstream snapshot file
    Refresh(RefreshCommands),
    /// Store existing pools, products and content for an owner
    Seed(SeedCommands),
}
