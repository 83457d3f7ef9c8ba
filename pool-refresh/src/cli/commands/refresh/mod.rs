mod handler;

pub use handler::handle_refresh_command;

use std::path::PathBuf;

use clap::{Args, ValueEnum};

#[derive(Args, Debug)]
pub struct RefreshCommands {
    /// Owner whose pools are refreshed
    #[arg(long)]
    pub owner: String,

    /// JSON file with the upstream subscriptions, products and content
    #[arg(long)]
    pub snapshot: PathBuf,

    /// Show the planned operations without writing anything
    #[arg(long)]
    pub dry: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Disable coloured output
    #[arg(long)]
    pub no_color: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
