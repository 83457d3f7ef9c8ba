mod handler;

pub use handler::handle_seed_command;

use std::path::PathBuf;

use clap::Args;

#[derive(Args, Debug)]
pub struct SeedCommands {
    /// Owner the entities belong to
    #[arg(long)]
    pub owner: String,

    /// JSON file with `pools`, `products` and `content` arrays
    #[arg(long)]
    pub file: PathBuf,
}
