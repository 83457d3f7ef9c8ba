//! Seed command handler

use anyhow::{Context, Result};
use colored::*;

use super::SeedCommands;
use crate::cli::commands::read_json;
use crate::config::Config;
use crate::refresh::model::ExistingSnapshot;
use crate::store::SqliteStore;

pub async fn handle_seed_command(args: SeedCommands, config: &Config) -> Result<()> {
    if args.owner.trim().is_empty() {
        anyhow::bail!("--owner must not be empty");
    }

    let snapshot: ExistingSnapshot = read_json(&args.file)?;
    let snapshot = assign_owner(snapshot, &args.owner);

    let store = SqliteStore::connect(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database: {}", config.database.url))?;

    store
        .seed(&args.owner, &snapshot)
        .await
        .with_context(|| format!("Failed to seed owner '{}'", args.owner))?;

    log::info!("Seeded owner '{}' from {}", args.owner, args.file.display());
    println!(
        "Seeded {}: {} pools, {} products, {} content",
        args.owner.bright_green().bold(),
        snapshot.pools.len(),
        snapshot.products.len(),
        snapshot.content.len()
    );

    Ok(())
}

/// Every seeded pool belongs to the owner named on the command line
fn assign_owner(mut snapshot: ExistingSnapshot, owner: &str) -> ExistingSnapshot {
    for pool in &mut snapshot.pools {
        if pool.owner_id != owner {
            log::warn!(
                "Pool '{}' lists owner '{}'; storing it under '{}'",
                pool.id,
                pool.owner_id,
                owner
            );
            pool.owner_id = owner.to_string();
        }
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assign_owner_rewrites_pools() {
        let snapshot: ExistingSnapshot = serde_json::from_value(json!({
            "pools": [{
                "id": "pool-1",
                "owner_id": "someone-else",
                "quantity": 3,
                "start_date": "2026-01-01T00:00:00Z",
                "end_date": "2027-01-01T00:00:00Z"
            }]
        }))
        .unwrap();

        let snapshot = assign_owner(snapshot, "org1");
        assert_eq!(snapshot.pools[0].owner_id, "org1");
        assert!(snapshot.products.is_empty());
    }
}
