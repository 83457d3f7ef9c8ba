//! Refresh command handler

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::*;
use serde_json::json;

use super::{OutputFormat, RefreshCommands};
use crate::cli::commands::read_json;
use crate::config::Config;
use crate::refresh::model::ImportSnapshot;
use crate::refresh::{
    ChangeState, EntityType, FanoutEventSink, LoggingEventSink, PoolEvent, PoolOperations,
    ProcessSummary, RecordingEventSink, RefreshResult, RefreshScheduler, RefreshWorker,
};
use crate::store::{PoolStore, SqliteStore};

pub async fn handle_refresh_command(args: RefreshCommands, config: &Config) -> Result<()> {
    if args.no_color {
        colored::control::set_override(false);
    }

    if args.owner.trim().is_empty() {
        anyhow::bail!("--owner must not be empty");
    }

    let snapshot: ImportSnapshot = read_json(&args.snapshot)?;

    let store = SqliteStore::connect(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database: {}", config.database.url))?;

    let recorded = Arc::new(RecordingEventSink::new());
    let (operations, result, summary) = if args.dry {
        let mut worker = RefreshWorker::with_options(config.refresh.clone());
        worker
            .add_snapshot(snapshot)
            .with_context(|| format!("Invalid snapshot: {}", args.snapshot.display()))?;
        let plan = worker
            .plan(&store, &args.owner)
            .await
            .with_context(|| format!("Failed to plan refresh for owner '{}'", args.owner))?;
        (plan.operations, plan.result, None)
    } else {
        let sink = FanoutEventSink::new()
            .with_sink(recorded.clone())
            .with_sink(Arc::new(LoggingEventSink));
        let store: Arc<dyn PoolStore> = Arc::new(store);
        let scheduler =
            RefreshScheduler::new(store, Arc::new(sink)).with_options(config.refresh.clone());

        let report = scheduler
            .run(&args.owner, snapshot)
            .await
            .with_context(|| format!("Failed to refresh owner '{}'", args.owner))?;
        (report.operations, report.result, Some(report.summary))
    };

    let events = recorded.take();
    let output = match args.format {
        OutputFormat::Text => {
            render_text(&args.owner, &operations, &result, summary.as_ref(), &events)
        }
        OutputFormat::Json => {
            render_json(&args.owner, &operations, &result, summary.as_ref(), &events)?
        }
    };
    println!("{}", output);

    Ok(())
}

fn render_json(
    owner: &str,
    operations: &PoolOperations,
    result: &RefreshResult,
    summary: Option<&ProcessSummary>,
    events: &[PoolEvent],
) -> Result<String> {
    let value = json!({
        "owner": owner,
        "dry_run": summary.is_none(),
        "operations": operations,
        "result": result,
        "applied": summary,
        "events": events,
    });
    serde_json::to_string_pretty(&value).context("Failed to format JSON output")
}

fn render_text(
    owner: &str,
    operations: &PoolOperations,
    result: &RefreshResult,
    summary: Option<&ProcessSummary>,
    events: &[PoolEvent],
) -> String {
    let mut out = String::new();

    let mode = if summary.is_none() { " (dry run)" } else { "" };
    let _ = writeln!(out, "Refresh of owner {}{}", owner.bright_green().bold(), mode.dimmed());

    if operations.len() == 0 {
        let _ = writeln!(out, "  {}", "No pool changes".dimmed());
    }

    for pool in operations.creations() {
        let _ = writeln!(
            out,
            "  {} {} quantity {} ({})",
            "+".green().bold(),
            pool.id,
            pool.quantity,
            pool.product_name.as_deref().unwrap_or("no product")
        );
    }
    for update in operations.updates() {
        let fields: Vec<&str> = update.changed_fields.iter().map(|f| f.as_str()).collect();
        let detail = if fields.is_empty() {
            "dependencies changed".to_string()
        } else {
            fields.join(", ")
        };
        let _ = writeln!(out, "  {} {} {}", "~".yellow().bold(), update.pool_id(), detail.dimmed());
    }
    for pool in operations.deletions() {
        let _ = writeln!(out, "  {} {}", "-".red().bold(), pool.id);
    }

    let dependencies = operations.dependencies();
    if !dependencies.is_empty() {
        let _ = writeln!(
            out,
            "  {}",
            format!(
                "{} product/content rows saved, {} removed",
                dependencies.saved(),
                dependencies.removed()
            )
            .dimmed()
        );
    }

    let _ = writeln!(out);
    for entity_type in EntityType::all() {
        let counts: Vec<String> = [
            ChangeState::New,
            ChangeState::Updated,
            ChangeState::ChildChanged,
            ChangeState::Deleted,
            ChangeState::Unchanged,
        ]
        .iter()
        .map(|state| (state, result.count(*entity_type, *state)))
        .filter(|(_, count)| *count > 0)
        .map(|(state, count)| format!("{} {}", count, state))
        .collect();

        if !counts.is_empty() {
            let _ = writeln!(out, "  {:<8} {}", entity_type.as_str(), counts.join(", "));
        }
    }

    if !result.integrity_issues().is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Integrity issues:".yellow().bold());
        for issue in result.integrity_issues() {
            let _ = writeln!(out, "  {}", issue);
        }
    }

    if let Some(summary) = summary {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Applied: {} created, {} updated, {} deleted, {} events",
            summary.created,
            summary.updated,
            summary.deleted,
            events.len()
        );
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::model::{Pool, PoolType};
    use crate::refresh::model::Product;
    use crate::refresh::{PoolEventKind, PoolUpdate, RefreshPlan};
    use chrono::{TimeZone, Utc};

    fn pool(id: &str, quantity: i64) -> Pool {
        Pool {
            id: id.to_string(),
            owner_id: "org1".to_string(),
            pool_type: PoolType::Normal,
            product_id: Some("prod-a".to_string()),
            derived_product_id: None,
            product_name: Some("Premium".to_string()),
            quantity,
            start_date: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap(),
            contract_number: None,
            account_number: None,
            order_number: None,
        }
    }

    fn plan() -> RefreshPlan {
        let mut operations = PoolOperations::for_owner("org1");
        operations.create(pool("pool-b", 5)).unwrap();
        operations
            .update(PoolUpdate::new(&pool("pool-a", 10), &pool("pool-a", 15), false))
            .unwrap();

        let mut result = RefreshResult::new("org1");
        result.record(EntityType::Pool, "pool-a", ChangeState::Updated);
        result.record(EntityType::Pool, "pool-b", ChangeState::New);

        operations.save_product(Product {
            id: "prod-a".to_string(),
            name: "Premium".to_string(),
            multiplier: None,
            attributes: Default::default(),
            derived_product_id: None,
            provided_product_ids: Vec::new(),
            product_content: Vec::new(),
        });

        RefreshPlan { operations, result }
    }

    #[test]
    fn test_render_text_lists_operations() {
        colored::control::set_override(false);
        let plan = plan();
        let output = render_text("org1", &plan.operations, &plan.result, None, &[]);

        assert!(output.contains("Refresh of owner org1 (dry run)"));
        assert!(output.contains("+ pool-b quantity 5 (Premium)"));
        assert!(output.contains("~ pool-a quantity"));
        assert!(output.contains("pool     1 new, 1 updated"));
        assert!(output.contains("1 product/content rows saved, 0 removed"));
        assert!(!output.contains("Applied"));
    }

    #[test]
    fn test_render_json_reports_applied_batch() {
        let summary = ProcessSummary {
            created: 1,
            updated: 1,
            deleted: 0,
            dependencies_saved: 1,
            dependencies_removed: 0,
            events: 2,
        };
        let events = vec![PoolEvent::new(PoolEventKind::PoolCreated, "org1", "pool-b")];
        let plan = plan();
        let output =
            render_json("org1", &plan.operations, &plan.result, Some(&summary), &events).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["dry_run"], false);
        assert_eq!(value["applied"]["created"], 1);
        assert_eq!(value["operations"]["creations"][0]["id"], "pool-b");
        assert_eq!(value["operations"]["updates"][0]["changed_fields"][0], "quantity");
        assert_eq!(value["events"][0]["kind"], "pool-created");
        assert_eq!(value["operations"]["dependencies"]["saved_products"][0]["id"], "prod-a");
        assert_eq!(value["applied"]["dependencies_saved"], 1);
    }
}
