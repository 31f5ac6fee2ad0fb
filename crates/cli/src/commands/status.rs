use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::Args;
use console::style;

use drivewatch_core::StateStore;
use drivewatch_core::ids::read_tracked_ids;

use crate::config::AppConfig;

#[derive(Args)]
pub struct StatusArgs {
    /// Only list entries with unviewed changes
    #[arg(long)]
    unviewed: bool,
}

pub async fn run(args: StatusArgs, config_path: &Path) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let snapshot = StateStore::at_path(&config.watch.state_file)?.load().await?;

    if snapshot.is_empty() {
        println!("No stored state in {}.", config.watch.state_file);
    } else {
        println!(
            "{:<36} {:<18} {:<18} {}",
            "NAME", "MODIFIED", "VIEWED", "ID"
        );
        println!("{}", "-".repeat(100));
        for record in snapshot.records() {
            let unviewed = record.is_unviewed();
            if args.unviewed && !unviewed {
                continue;
            }
            let line = format!(
                "{:<36} {:<18} {:<18} {}",
                truncate(&record.name, 36),
                local(&record.modified_time),
                record.viewed_time.as_ref().map(local).unwrap_or_else(|| "-".to_string()),
                record.id
            );
            if unviewed {
                println!("{}", style(line).yellow());
            } else {
                println!("{line}");
            }
        }
    }

    if let Ok(tracked) = read_tracked_ids(&config.watch.ids_file) {
        let pending: Vec<_> = tracked.iter().filter(|id| !snapshot.contains(id)).collect();
        if !pending.is_empty() {
            println!();
            println!("{}", style(format!("Awaiting first fetch ({}):", pending.len())).dim());
            for id in pending {
                println!("  {id}");
            }
        }
    }
    Ok(())
}

fn local(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max - 1).collect();
        out.push('…');
        out
    }
}
