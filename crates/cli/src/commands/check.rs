use std::path::Path;

use anyhow::Result;
use clap::Args;

use crate::config::AppConfig;
use crate::progress;
use crate::setup;

#[derive(Args)]
pub struct CheckArgs {
    /// Also send the unviewed-changes reminder
    #[arg(long)]
    remind: bool,
}

pub async fn run(args: CheckArgs, config_path: &Path) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let watcher = setup::watcher(&config).await?;

    let spinner = progress::create_spinner(&format!(
        "Checking {} files...",
        watcher.tracked().len()
    ));
    let report = watcher.poll_once().await;
    spinner.finish_and_clear();
    let report = report?;

    println!("Fetched:   {}", report.fetched);
    println!("Modified:  {}", report.changed);
    if report.adopted > 0 {
        println!("New:       {}", report.adopted);
    }

    if args.remind {
        let count = watcher.remind_once().await?;
        println!("Unviewed:  {count}");
    }
    Ok(())
}
