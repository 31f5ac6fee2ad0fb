use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::config::AppConfig;
use crate::setup;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Args)]
pub struct WatchArgs {
    /// Override the check interval (seconds)
    #[arg(long)]
    interval: Option<u64>,
}

pub async fn run(args: WatchArgs, config_path: &Path) -> Result<()> {
    let mut config = AppConfig::load(config_path)?;
    if let Some(interval) = args.interval.filter(|i| *i > 0) {
        config.watch.check_interval_secs = interval;
    }

    let watcher = setup::watcher(&config).await?;
    let settings = config.watch_settings();
    let handle = watcher.clone().start(settings);

    info!(
        files = watcher.tracked().len(),
        interval_secs = settings.poll_interval.as_secs(),
        reminder_mins = settings.reminder_interval.map(|d| d.as_secs() / 60),
        "watching"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.stop(SHUTDOWN_GRACE).await;
    Ok(())
}
