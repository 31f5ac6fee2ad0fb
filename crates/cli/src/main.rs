mod commands;
mod config;
mod notify;
mod progress;
mod setup;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "drivewatch",
    version,
    about = "Watch Google Drive files for changes"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Config file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    let config_path = cli.config.unwrap_or_else(AppConfig::config_path);

    match cli.command {
        commands::Command::Init(args) => commands::init::run(args, &config_path).await,
        commands::Command::Auth(args) => commands::auth::run(args, &config_path).await,
        commands::Command::Watch(args) => commands::watch::run(args, &config_path).await,
        commands::Command::Check(args) => commands::check::run(args, &config_path).await,
        commands::Command::Status(args) => commands::status::run(args, &config_path).await,
    }
}
