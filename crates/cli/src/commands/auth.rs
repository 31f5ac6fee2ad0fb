use std::path::Path;

use anyhow::Result;
use clap::Args;

use crate::config::AppConfig;
use crate::setup;

#[derive(Args)]
pub struct AuthArgs {
    /// Authorize again even if a valid credential is stored
    #[arg(long)]
    force: bool,
}

pub async fn run(args: AuthArgs, config_path: &Path) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let auth = setup::token_manager(&config).await?;

    if args.force || !auth.has_credential().await {
        let credential = auth.authorize().await?;
        println!(
            "Authorized. Token stored in {} (expires {}).",
            config.watch.token_file,
            credential.expiry.format("%Y-%m-%d %H:%M:%S UTC")
        );
    } else {
        auth.get_valid_token().await?;
        println!("Stored credential is valid ({}).", config.watch.token_file);
    }
    Ok(())
}
