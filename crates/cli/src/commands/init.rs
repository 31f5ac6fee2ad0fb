use std::path::Path;

use anyhow::Result;
use clap::Args;
use dialoguer::{Confirm, Input};
use tracing::info;

use crate::config::AppConfig;

#[derive(Args)]
pub struct InitArgs {
    /// Accept defaults without prompting
    #[arg(long)]
    defaults: bool,

    /// Overwrite an existing config file
    #[arg(long)]
    force: bool,
}

pub async fn run(args: InitArgs, config_path: &Path) -> Result<()> {
    if config_path.exists()
        && !args.force
        && (args.defaults
            || !Confirm::new()
                .with_prompt(format!("{} exists. Overwrite?", config_path.display()))
                .default(false)
                .interact()?)
    {
        anyhow::bail!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }

    let mut config = AppConfig::default();
    if !args.defaults {
        prompt(&mut config)?;
    }
    config.save(config_path)?;

    info!(config_path = %config_path.display(), "Config saved.");
    println!("Config written to {}", config_path.display());
    println!(
        "Next: list file ids in {} and run `drivewatch auth`.",
        config.watch.ids_file
    );
    Ok(())
}

fn prompt(config: &mut AppConfig) -> Result<()> {
    let secret_file: String = Input::new()
        .with_prompt("Google client secret file")
        .default(
            config
                .google
                .client_secret_file
                .clone()
                .unwrap_or_else(|| "credentials.json".to_string()),
        )
        .interact_text()?;
    config.google.client_secret_file = Some(secret_file);

    config.watch.ids_file = Input::new()
        .with_prompt("File with tracked ids")
        .default(config.watch.ids_file.clone())
        .interact_text()?;
    config.watch.check_interval_secs = Input::new()
        .with_prompt("Check interval (seconds)")
        .default(config.watch.check_interval_secs)
        .validate_with(|v: &u64| if *v > 0 { Ok(()) } else { Err("must be positive") })
        .interact_text()?;
    config.watch.reminder_interval_mins = Input::new()
        .with_prompt("Reminder interval (minutes, 0 disables)")
        .default(config.watch.reminder_interval_mins)
        .interact_text()?;

    config.notify.telegram = Confirm::new()
        .with_prompt("Send notifications via Telegram?")
        .default(config.notify.telegram)
        .interact()?;
    if config.notify.telegram {
        let token: String = Input::new()
            .with_prompt("Bot token (empty to read BOT_TOKEN)")
            .allow_empty(true)
            .interact_text()?;
        let chat: String = Input::new()
            .with_prompt("Chat id (empty to read CHAT_ID)")
            .allow_empty(true)
            .interact_text()?;
        config.telegram.bot_token = (!token.is_empty()).then_some(token);
        config.telegram.chat_id = (!chat.is_empty()).then_some(chat);
    }
    config.notify.log = Confirm::new()
        .with_prompt("Also log notifications?")
        .default(config.notify.log)
        .interact()?;
    Ok(())
}
