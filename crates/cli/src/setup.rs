use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use drivewatch_core::ids::read_tracked_ids;
use drivewatch_core::notify::LogNotifier;
use drivewatch_core::{Notifier, StateStore, Watcher};
use drivewatch_drive::{CredentialStore, DriveClient, TokenManager};

use crate::config::AppConfig;
use crate::notify::{FanoutNotifier, TelegramNotifier};

pub async fn token_manager(config: &AppConfig) -> Result<TokenManager> {
    let client = config.oauth_client()?;
    let settings = config.auth_settings(&client);
    let store = CredentialStore::at_path(&config.watch.token_file)?;
    TokenManager::open(client, settings, store).await
}

pub fn drive_client(config: &AppConfig, auth: TokenManager) -> Result<DriveClient> {
    Ok(DriveClient::new(auth, config.request_timeout())?
        .with_api_base(&config.google.api_base)
        .with_fields(config.google.fields.clone()))
}

pub fn notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>> {
    let mut targets: Vec<Arc<dyn Notifier>> = Vec::new();
    if config.notify.telegram {
        let (token, chat) = config.telegram_target()?;
        targets.push(Arc::new(TelegramNotifier::new(
            &config.telegram.api_base,
            token,
            chat,
            config.request_timeout(),
        )?));
    }
    if config.notify.log {
        targets.push(Arc::new(LogNotifier));
    }
    let fanout = FanoutNotifier::new(targets);
    if fanout.is_empty() {
        tracing::warn!("all notification channels are disabled");
    }
    Ok(Arc::new(fanout))
}

/// Everything a poll cycle needs, with stored state reconciled against the
/// tracked id list.
pub async fn watcher(config: &AppConfig) -> Result<Arc<Watcher>> {
    let tracked = read_tracked_ids(&config.watch.ids_file)?;
    info!(count = tracked.len(), file = %config.watch.ids_file, "tracked ids loaded");

    let notifier = notifier(config)?;
    let auth = token_manager(config).await?;
    // Authorize up front so an operator is present for the interactive flow.
    auth.get_valid_token()
        .await
        .context("could not obtain Google credentials")?;
    let drive = drive_client(config, auth)?;
    let store = StateStore::at_path(&config.watch.state_file)?;

    let watcher = Watcher::initialize(tracked, Arc::new(drive), notifier, store).await?;
    Ok(Arc::new(watcher))
}
