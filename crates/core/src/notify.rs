use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Outbound notification transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Writes notifications to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        info!(target: "drivewatch::notification", "{message}");
        Ok(())
    }
}
