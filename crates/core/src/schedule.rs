use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Period used in place of a zero period.
pub const FALLBACK_PERIOD: Duration = Duration::from_secs(1);

/// A job run on a fixed period until stopped.
///
/// The first run starts immediately. Runs never overlap: a run that outlasts
/// the period makes the scheduler skip the ticks it missed.
pub struct PeriodicTask {
    name: &'static str,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn start<F, Fut>(name: &'static str, period: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = if period.is_zero() {
            warn!(task = name, "zero period, running every {FALLBACK_PERIOD:?} instead");
            FALLBACK_PERIOD
        } else {
            period
        };
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => job().await,
                }
            }
            debug!(task = name, "periodic task stopped");
        });
        debug!(task = name, period_secs = period.as_secs_f64(), "periodic task started");
        Self { name, stop, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task and wait for the current run to finish. A run still
    /// going after `grace` is aborted.
    pub async fn stop(self, grace: Duration) {
        let _ = self.stop.send(true);
        let abort = self.handle.abort_handle();
        if tokio::time::timeout(grace, self.handle).await.is_err() {
            warn!(task = self.name, "run did not finish in time, aborting");
            abort.abort();
        }
    }
}
