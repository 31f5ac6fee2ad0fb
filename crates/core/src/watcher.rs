use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::detect;
use crate::message;
use crate::notify::Notifier;
use crate::schedule::PeriodicTask;
use crate::snapshot::{Records, Snapshot};
use crate::source::MetadataSource;
use crate::store::StateStore;

#[derive(Debug, Clone, Copy)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    /// `None` disables the reminder task.
    pub reminder_interval: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub changed: usize,
    pub adopted: usize,
    pub refreshed: usize,
}

impl CycleReport {
    pub fn mutated(&self) -> bool {
        self.changed + self.adopted + self.refreshed > 0
    }
}

/// Owns the snapshot and drives poll and reminder cycles over it.
pub struct Watcher {
    tracked: Vec<String>,
    source: Arc<dyn MetadataSource>,
    notifier: Arc<dyn Notifier>,
    store: StateStore,
    snapshot: RwLock<Snapshot>,
}

impl Watcher {
    /// Load stored state and reconcile it against `tracked`. Newly tracked
    /// ids get a baseline from one fetch; the result is always saved.
    pub async fn initialize(
        tracked: Vec<String>,
        source: Arc<dyn MetadataSource>,
        notifier: Arc<dyn Notifier>,
        store: StateStore,
    ) -> Result<Self> {
        let stored = store.load().await?;

        let missing: Vec<String> = tracked
            .iter()
            .filter(|id| !stored.contains(id))
            .cloned()
            .collect();
        let baseline = if missing.is_empty() {
            Records::new()
        } else {
            match source.fetch(&missing).await {
                Ok(records) => records,
                Err(err) => {
                    warn!("baseline fetch failed, new ids wait for the next cycle: {err:#}");
                    Records::new()
                }
            }
        };

        let reconciled = detect::reconcile(&tracked, &stored, &baseline);
        store.save(&reconciled.snapshot).await?;
        info!(
            tracked = tracked.len(),
            added = reconciled.added.len(),
            removed = reconciled.removed.len(),
            pending = reconciled.pending.len(),
            "state reconciled"
        );
        if !reconciled.pending.is_empty() {
            warn!(ids = ?reconciled.pending, "no metadata yet for some tracked ids");
        }

        Ok(Self {
            tracked,
            source,
            notifier,
            store,
            snapshot: RwLock::new(reconciled.snapshot),
        })
    }

    pub fn tracked(&self) -> &[String] {
        &self.tracked
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    /// Fetch current metadata, notify once per change and persist the
    /// updated snapshot. The lock is only held while applying the result.
    pub async fn poll_once(&self) -> Result<CycleReport> {
        let current = self
            .source
            .fetch(&self.tracked)
            .await
            .context("metadata fetch failed")?;

        let mut report = CycleReport {
            fetched: current.len(),
            ..CycleReport::default()
        };

        let (changes, to_save) = {
            let mut snapshot = self.snapshot.write().await;
            let changes = detect::compute_changes(&self.tracked, &current, &snapshot);
            let adopted: Vec<_> = detect::adoptable(&self.tracked, &current, &snapshot).collect();

            for change in &changes {
                snapshot.insert(change.current.clone());
            }
            for record in adopted {
                debug!(id = %record.id, "adopting baseline for tracked id");
                snapshot.insert(record);
                report.adopted += 1;
            }
            report.refreshed = refresh_unchanged(&mut snapshot, &current);
            report.changed = changes.len();

            let to_save = report.mutated().then(|| snapshot.clone());
            (changes, to_save)
        };

        for change in &changes {
            info!(id = %change.current.id, name = %change.current.name, "file modified");
            if let Err(err) = self.notifier.send(&message::file_modified(&change.current)).await {
                warn!(id = %change.current.id, "notification failed: {err:#}");
            }
        }

        if let Some(snapshot) = to_save {
            self.store.save(&snapshot).await?;
        }

        Ok(report)
    }

    /// Send one aggregated message if any entry has unviewed changes.
    /// Returns how many entries it listed.
    pub async fn remind_once(&self) -> Result<usize> {
        let unviewed = {
            let snapshot = self.snapshot.read().await;
            detect::compute_unviewed(&snapshot)
        };
        if unviewed.is_empty() {
            debug!("no unviewed changes");
            return Ok(0);
        }

        self.notifier
            .send(&message::unread_updates(&unviewed))
            .await
            .context("reminder notification failed")?;
        Ok(unviewed.len())
    }

    /// Spawn the poll task and, if enabled, the reminder task.
    pub fn start(self: Arc<Self>, settings: WatchSettings) -> WatchHandle {
        let watcher = self.clone();
        let poll = PeriodicTask::start("poll", settings.poll_interval, move || {
            let watcher = watcher.clone();
            async move {
                match watcher.poll_once().await {
                    Ok(report) if report.changed > 0 => {
                        info!(changed = report.changed, "poll cycle complete")
                    }
                    Ok(report) => debug!(fetched = report.fetched, "poll cycle complete"),
                    Err(err) => error!("poll cycle abandoned: {err:#}"),
                }
            }
        });

        let reminder = settings.reminder_interval.map(|period| {
            let watcher = self.clone();
            PeriodicTask::start("reminder", period, move || {
                let watcher = watcher.clone();
                async move {
                    match watcher.remind_once().await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "reminder sent"),
                        Err(err) => error!("reminder cycle failed: {err:#}"),
                    }
                }
            })
        });

        WatchHandle { poll, reminder }
    }
}

// Entries whose modification time did not move still pick up new names and
// viewed times, so reminders clear once a file has been opened.
fn refresh_unchanged(snapshot: &mut Snapshot, current: &Records) -> usize {
    let mut refreshed = 0;
    for (id, record) in current {
        if let Some(stored) = snapshot.entries.get_mut(id)
            && stored.modified_time == record.modified_time
            && (stored.viewed_time != record.viewed_time
                || stored.name != record.name
                || stored.mime_type != record.mime_type)
        {
            stored.viewed_time = record.viewed_time;
            stored.name = record.name.clone();
            stored.mime_type = record.mime_type.clone();
            refreshed += 1;
        }
    }
    refreshed
}

pub struct WatchHandle {
    poll: PeriodicTask,
    reminder: Option<PeriodicTask>,
}

impl WatchHandle {
    pub async fn stop(self, grace: Duration) {
        self.poll.stop(grace).await;
        if let Some(reminder) = self.reminder {
            reminder.stop(grace).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ResourceRecord;
    use crate::snapshot::fixtures::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSource {
        responses: Mutex<VecDeque<Result<Records>>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FakeSource {
        fn push(&self, records: &[ResourceRecord]) {
            let map = records.iter().map(|r| (r.id.clone(), r.clone())).collect();
            self.responses.lock().unwrap().push_back(Ok(map));
        }

        fn push_err(&self) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(anyhow::anyhow!("batch request returned 503")));
        }
    }

    #[async_trait]
    impl MetadataSource for FakeSource {
        async fn fetch(&self, ids: &[String]) -> Result<Records> {
            self.calls.lock().unwrap().push(ids.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Records::new()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &str) -> Result<()> {
            self.messages.lock().unwrap().push(message.to_string());
            if self.fail {
                anyhow::bail!("telegram unreachable");
            }
            Ok(())
        }
    }

    fn tracked(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn seeded_store(dir: &tempfile::TempDir, records: &[ResourceRecord]) -> StateStore {
        let store = StateStore::at_path(dir.path().join("state.json")).unwrap();
        let mut snap = Snapshot::new();
        for r in records {
            snap.insert(r.clone());
        }
        store.save(&snap).await.unwrap();
        store
    }

    async fn stored(dir: &tempfile::TempDir) -> Snapshot {
        StateStore::at_path(dir.path().join("state.json"))
            .unwrap()
            .load()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn initialize_reconciles_without_notifying() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(
            &dir,
            &[
                record("a", "2024-01-01T00:00:00Z"),
                record("stale", "2024-01-01T00:00:00Z"),
            ],
        )
        .await;
        let source = Arc::new(FakeSource::default());
        source.push(&[record("b", "2024-01-03T00:00:00Z")]);
        let notifier = Arc::new(RecordingNotifier::default());

        let watcher = Watcher::initialize(tracked(&["a", "b"]), source.clone(), notifier.clone(), store)
            .await
            .unwrap();

        assert_eq!(source.calls.lock().unwrap()[0], tracked(&["b"]));
        let snap = watcher.snapshot().await;
        assert_eq!(snap.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(stored(&dir).await, snap);
        assert!(notifier.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn poll_notifies_changes_but_not_new_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir, &[record("a", "2024-01-01T00:00:00Z")]).await;
        let source = Arc::new(FakeSource::default());
        // Baseline fetch for b fails, so b is pending until the first poll.
        source.push_err();
        source.push(&[
            record("a", "2024-01-02T00:00:00Z"),
            record("b", "2024-01-03T00:00:00Z"),
        ]);
        let notifier = Arc::new(RecordingNotifier::default());

        let watcher = Watcher::initialize(tracked(&["a", "b"]), source, notifier.clone(), store)
            .await
            .unwrap();
        assert_eq!(watcher.snapshot().await.len(), 1);

        let report = watcher.poll_once().await.unwrap();
        assert_eq!(report.changed, 1);
        assert_eq!(report.adopted, 1);

        let messages = notifier.messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("a.xlsx modified at"));

        let snap = stored(&dir).await;
        assert_eq!(snap.get("a").unwrap().modified_time, ts("2024-01-02T00:00:00Z"));
        assert!(snap.contains("b"));
    }

    #[tokio::test]
    async fn failed_fetch_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir, &[record("a", "2024-01-01T00:00:00Z")]).await;
        let source = Arc::new(FakeSource::default());
        source.push_err();
        source.push(&[record("a", "2024-01-05T00:00:00Z")]);
        let notifier = Arc::new(RecordingNotifier::default());
        let watcher = Watcher::initialize(tracked(&["a"]), source, notifier.clone(), store)
            .await
            .unwrap();

        assert!(watcher.poll_once().await.is_err());
        assert_eq!(
            watcher.snapshot().await.get("a").unwrap().modified_time,
            ts("2024-01-01T00:00:00Z")
        );
        assert!(notifier.messages.lock().unwrap().is_empty());

        let report = watcher.poll_once().await.unwrap();
        assert_eq!(report.changed, 1);
    }

    #[tokio::test]
    async fn notifier_failure_does_not_lose_the_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir, &[record("a", "2024-01-01T00:00:00Z")]).await;
        let source = Arc::new(FakeSource::default());
        source.push(&[record("a", "2024-01-02T00:00:00Z")]);
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let watcher = Watcher::initialize(tracked(&["a"]), source, notifier, store)
            .await
            .unwrap();

        watcher.poll_once().await.unwrap();
        assert_eq!(
            stored(&dir).await.get("a").unwrap().modified_time,
            ts("2024-01-02T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn viewing_a_file_clears_its_reminder() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(
            &dir,
            &[viewed("a", "2024-01-02T00:00:00Z", "2024-01-01T00:00:00Z")],
        )
        .await;
        let source = Arc::new(FakeSource::default());
        source.push(&[viewed("a", "2024-01-02T00:00:00Z", "2024-01-03T00:00:00Z")]);
        let notifier = Arc::new(RecordingNotifier::default());
        let watcher = Watcher::initialize(tracked(&["a"]), source, notifier.clone(), store)
            .await
            .unwrap();

        assert_eq!(watcher.remind_once().await.unwrap(), 1);
        assert!(notifier.messages.lock().unwrap()[0].starts_with("🤖 Unread updates:"));

        let report = watcher.poll_once().await.unwrap();
        assert_eq!(report.changed, 0);
        assert_eq!(report.refreshed, 1);
        assert_eq!(watcher.remind_once().await.unwrap(), 0);
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn started_watcher_polls_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir, &[record("a", "2024-01-01T00:00:00Z")]).await;
        let source = Arc::new(FakeSource::default());
        source.push(&[record("a", "2024-01-02T00:00:00Z")]);
        let notifier = Arc::new(RecordingNotifier::default());
        let watcher = Arc::new(
            Watcher::initialize(tracked(&["a"]), source, notifier.clone(), store)
                .await
                .unwrap(),
        );

        let handle = watcher.clone().start(WatchSettings {
            poll_interval: Duration::from_secs(3600),
            reminder_interval: None,
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop(Duration::from_secs(1)).await;

        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
    }
}
