//! Pure comparison of fetched metadata against the stored snapshot.

use std::collections::HashSet;

use crate::snapshot::{ChangeEvent, Records, ResourceRecord, Snapshot};

/// Outcome of aligning a snapshot with the tracked id list.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub snapshot: Snapshot,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Tracked ids with neither a stored entry nor a baseline record.
    pub pending: Vec<String>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Add baseline entries for newly tracked ids and drop entries that are no
/// longer tracked. Never yields change events.
pub fn reconcile(tracked: &[String], snapshot: &Snapshot, baseline: &Records) -> Reconciliation {
    let wanted: HashSet<&str> = tracked.iter().map(String::as_str).collect();
    let mut updated = snapshot.clone();
    let mut added = Vec::new();
    let mut pending = Vec::new();

    let removed: Vec<String> = snapshot
        .ids()
        .filter(|id| !wanted.contains(id))
        .map(str::to_string)
        .collect();
    for id in &removed {
        updated.remove(id);
    }

    for id in tracked {
        if updated.contains(id) || added.contains(id) || pending.contains(id) {
            continue;
        }
        match baseline.get(id) {
            Some(record) => {
                updated.insert(with_id(id, record));
                added.push(id.clone());
            }
            None => pending.push(id.clone()),
        }
    }

    Reconciliation {
        snapshot: updated,
        added,
        removed,
        pending,
    }
}

/// One event per id present in both maps whose modification time differs,
/// in `order`. Ids missing from `previous` are never reported.
pub fn compute_changes(order: &[String], current: &Records, previous: &Snapshot) -> Vec<ChangeEvent> {
    let mut seen = HashSet::new();
    order
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .filter_map(|id| {
            let current = current.get(id)?;
            let previous = previous.get(id)?;
            (current.modified_time != previous.modified_time).then(|| ChangeEvent {
                previous: previous.clone(),
                current: with_id(id, current),
            })
        })
        .collect()
}

/// Entries modified strictly after the user last viewed them.
pub fn compute_unviewed(snapshot: &Snapshot) -> Vec<ResourceRecord> {
    snapshot
        .records()
        .filter(|record| record.is_unviewed())
        .cloned()
        .collect()
}

/// Fetched records for tracked ids the snapshot does not hold yet.
pub fn adoptable<'a>(
    tracked: &'a [String],
    current: &'a Records,
    snapshot: &'a Snapshot,
) -> impl Iterator<Item = ResourceRecord> + 'a {
    let mut seen = HashSet::new();
    tracked
        .iter()
        .filter(move |id| seen.insert(id.as_str()))
        .filter(move |id| !snapshot.contains(id))
        .filter_map(move |id| current.get(id).map(|record| with_id(id, record)))
}

// The snapshot is keyed by the requested id, whatever the body echoed back.
fn with_id(id: &str, record: &ResourceRecord) -> ResourceRecord {
    if record.id == id {
        record.clone()
    } else {
        ResourceRecord {
            id: id.to_string(),
            ..record.clone()
        }
    }
}
