use chrono::{DateTime, Utc};

use taskboard_protocol::{ChangeSet, ChartItem, Snapshot};

/// Result of applying a change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffOutcome {
    /// Labels whose value was overwritten (including same-value writes).
    pub matched: usize,
    /// Values that actually changed.
    pub changed: usize,
}

/// Overwrite matching `title -> label` values and return the new snapshot.
///
/// Charts missing from `changes` and labels missing from a chart's changes
/// are left untouched. No chart or label is ever added or removed, and
/// re-applying the same change set is a no-op.
pub fn apply_diff(snapshot: &Snapshot, changes: &ChangeSet) -> (Snapshot, DiffOutcome) {
    let mut next = snapshot.clone();
    let mut outcome = DiffOutcome::default();

    for entry in next.entries_mut() {
        let Some(label_changes) = changes.get(entry.title()) else {
            continue;
        };
        for point in entry.data_mut() {
            if let Some(&value) = label_changes.get(&point.label) {
                outcome.matched += 1;
                if point.value != value {
                    point.value = value;
                    outcome.changed += 1;
                }
            }
        }
    }

    (next, outcome)
}

/// The synchronizer's owned copy of the data plus its freshness stamp.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    snapshot: Snapshot,
    last_updated: Option<DateTime<Utc>>,
    revision: u64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Increments on every accepted replacement or effective diff.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace the whole snapshot and stamp the time.
    pub fn replace(&mut self, items: Vec<ChartItem>, at: DateTime<Utc>) {
        self.snapshot = Snapshot::from_items(items);
        self.last_updated = Some(at);
        self.revision += 1;
    }

    /// Apply a change set. The stamp moves only if at least one label matched.
    pub fn apply_diff(&mut self, changes: &ChangeSet, at: DateTime<Utc>) -> DiffOutcome {
        let (next, outcome) = apply_diff(&self.snapshot, changes);
        if outcome.matched > 0 {
            self.snapshot = next;
            self.last_updated = Some(at);
            self.revision += 1;
        }
        outcome
    }
}
