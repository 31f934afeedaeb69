//! Owner of the authoritative snapshot.
//!
//! All mutations go through one `&mut Synchronizer`, so events are applied in
//! the order the owning loop sees them. A refresh that is awaited inside that
//! loop therefore completes before any later live event is applied.

use chrono::Utc;
use tracing::{debug, info, warn};

use taskboard_protocol::{ChangeSet, ChartItem, Snapshot};

use crate::fetch::{FetchConfig, SnapshotFetcher};
use crate::live::LiveEvent;
use crate::store::{DiffOutcome, SnapshotStore};
use crate::SyncError;

pub struct Synchronizer {
    fetcher: Option<SnapshotFetcher>,
    store: SnapshotStore,
}

impl Synchronizer {
    /// Build a synchronizer. An empty endpoint disables fetching; the
    /// condition is logged and `refresh` reports it on every call.
    pub fn new(config: FetchConfig) -> Result<Self, SyncError> {
        let fetcher = if config.endpoint.trim().is_empty() {
            warn!(
                error = %SyncError::Config("chart endpoint URL is not set".into()),
                "Snapshot fetching disabled"
            );
            None
        } else {
            Some(SnapshotFetcher::new(config)?)
        };
        Ok(Self {
            fetcher,
            store: SnapshotStore::new(),
        })
    }

    pub fn fetch_enabled(&self) -> bool {
        self.fetcher.is_some()
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.store.snapshot()
    }

    /// Fetch a fresh snapshot and replace the current one.
    ///
    /// On failure the previous snapshot and its stamp are kept.
    pub async fn refresh(&mut self) -> Result<usize, SyncError> {
        let Some(fetcher) = &self.fetcher else {
            return Err(SyncError::Fetch("endpoint not configured".into()));
        };
        match fetcher.fetch().await {
            Ok(items) => {
                let count = items.len();
                self.store.replace(items, Utc::now());
                info!(charts = count, revision = self.store.revision(), "Snapshot refreshed");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, endpoint = fetcher.endpoint(), "Snapshot refresh failed, keeping previous data");
                Err(e)
            }
        }
    }

    /// Replace the snapshot with a pushed chart list.
    pub fn replace(&mut self, items: Vec<ChartItem>) {
        let count = items.len();
        self.store.replace(items, Utc::now());
        debug!(charts = count, "Snapshot replaced from live channel");
    }

    pub fn apply_diff(&mut self, changes: &ChangeSet) -> DiffOutcome {
        let outcome = self.store.apply_diff(changes, Utc::now());
        debug!(
            matched = outcome.matched,
            changed = outcome.changed,
            "Applied live change set"
        );
        outcome
    }

    /// Apply a data-bearing live event. Returns `true` if the snapshot moved.
    ///
    /// Status events carry no data and are left to the caller.
    pub async fn apply_live_event(&mut self, event: LiveEvent) -> bool {
        let before = self.store.revision();
        match event {
            LiveEvent::Refetch => {
                let _ = self.refresh().await;
            }
            LiveEvent::Replace(items) => self.replace(items),
            LiveEvent::Diff(changes) => {
                self.apply_diff(&changes);
            }
            LiveEvent::Status(_) => {}
        }
        self.store.revision() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use taskboard_protocol::ChartDataPoint;

    fn offline() -> Synchronizer {
        Synchronizer::new(FetchConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_without_endpoint_fails() {
        let mut sync = offline();
        assert!(!sync.fetch_enabled());
        assert!(matches!(sync.refresh().await, Err(SyncError::Fetch(_))));
        assert!(sync.snapshot().is_empty());
        assert!(sync.store().last_updated().is_none());
    }

    #[tokio::test]
    async fn test_live_events_move_snapshot() {
        let mut sync = offline();
        let replaced = sync
            .apply_live_event(LiveEvent::Replace(vec![ChartItem::new(
                "P::A",
                Some(1),
                vec![ChartDataPoint::new("Done", 1)],
            )]))
            .await;
        assert!(replaced);

        let mut changes: ChangeSet = HashMap::new();
        changes.insert("P::A".into(), HashMap::from([("Done".to_string(), 4)]));
        assert!(sync.apply_live_event(LiveEvent::Diff(changes)).await);
        assert_eq!(sync.snapshot().get("P::A").unwrap().data()[0].value, 4);

        let mut unknown: ChangeSet = HashMap::new();
        unknown.insert("P::Z".into(), HashMap::from([("Done".to_string(), 1)]));
        assert!(!sync.apply_live_event(LiveEvent::Diff(unknown)).await);
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_snapshot() {
        let mut sync = offline();
        sync.replace(vec![ChartItem::new("P::A", Some(1), vec![])]);
        let stamp = sync.store().last_updated();
        assert!(!sync.apply_live_event(LiveEvent::Refetch).await);
        assert_eq!(sync.snapshot().len(), 1);
        assert_eq!(sync.store().last_updated(), stamp);
    }
}
