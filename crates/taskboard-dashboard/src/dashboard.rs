//! The owning event loop.
//!
//! [`Dashboard`] owns the synchronizer, the view state and the live channel
//! handle. Everything that changes them arrives through one `select!` loop:
//! user actions, live-channel events and the optional refresh timer. Each
//! change publishes a fresh [`DashboardView`] on a `watch` channel for the
//! renderer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use taskboard_protocol::{display_base, Snapshot};
use taskboard_state::{Projection, Selection, SelectionToggle, ViewState};
use taskboard_sync::{
    connect_live, ChannelState, ChannelStatus, LiveEvent, LiveHandle, SyncError, Synchronizer,
};

use crate::config::DashboardConfig;
use crate::tui::{LogCategory, LogEntry};

const MAX_LOG_ENTRIES: usize = 1000;
/// Log entries carried in each published view.
const VIEW_LOG_ENTRIES: usize = 200;

/// Operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    ToggleBase(String),
    ToggleAll,
    /// Indices into the displayed base list.
    MoveBase { from: usize, to: usize },
    Refresh,
    Reconnect,
    Quit,
}

/// One row of the base picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BasePick {
    pub base: String,
    pub label: String,
    pub selected: bool,
}

/// Everything the renderer needs, detached from the loop's state.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub projection: Projection,
    pub bases: Vec<BasePick>,
    pub selection: Selection,
    pub channel: Option<ChannelStatus>,
    pub live_enabled: bool,
    pub fetch_enabled: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub revision: u64,
    pub log: Vec<LogEntry>,
}

impl DashboardView {
    /// Base names in display order; move indices address this list.
    pub fn displayed_bases(&self) -> Vec<String> {
        self.projection.bases()
    }
}

pub struct Dashboard {
    config: DashboardConfig,
    sync: Synchronizer,
    view: ViewState,
    channel: Option<ChannelStatus>,
    live_enabled: bool,
    event_log: Vec<LogEntry>,
    publisher: watch::Sender<DashboardView>,
}

impl Dashboard {
    pub fn new(config: DashboardConfig) -> Result<Self, SyncError> {
        let sync = Synchronizer::new(config.fetch_config())?;
        let live_enabled = config.live_config().is_ok();
        let mut dashboard = Self {
            config,
            sync,
            view: ViewState::new(),
            channel: None,
            live_enabled,
            event_log: Vec::new(),
            publisher: watch::channel(empty_view()).0,
        };
        dashboard.publish();
        Ok(dashboard)
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardView> {
        self.publisher.subscribe()
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.sync.snapshot()
    }

    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    /// Build the render view from the current state.
    pub fn view(&self) -> DashboardView {
        let snapshot = self.sync.snapshot();
        let bases = self
            .view
            .base_picker(snapshot)
            .into_iter()
            .map(|(base, selected)| BasePick {
                label: display_base(&base).to_string(),
                base,
                selected,
            })
            .collect();
        let start = self.event_log.len().saturating_sub(VIEW_LOG_ENTRIES);
        DashboardView {
            projection: self.view.project(snapshot),
            bases,
            selection: self.view.selection.clone(),
            channel: self.channel,
            live_enabled: self.live_enabled,
            fetch_enabled: self.sync.fetch_enabled(),
            last_updated: self.sync.store().last_updated(),
            revision: self.sync.store().revision(),
            log: self.event_log[start..].to_vec(),
        }
    }

    fn publish(&mut self) {
        let view = self.view();
        self.publisher.send_replace(view);
    }

    /// Push a log entry, capping the log at 1000 entries.
    pub fn push_log(&mut self, category: LogCategory, message: String) {
        if self.event_log.len() >= MAX_LOG_ENTRIES {
            self.event_log.remove(0);
        }
        self.event_log.push(LogEntry {
            timestamp: Utc::now(),
            category,
            message,
        });
    }

    /// Fetch a fresh snapshot. Failures keep the previous data.
    pub async fn refresh(&mut self) -> Result<usize, SyncError> {
        let result = self.sync.refresh().await;
        match &result {
            Ok(count) => {
                self.view.observe_snapshot(self.sync.snapshot());
                self.push_log(LogCategory::Data, format!("Fetched {count} charts"));
            }
            Err(e) => self.push_log(LogCategory::Error, format!("Refresh failed: {e}")),
        }
        self.publish();
        result
    }

    /// Apply a view-only action (selection and ordering).
    pub fn apply_action(&mut self, action: &UserAction) {
        let snapshot = self.sync.snapshot();
        let message = match action {
            UserAction::ToggleBase(base) => {
                self.view
                    .toggle(&SelectionToggle::Base(base.clone()), snapshot);
                format!("Toggled base {}", display_base(base))
            }
            UserAction::ToggleAll => {
                self.view.toggle(&SelectionToggle::All, snapshot);
                match self.view.selection {
                    Selection::None => "Deselected all bases".to_string(),
                    _ => "Selected all bases".to_string(),
                }
            }
            UserAction::MoveBase { from, to } => {
                self.view.move_base(*from, *to, snapshot);
                format!("Moved base from position {from} to {to}")
            }
            UserAction::Refresh | UserAction::Reconnect | UserAction::Quit => return,
        };
        debug!(?action, selection = ?self.view.selection, "View state updated");
        self.push_log(LogCategory::View, message);
        self.publish();
    }

    pub async fn apply_live_event(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Status(status) => self.observe_channel(status),
            event => {
                let kind = match &event {
                    LiveEvent::Refetch => "refetch",
                    LiveEvent::Replace(_) => "replace",
                    LiveEvent::Diff(_) => "diff",
                    LiveEvent::Status(_) => "status",
                };
                let refetch = matches!(event, LiveEvent::Refetch);
                if self.sync.apply_live_event(event).await {
                    self.view.observe_snapshot(self.sync.snapshot());
                    self.push_log(LogCategory::Data, format!("Live update ({kind})"));
                } else if refetch {
                    self.push_log(
                        LogCategory::Error,
                        "Live update requested a refresh that failed".to_string(),
                    );
                }
            }
        }
        self.publish();
    }

    fn observe_channel(&mut self, status: ChannelStatus) {
        let previous = self.channel.replace(status);
        if previous.map(|p| (p.state, p.exhausted)) == Some((status.state, status.exhausted)) {
            return;
        }
        let message = match (status.state, status.exhausted, status.retry_in_ms) {
            (ChannelState::Connected, _, _) => "Live channel connected".to_string(),
            (ChannelState::Connecting, _, _) => "Live channel connecting".to_string(),
            (ChannelState::Disconnected, true, _) => format!(
                "Live channel gave up after {} attempts, press c to reconnect",
                status.attempt
            ),
            (ChannelState::Disconnected, false, Some(ms)) => format!(
                "Live channel lost, attempt {} in {}",
                status.attempt,
                format_delay(Duration::from_millis(ms))
            ),
            (ChannelState::Disconnected, false, None) => "Live channel closed".to_string(),
        };
        let category = if status.exhausted {
            LogCategory::Error
        } else {
            LogCategory::Channel
        };
        self.push_log(category, message);
    }

    /// Run until `Quit` arrives or the action sender is dropped.
    pub async fn run(mut self, mut actions: mpsc::Receiver<UserAction>) -> anyhow::Result<()> {
        self.push_log(LogCategory::System, "Dashboard started".to_string());
        if self.sync.fetch_enabled() {
            let _ = self.refresh().await;
        } else {
            self.push_log(
                LogCategory::Error,
                "Chart endpoint not configured, fetching disabled".to_string(),
            );
            self.publish();
        }

        let (events_tx, events_rx) = mpsc::channel(64);
        let mut live: Option<LiveHandle> = match self.config.live_config() {
            Ok(live_config) => Some(connect_live(live_config, events_tx)),
            Err(e) => {
                warn!(error = %e, "Live channel disabled");
                self.push_log(LogCategory::Channel, format!("Live channel disabled: {e}"));
                self.publish();
                None
            }
        };
        let mut events_rx = live.as_ref().map(|_| events_rx);

        let mut refresh_tick = self.config.refresh_interval().map(|period| {
            tokio::time::interval_at(tokio::time::Instant::now() + period, period)
        });

        info!(
            fetch = self.sync.fetch_enabled(),
            live = live.is_some(),
            "Dashboard is running"
        );

        loop {
            tokio::select! {
                action = actions.recv() => match action {
                    None | Some(UserAction::Quit) => break,
                    Some(UserAction::Refresh) => {
                        let _ = self.refresh().await;
                    }
                    Some(UserAction::Reconnect) => {
                        match &live {
                            Some(handle) => {
                                if let Err(e) = handle.reconnect().await {
                                    warn!(error = %e, "Manual reconnect failed");
                                    self.push_log(LogCategory::Error, format!("Reconnect failed: {e}"));
                                } else {
                                    self.push_log(LogCategory::Channel, "Manual reconnect".to_string());
                                }
                            }
                            None => self.push_log(
                                LogCategory::Channel,
                                "Live channel is not configured".to_string(),
                            ),
                        }
                        self.publish();
                    }
                    Some(action) => self.apply_action(&action),
                },
                Some(event) = next_live_event(&mut events_rx) => {
                    self.apply_live_event(event).await;
                }
                _ = next_tick(&mut refresh_tick) => {
                    let _ = self.refresh().await;
                }
            }
        }

        // Nobody drains the events from here on; a blocked sender must see the
        // receiver go away.
        drop(events_rx.take());
        if let Some(handle) = live.take() {
            handle.shutdown().await;
        }
        self.push_log(LogCategory::System, "Dashboard stopped".to_string());
        self.publish();
        info!("Dashboard stopped");
        Ok(())
    }
}

fn empty_view() -> DashboardView {
    DashboardView {
        projection: taskboard_state::project(
            &Snapshot::new(),
            &Selection::All,
            &Default::default(),
        ),
        bases: Vec::new(),
        selection: Selection::All,
        channel: None,
        live_enabled: false,
        fetch_enabled: false,
        last_updated: None,
        revision: 0,
        log: Vec::new(),
    }
}

async fn next_live_event(rx: &mut Option<mpsc::Receiver<LiveEvent>>) -> Option<LiveEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

pub fn format_delay(delay: Duration) -> String {
    if delay.as_millis() < 1_000 {
        format!("{}ms", delay.as_millis())
    } else {
        format!("{}s", delay.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use taskboard_protocol::{ChartDataPoint, ChartItem};
    use taskboard_state::EmptyReason;

    fn offline() -> Dashboard {
        Dashboard::new(DashboardConfig::default()).unwrap()
    }

    fn charts() -> Vec<ChartItem> {
        vec![
            ChartItem::new(
                "Alpha::one",
                Some(1),
                vec![ChartDataPoint::new("Done", 3), ChartDataPoint::new("Not started", 1)],
            ),
            ChartItem::new("Beta::two", Some(1), vec![ChartDataPoint::new("Done", 1)]),
            ChartItem::new("Gamma::three", Some(1), vec![ChartDataPoint::new("Done", 2)]),
        ]
    }

    #[tokio::test]
    async fn test_replace_publishes_projection() {
        let mut dashboard = offline();
        let rx = dashboard.subscribe();
        dashboard.apply_live_event(LiveEvent::Replace(charts())).await;

        let view = rx.borrow().clone();
        assert_eq!(view.displayed_bases(), vec!["Alpha", "Beta", "Gamma"]);
        assert_eq!(view.bases.len(), 3);
        assert!(view.last_updated.is_some());
        assert_eq!(view.projection.groups[0].charts[0].aggregate.total, 4);
    }

    #[tokio::test]
    async fn test_selection_actions() {
        let mut dashboard = offline();
        dashboard.apply_live_event(LiveEvent::Replace(charts())).await;

        dashboard.apply_action(&UserAction::ToggleAll);
        let view = dashboard.view();
        assert!(view.projection.is_empty());
        assert_eq!(view.projection.empty_reason, Some(EmptyReason::NoBasesSelected));

        dashboard.apply_action(&UserAction::ToggleBase("Beta".into()));
        assert_eq!(dashboard.view().displayed_bases(), vec!["Beta"]);
        assert!(dashboard.view().bases.iter().any(|b| b.base == "Beta" && b.selected));
        assert!(dashboard.view().bases.iter().any(|b| b.base == "Alpha" && !b.selected));

        let view_log: Vec<String> = dashboard
            .view()
            .log
            .iter()
            .filter(|e| e.category == LogCategory::View)
            .map(|e| e.message.clone())
            .collect();
        assert_eq!(view_log, vec!["Deselected all bases", "Toggled base Beta"]);
    }

    #[tokio::test]
    async fn test_move_base_reorders_display() {
        let mut dashboard = offline();
        dashboard.apply_live_event(LiveEvent::Replace(charts())).await;
        dashboard.apply_action(&UserAction::MoveBase { from: 2, to: 0 });
        assert_eq!(
            dashboard.view().displayed_bases(),
            vec!["Gamma", "Alpha", "Beta"]
        );

        // Order survives a full replacement.
        dashboard.apply_live_event(LiveEvent::Replace(charts())).await;
        assert_eq!(
            dashboard.view().displayed_bases(),
            vec!["Gamma", "Alpha", "Beta"]
        );
    }

    #[tokio::test]
    async fn test_diff_updates_aggregate() {
        let mut dashboard = offline();
        dashboard.apply_live_event(LiveEvent::Replace(charts())).await;
        let mut changes = HashMap::new();
        changes.insert(
            "Alpha::one".to_string(),
            HashMap::from([("Not started".to_string(), 3u64)]),
        );
        dashboard.apply_live_event(LiveEvent::Diff(changes)).await;

        let view = dashboard.view();
        let aggregate = &view.projection.groups[0].charts[0].aggregate;
        assert_eq!(aggregate.total, 6);
        assert_eq!(aggregate.points[0].percent, 50);
    }

    #[tokio::test]
    async fn test_channel_status_logged_once_per_transition() {
        let mut dashboard = offline();
        let connected = ChannelStatus {
            state: ChannelState::Connected,
            attempt: 0,
            exhausted: false,
            retry_in_ms: None,
        };
        dashboard.apply_live_event(LiveEvent::Status(connected)).await;
        dashboard.apply_live_event(LiveEvent::Status(connected)).await;
        let channel_logs = dashboard
            .view()
            .log
            .iter()
            .filter(|e| e.category == LogCategory::Channel)
            .count();
        assert_eq!(channel_logs, 1);

        dashboard
            .apply_live_event(LiveEvent::Status(ChannelStatus {
                state: ChannelState::Disconnected,
                attempt: 10,
                exhausted: true,
                retry_in_ms: None,
            }))
            .await;
        let view = dashboard.view();
        assert!(view.channel.unwrap().exhausted);
        assert_eq!(view.log.last().unwrap().category, LogCategory::Error);
    }

    #[test]
    fn test_log_is_capped() {
        let mut dashboard = offline();
        for i in 0..(MAX_LOG_ENTRIES + 5) {
            dashboard.push_log(LogCategory::System, format!("entry {i}"));
        }
        assert_eq!(dashboard.event_log.len(), MAX_LOG_ENTRIES);
        assert_eq!(dashboard.event_log[0].message, "entry 5");
        assert_eq!(dashboard.view().log.len(), VIEW_LOG_ENTRIES);
    }

    #[test]
    fn test_format_delay() {
        assert_eq!(format_delay(Duration::from_millis(250)), "250ms");
        assert_eq!(format_delay(Duration::from_secs(4)), "4s");
    }
}
