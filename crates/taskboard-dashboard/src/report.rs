//! Plain-text and JSON output for the non-interactive modes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use taskboard_state::Projection;
use taskboard_sync::ChannelStatus;

use crate::dashboard::DashboardView;

#[derive(Debug, Serialize)]
struct Report<'a> {
    last_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<ChannelStatus>,
    projection: &'a Projection,
}

/// Pretty JSON of the projection with its freshness stamp.
pub fn to_json(view: &DashboardView) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&Report {
        last_updated: view.last_updated,
        channel: view.channel,
        projection: &view.projection,
    })
}

/// One-line summary, e.g. `2 bases, 3 charts: Alpha (2), Beta (1)`.
pub fn summary(view: &DashboardView) -> String {
    if let Some(reason) = view.projection.empty_reason {
        return reason.to_string();
    }
    let groups: Vec<String> = view
        .projection
        .groups
        .iter()
        .map(|g| format!("{} ({})", g.label, g.charts.len()))
        .collect();
    format!(
        "{} bases, {} charts: {}",
        view.projection.groups.len(),
        view.projection.chart_count(),
        groups.join(", ")
    )
}
