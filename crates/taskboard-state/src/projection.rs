//! Snapshot + selection + order -> ordered, aggregated render structure.
//!
//! The projection is a pure function of its inputs: running it twice on the
//! same snapshot and state yields the same output.
//!
//! Steps:
//! 1. Keep charts whose base is selected.
//! 2. Fold every subtask (`slot == None`) into the nearest preceding sloted
//!    chart of the same base, summing values by label.
//! 3. Group by base and sort each group by slot (stable).
//! 4. Order the groups by the reconciled base order.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use taskboard_protocol::{display_base, ChartDataPoint, Snapshot};

use crate::aggregate::{compute_aggregate, Aggregate};
use crate::order::BaseOrder;
use crate::selection::Selection;

/// Distinct base names in first-seen order.
pub fn list_bases(snapshot: &Snapshot) -> Vec<String> {
    let mut seen = HashSet::new();
    snapshot
        .entries()
        .iter()
        .filter(|e| seen.insert(e.base()))
        .map(|e| e.base().to_string())
        .collect()
}

/// One chart ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderChart {
    pub title: String,
    pub name: String,
    pub slot: i64,
    /// Data after subtask folding.
    pub data: Vec<ChartDataPoint>,
    /// Titles of the subtasks folded into this chart.
    pub folded_subtasks: Vec<String>,
    pub aggregate: Aggregate,
}

/// All charts of one base, in slot order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseGroup {
    pub base: String,
    pub label: String,
    pub charts: Vec<RenderChart>,
}

/// Why a projection has no groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    /// The selection is the explicit "nothing selected" state.
    NoBasesSelected,
    /// The snapshot is empty or no chart matches the selection.
    NoData,
}

impl std::fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoBasesSelected => "no bases selected",
            Self::NoData => "no data",
        };
        write!(f, "{s}")
    }
}

/// Render-ready output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub groups: Vec<BaseGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_reason: Option<EmptyReason>,
}

impl Projection {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Base names in display order.
    pub fn bases(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.base.clone()).collect()
    }

    pub fn chart_count(&self) -> usize {
        self.groups.iter().map(|g| g.charts.len()).sum()
    }
}

struct Pending {
    base: String,
    title: String,
    name: String,
    slot: i64,
    data: Vec<ChartDataPoint>,
    folded: Vec<String>,
}

pub fn project(snapshot: &Snapshot, selection: &Selection, order: &BaseOrder) -> Projection {
    let mut pending: Vec<Pending> = Vec::new();
    let mut last_sloted: HashMap<&str, usize> = HashMap::new();

    for entry in snapshot.entries() {
        let base = entry.base();
        if !selection.includes(base) {
            continue;
        }

        match entry.slot() {
            Some(slot) => {
                last_sloted.insert(base, pending.len());
                pending.push(Pending {
                    base: base.to_string(),
                    title: entry.title().to_string(),
                    name: entry.key().name.clone(),
                    slot,
                    data: entry.data().to_vec(),
                    folded: Vec::new(),
                });
            }
            None => match last_sloted.get(base) {
                Some(&idx) => {
                    let target = &mut pending[idx];
                    fold_points(&mut target.data, entry.data());
                    target.folded.push(entry.title().to_string());
                }
                None => {
                    tracing::debug!(
                        title = %entry.title(),
                        "Dropping subtask chart with no preceding sloted chart"
                    );
                }
            },
        }
    }

    let mut present: Vec<String> = Vec::new();
    let mut by_base: HashMap<String, Vec<RenderChart>> = HashMap::new();
    for p in pending {
        let charts = by_base.entry(p.base.clone()).or_insert_with(|| {
            present.push(p.base.clone());
            Vec::new()
        });
        let aggregate = compute_aggregate(&p.data);
        charts.push(RenderChart {
            title: p.title,
            name: p.name,
            slot: p.slot,
            data: p.data,
            folded_subtasks: p.folded,
            aggregate,
        });
    }

    let mut groups = Vec::with_capacity(present.len());
    for base in order.reconcile(&present) {
        let Some(mut charts) = by_base.remove(&base) else {
            continue;
        };
        if charts.is_empty() {
            continue;
        }
        charts.sort_by_key(|c| c.slot);
        groups.push(BaseGroup {
            label: display_base(&base).to_string(),
            base,
            charts,
        });
    }

    let empty_reason = if groups.is_empty() {
        Some(if selection.is_none() {
            EmptyReason::NoBasesSelected
        } else {
            EmptyReason::NoData
        })
    } else {
        None
    };

    Projection {
        groups,
        empty_reason,
    }
}

/// Sum `extra` into `target` by label; unknown labels are appended.
fn fold_points(target: &mut Vec<ChartDataPoint>, extra: &[ChartDataPoint]) {
    for point in extra {
        match target.iter_mut().find(|p| p.label == point.label) {
            Some(existing) => existing.value = existing.value.saturating_add(point.value),
            None => target.push(point.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskboard_protocol::ChartItem;

    #[test]
    fn test_fold_points_sums_matching_labels() {
        let mut target = vec![ChartDataPoint::new("Done", 2), ChartDataPoint::new("Open", 1)];
        fold_points(
            &mut target,
            &[ChartDataPoint::new("Open", 4), ChartDataPoint::new("Blocked", 1)],
        );
        assert_eq!(
            target,
            vec![
                ChartDataPoint::new("Done", 2),
                ChartDataPoint::new("Open", 5),
                ChartDataPoint::new("Blocked", 1),
            ]
        );
    }

    #[test]
    fn test_orphan_subtask_is_dropped() {
        let snapshot = Snapshot::from_items(vec![
            ChartItem::new("P::Sub", None, vec![ChartDataPoint::new("Done", 1)]),
            ChartItem::new("P::A", Some(1), vec![ChartDataPoint::new("Done", 1)]),
        ]);
        let projection = project(&snapshot, &Selection::All, &BaseOrder::default());
        assert_eq!(projection.chart_count(), 1);
        assert_eq!(projection.groups[0].charts[0].aggregate.total, 1);
    }

    #[test]
    fn test_subtask_does_not_cross_bases() {
        let snapshot = Snapshot::from_items(vec![
            ChartItem::new("P::A", Some(1), vec![ChartDataPoint::new("Done", 1)]),
            ChartItem::new("Q::B", Some(1), vec![ChartDataPoint::new("Done", 1)]),
            ChartItem::new("P::Sub", None, vec![ChartDataPoint::new("Done", 5)]),
        ]);
        let projection = project(&snapshot, &Selection::All, &BaseOrder::default());
        let p = &projection.groups[0];
        assert_eq!(p.base, "P");
        assert_eq!(p.charts[0].aggregate.total, 6);
        assert_eq!(projection.groups[1].charts[0].aggregate.total, 1);
    }
}
