use serde::{Deserialize, Serialize};

use taskboard_protocol::ChartDataPoint;

/// One labelled slice of a chart with its share of the total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointShare {
    pub label: String,
    pub value: u64,
    /// Whole percent, rounded half up. 0 for every point of an empty chart.
    pub percent: u32,
}

/// Totals and per-point percentages for one chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub total: u64,
    pub points: Vec<PointShare>,
}

impl Aggregate {
    /// Sum of the rounded percentages. Not necessarily 100.
    pub fn percent_sum(&self) -> u32 {
        self.points.iter().map(|p| p.percent).sum()
    }
}

/// Compute the total and the rounded percentage of every point.
///
/// With a zero total every percentage is 0. Rounding is applied per point, so
/// a chart with several slices may sum to 99 or 101.
pub fn compute_aggregate(points: &[ChartDataPoint]) -> Aggregate {
    let total: u64 = points.iter().map(|p| p.value).sum();
    let points = points
        .iter()
        .map(|p| PointShare {
            label: p.label.clone(),
            value: p.value,
            percent: percent_of(p.value, total),
        })
        .collect();
    Aggregate { total, points }
}

/// `round(100 * value / total)` in integer arithmetic, half rounded up.
pub fn percent_of(value: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let scaled = (value as u128 * 200 + total as u128) / (total as u128 * 2);
    scaled.min(u32::MAX as u128) as u32
}
