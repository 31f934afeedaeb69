use serde::{Deserialize, Serialize};

use crate::constants::{BASE_SEPARATOR, UNGROUPED_BASE_LABEL};

/// Count of items in one status category (e.g. "Done" = 3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartDataPoint {
    pub label: String,
    pub value: u64,
}

impl ChartDataPoint {
    pub fn new(label: impl Into<String>, value: u64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// One donut chart as served by the task-status API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartItem {
    /// Compound key `"<base>::<name>"`.
    pub title: String,
    /// Ordering key within the base. `None` marks a subtask that is folded
    /// into the nearest preceding sloted chart of the same base.
    #[serde(default)]
    pub slot: Option<i64>,
    #[serde(default)]
    pub data: Vec<ChartDataPoint>,
}

impl ChartItem {
    pub fn new(title: impl Into<String>, slot: Option<i64>, data: Vec<ChartDataPoint>) -> Self {
        Self {
            title: title.into(),
            slot,
            data,
        }
    }

    pub fn is_subtask(&self) -> bool {
        self.slot.is_none()
    }
}

/// Parsed form of a chart title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChartKey {
    /// Empty when the title has no separator.
    pub base: String,
    pub name: String,
}

impl ChartKey {
    /// Split a title on the first `::`.
    ///
    /// A title without the separator becomes an unnamed base: the whole
    /// title is the chart name and the base is the empty bucket.
    pub fn parse(title: &str) -> Self {
        match title.split_once(BASE_SEPARATOR) {
            Some((base, name)) => Self {
                base: base.to_string(),
                name: name.to_string(),
            },
            None => Self {
                base: String::new(),
                name: title.to_string(),
            },
        }
    }

    pub fn is_ungrouped(&self) -> bool {
        self.base.is_empty()
    }

    /// Base name as shown to the user.
    pub fn base_label(&self) -> &str {
        display_base(&self.base)
    }
}

impl std::fmt::Display for ChartKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.base, BASE_SEPARATOR, self.name)
    }
}

/// Display label for a base name, substituting the ungrouped bucket.
pub fn display_base(base: &str) -> &str {
    if base.is_empty() {
        UNGROUPED_BASE_LABEL
    } else {
        base
    }
}

/// A chart item together with its key, parsed once on ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartEntry {
    key: ChartKey,
    item: ChartItem,
}

impl ChartEntry {
    pub fn new(item: ChartItem) -> Self {
        Self {
            key: ChartKey::parse(&item.title),
            item,
        }
    }

    pub fn key(&self) -> &ChartKey {
        &self.key
    }

    pub fn base(&self) -> &str {
        &self.key.base
    }

    pub fn item(&self) -> &ChartItem {
        &self.item
    }

    pub fn title(&self) -> &str {
        &self.item.title
    }

    pub fn slot(&self) -> Option<i64> {
        self.item.slot
    }

    pub fn data(&self) -> &[ChartDataPoint] {
        &self.item.data
    }

    /// Mutable access to the point values. A slice cannot grow or shrink, so
    /// the set of labels stays fixed.
    pub fn data_mut(&mut self) -> &mut [ChartDataPoint] {
        &mut self.item.data
    }
}

/// The full in-memory copy of chart data as last synchronized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    entries: Vec<ChartEntry>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<ChartItem>) -> Self {
        Self {
            entries: items.into_iter().map(ChartEntry::new).collect(),
        }
    }

    pub fn entries(&self) -> &[ChartEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ChartEntry] {
        &mut self.entries
    }

    pub fn get(&self, title: &str) -> Option<&ChartEntry> {
        self.entries.iter().find(|e| e.title() == title)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_items(&self) -> Vec<ChartItem> {
        self.entries.iter().map(|e| e.item.clone()).collect()
    }
}

impl From<Vec<ChartItem>> for Snapshot {
    fn from(items: Vec<ChartItem>) -> Self {
        Self::from_items(items)
    }
}
