use serde::{Deserialize, Serialize};

use taskboard_protocol::Snapshot;

use crate::order::{reorder, BaseOrder};
use crate::projection::{list_bases, project, Projection};
use crate::selection::{toggle_selection, Selection, SelectionToggle};

/// User-owned view state: which bases are shown and in what order.
///
/// Lives in memory for the lifetime of the dashboard; nothing is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub selection: Selection,
    pub order: BaseOrder,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the order from the first snapshot that carries any base.
    /// Later snapshots never rewrite it; new bases are appended at render time.
    pub fn observe_snapshot(&mut self, snapshot: &Snapshot) {
        if self.order.is_empty() {
            let bases = list_bases(snapshot);
            if !bases.is_empty() {
                self.order = BaseOrder::new(bases);
            }
        }
    }

    pub fn toggle(&mut self, toggle: &SelectionToggle, snapshot: &Snapshot) {
        let available = list_bases(snapshot);
        self.selection = toggle_selection(toggle, &self.selection, &available);
    }

    /// Move a displayed base from `old_index` to `new_index`.
    pub fn move_base(&mut self, old_index: usize, new_index: usize, snapshot: &Snapshot) {
        let present = list_bases(snapshot);
        let displayed = self.project(snapshot).bases();
        self.order = reorder(old_index, new_index, &self.order, &present, &displayed);
    }

    pub fn project(&self, snapshot: &Snapshot) -> Projection {
        project(snapshot, &self.selection, &self.order)
    }

    /// Every base in the snapshot in display order, each with its selection flag.
    /// Used by the base picker, which lists hidden bases too.
    pub fn base_picker(&self, snapshot: &Snapshot) -> Vec<(String, bool)> {
        let present = list_bases(snapshot);
        self.order
            .reconcile(&present)
            .into_iter()
            .map(|b| {
                let selected = self.selection.includes(&b);
                (b, selected)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskboard_protocol::{ChartDataPoint, ChartItem};

    fn snapshot(titles: &[&str]) -> Snapshot {
        Snapshot::from_items(
            titles
                .iter()
                .map(|t| ChartItem::new(*t, Some(1), vec![ChartDataPoint::new("Done", 1)]))
                .collect(),
        )
    }

    #[test]
    fn test_order_seeded_once() {
        let mut view = ViewState::new();
        view.observe_snapshot(&Snapshot::new());
        assert!(view.order.is_empty());

        view.observe_snapshot(&snapshot(&["B::x", "A::y"]));
        assert_eq!(view.order.as_slice(), &["B".to_string(), "A".to_string()]);

        view.observe_snapshot(&snapshot(&["A::y", "C::z"]));
        assert_eq!(view.order.as_slice(), &["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn test_move_then_project() {
        let snap = snapshot(&["A::1", "B::1", "C::1"]);
        let mut view = ViewState::new();
        view.observe_snapshot(&snap);
        view.move_base(2, 0, &snap);
        assert_eq!(view.project(&snap).bases(), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_base_picker_lists_hidden_bases() {
        let snap = snapshot(&["A::1", "B::1"]);
        let mut view = ViewState::new();
        view.observe_snapshot(&snap);
        view.toggle(&SelectionToggle::Base("A".into()), &snap);
        assert_eq!(
            view.base_picker(&snap),
            vec![("A".to_string(), false), ("B".to_string(), true)]
        );
    }
}
