//! Multi-select base filter.
//!
//! The selection is either the `All` sentinel, the explicit `None` state
//! ("everything deselected"), or a non-empty set of base names. Toggle
//! operations never produce an empty explicit set: removing the last base
//! falls back to `All`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Which bases are displayed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "bases", rename_all = "snake_case")]
pub enum Selection {
    #[default]
    All,
    /// The user deselected everything via the "all" option.
    None,
    /// Non-empty explicit set. May reference bases that have since vanished
    /// from the snapshot; those are filtered at render time.
    Only(BTreeSet<String>),
}

/// A click on the multi-select control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionToggle {
    /// The "all" convenience option.
    All,
    Base(String),
}

impl Selection {
    pub fn includes(&self, base: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::None => false,
            Selection::Only(set) => set.contains(base),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Selection::None)
    }
}

/// Apply one toggle to the current selection.
///
/// `available` is the list of bases present in the current snapshot; it is
/// used to collapse a full explicit set back to `All`.
pub fn toggle_selection(
    toggle: &SelectionToggle,
    current: &Selection,
    available: &[String],
) -> Selection {
    match toggle {
        SelectionToggle::All => match current {
            Selection::All => Selection::None,
            _ => Selection::All,
        },
        SelectionToggle::Base(base) => {
            let mut set: BTreeSet<String> = match current {
                Selection::All => available.iter().cloned().collect(),
                Selection::None => BTreeSet::new(),
                Selection::Only(set) => set.clone(),
            };

            if !set.remove(base) {
                set.insert(base.clone());
            }

            normalize(set, available)
        }
    }
}

/// Collapse an explicit set: empty -> `All`, covers every available base -> `All`.
fn normalize(set: BTreeSet<String>, available: &[String]) -> Selection {
    if set.is_empty() {
        return Selection::All;
    }
    if !available.is_empty() && available.iter().all(|b| set.contains(b)) {
        return Selection::All;
    }
    Selection::Only(set)
}
