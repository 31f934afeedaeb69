//! User-chosen display order of bases.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Ordered base names. Entries for bases that left the snapshot are kept and
/// filtered when the order is reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BaseOrder(Vec<String>);

impl BaseOrder {
    pub fn new(bases: Vec<String>) -> Self {
        Self(bases)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The order restricted to `present`, with bases missing from the order
    /// appended in the order they appear in `present`.
    pub fn reconcile(&self, present: &[String]) -> Vec<String> {
        let present_set: HashSet<&str> = present.iter().map(String::as_str).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::with_capacity(present.len());

        for base in &self.0 {
            if present_set.contains(base.as_str()) && seen.insert(base.as_str()) {
                out.push(base.clone());
            }
        }
        for base in present {
            if seen.insert(base.as_str()) {
                out.push(base.clone());
            }
        }
        out
    }
}

impl From<Vec<String>> for BaseOrder {
    fn from(bases: Vec<String>) -> Self {
        Self(bases)
    }
}

/// Move the displayed base at `old_index` to `new_index`.
///
/// Indices address `displayed`, the bases currently on screen in display
/// order. Bases that exist but are hidden by the selection keep their
/// positions; only the displayed ones are permuted among their own slots.
/// Returns the order unchanged when the indices are equal or out of range.
pub fn reorder(
    old_index: usize,
    new_index: usize,
    order: &BaseOrder,
    present: &[String],
    displayed: &[String],
) -> BaseOrder {
    if old_index == new_index || old_index >= displayed.len() || new_index >= displayed.len() {
        return order.clone();
    }

    let mut full = order.reconcile(present);
    let displayed_set: HashSet<&str> = displayed.iter().map(String::as_str).collect();
    let slots: Vec<usize> = full
        .iter()
        .enumerate()
        .filter(|(_, b)| displayed_set.contains(b.as_str()))
        .map(|(i, _)| i)
        .collect();

    let mut visible: Vec<String> = slots.iter().map(|&i| full[i].clone()).collect();
    if visible.len() != displayed.len() {
        // `displayed` is not a subset of the reconciled order.
        return order.clone();
    }

    let moved = visible.remove(old_index);
    visible.insert(new_index, moved);

    for (slot, base) in slots.into_iter().zip(visible) {
        full[slot] = base;
    }
    BaseOrder(full)
}
