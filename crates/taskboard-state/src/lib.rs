//! Taskboard State - view-state projection
//!
//! Pure functions that turn a chart snapshot plus the user's base selection
//! and base order into the ordered, aggregated structure a renderer paints.

pub mod aggregate;
pub mod order;
pub mod projection;
pub mod selection;
pub mod view;

pub use aggregate::{compute_aggregate, percent_of, Aggregate, PointShare};
pub use order::{reorder, BaseOrder};
pub use projection::{list_bases, project, BaseGroup, EmptyReason, Projection, RenderChart};
pub use selection::{toggle_selection, Selection, SelectionToggle};
pub use view::ViewState;
