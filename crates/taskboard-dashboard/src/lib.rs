//! Taskboard Dashboard - the owning component
//!
//! Wires the synchronizer and the view-state projector into one event loop,
//! loads layered configuration, and renders the result in a terminal console
//! or as headless log output.

pub mod config;
pub mod console;
pub mod dashboard;
pub mod report;
pub mod tui;

pub use config::{ConfigError, DashboardConfig};
pub use dashboard::{BasePick, Dashboard, DashboardView, UserAction};
pub use tui::{LogCategory, LogEntry};
