//! Taskboard Protocol - Core types and wire payloads
//!
//! Defines the chart data model served by the task-status API, the parsed
//! `<base>::<name>` compound key, and the JSON frames exchanged over the
//! live update channel.

pub mod constants;
pub mod error;
pub mod messages;
pub mod types;

pub use constants::*;
pub use error::*;
pub use messages::*;
pub use types::*;
