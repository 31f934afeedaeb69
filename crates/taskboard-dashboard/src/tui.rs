//! Event log entries shown in the console.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    System,
    Data,
    Channel,
    View,
    Error,
}

impl LogCategory {
    pub fn tag(self) -> &'static str {
        match self {
            LogCategory::System => "SYS",
            LogCategory::Data => "DATA",
            LogCategory::Channel => "LIVE",
            LogCategory::View => "VIEW",
            LogCategory::Error => "ERR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub category: LogCategory,
    pub message: String,
}
