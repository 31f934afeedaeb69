/// Separator between the base and the chart name inside a chart title.
pub const BASE_SEPARATOR: &str = "::";

/// Display label for charts whose title carries no base.
pub const UNGROUPED_BASE_LABEL: &str = "(ungrouped)";

/// `type` tag of a change notification on the live channel.
pub const FRAME_TYPE_UPDATE: &str = "update";

/// `type` tag of a keepalive acknowledgement.
pub const FRAME_TYPE_PONG: &str = "pong";

/// `type` tag of the keepalive sent by the client.
pub const FRAME_TYPE_PING: &str = "ping";
