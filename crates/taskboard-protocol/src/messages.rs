use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::ChartItem;

/// Partial update: chart title -> (label -> new value).
pub type ChangeSet = HashMap<String, HashMap<String, u64>>;

/// Body of the chart endpoint. Both `{ "charts": [...] }` and a bare array
/// are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartsBody {
    Wrapped { charts: Vec<ChartItem> },
    Bare(Vec<ChartItem>),
}

impl ChartsBody {
    pub fn into_items(self) -> Vec<ChartItem> {
        match self {
            ChartsBody::Wrapped { charts } => charts,
            ChartsBody::Bare(charts) => charts,
        }
    }
}

/// Decode a chart endpoint response body.
pub fn parse_charts_body(body: &str) -> Result<Vec<ChartItem>, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let parsed = ChartsBody::deserialize(value).map_err(|e| {
        ProtocolError::InvalidPayload(format!(
            "expected {{\"charts\": [...]}} or a chart array: {e}"
        ))
    })?;
    Ok(parsed.into_items())
}

/// A JSON text frame received on the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Change notification. Without payload it asks for a full re-fetch.
    Update {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        charts: Option<ChartsBody>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        changes: Option<ChangeSet>,
    },
    /// Keepalive acknowledgement.
    Pong,
    /// Any other frame type; ignored.
    #[serde(other)]
    Other,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// What the synchronizer should do with this frame.
    /// A full chart payload takes precedence over a change set.
    pub fn into_action(self) -> FrameAction {
        match self {
            InboundFrame::Update {
                charts: Some(body), ..
            } => FrameAction::Replace(body.into_items()),
            InboundFrame::Update {
                changes: Some(changes),
                ..
            } => FrameAction::ApplyDiff(changes),
            InboundFrame::Update { .. } => FrameAction::Refetch,
            InboundFrame::Pong | InboundFrame::Other => FrameAction::Ignore,
        }
    }
}

/// Action derived from an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameAction {
    Refetch,
    Replace(Vec<ChartItem>),
    ApplyDiff(ChangeSet),
    Ignore,
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Ping,
}

impl OutboundFrame {
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChartDataPoint;

    #[test]
    fn test_parse_wrapped_body() {
        let items = parse_charts_body(
            r#"{"charts":[{"title":"P::A","slot":1,"data":[{"label":"Done","value":3}]}]}"#,
        )
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].data, vec![ChartDataPoint::new("Done", 3)]);
    }

    #[test]
    fn test_parse_bare_body() {
        let items = parse_charts_body(r#"[{"title":"P::A","slot":null,"data":[]}]"#).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_subtask());
    }

    #[test]
    fn test_parse_body_rejects_garbage() {
        assert!(matches!(
            parse_charts_body("<html>oops</html>"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            parse_charts_body(r#"{"rows": []}"#),
            Err(ProtocolError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_update_without_payload_refetches() {
        let frame = InboundFrame::parse(r#"{"type":"update"}"#).unwrap();
        assert_eq!(frame.into_action(), FrameAction::Refetch);
    }

    #[test]
    fn test_update_with_charts_replaces() {
        let frame = InboundFrame::parse(
            r#"{"type":"update","charts":{"charts":[{"title":"P::A","slot":1,"data":[]}]}}"#,
        )
        .unwrap();
        match frame.into_action() {
            FrameAction::Replace(items) => assert_eq!(items[0].title, "P::A"),
            other => panic!("expected Replace, got {other:?}"),
        }
    }

    #[test]
    fn test_update_with_changes_applies_diff() {
        let frame =
            InboundFrame::parse(r#"{"type":"update","changes":{"P::A":{"Done":7}}}"#).unwrap();
        match frame.into_action() {
            FrameAction::ApplyDiff(changes) => assert_eq!(changes["P::A"]["Done"], 7),
            other => panic!("expected ApplyDiff, got {other:?}"),
        }
    }

    #[test]
    fn test_pong_and_unknown_types_are_ignored() {
        let pong = InboundFrame::parse(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(pong, InboundFrame::Pong);
        assert_eq!(pong.into_action(), FrameAction::Ignore);

        let other = InboundFrame::parse(r#"{"type":"welcome","motd":"hi"}"#).unwrap();
        assert_eq!(other.into_action(), FrameAction::Ignore);
    }

    #[test]
    fn test_malformed_frames_fail() {
        assert!(InboundFrame::parse("not json").is_err());
        assert!(InboundFrame::parse(r#"{"kind":"update"}"#).is_err());
    }

    #[test]
    fn test_ping_frame_text() {
        assert_eq!(OutboundFrame::Ping.to_text(), r#"{"type":"ping"}"#);
    }
}
