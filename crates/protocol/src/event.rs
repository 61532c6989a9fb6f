use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::EventType;

/// Reasons a text frame could not become an [`InboundEvent`].
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no \"type\" tag")]
    MissingType,

    #[error("invalid timestamp: {0}")]
    Timestamp(String),
}

/// An event received on (or synthesised by) the realtime channel.
///
/// Wire shape: `{"type": string, "data": any, "timestamp": ISO-8601}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    /// Parses a raw text frame.
    ///
    /// `data` defaults to `null` and a missing timestamp takes `received_at`.
    /// A timestamp that is present but not RFC 3339 rejects the frame.
    pub fn parse(text: &str, received_at: DateTime<Utc>) -> Result<Self, FrameError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let mut obj = match value {
            serde_json::Value::Object(obj) => obj,
            _ => return Err(FrameError::NotAnObject),
        };

        let event_type = match obj.remove("type") {
            Some(serde_json::Value::String(t)) if !t.is_empty() => t,
            _ => return Err(FrameError::MissingType),
        };

        let data = obj.remove("data").unwrap_or(serde_json::Value::Null);

        let timestamp = match obj.remove("timestamp") {
            None | Some(serde_json::Value::Null) => received_at,
            Some(serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| FrameError::Timestamp(format!("{s}: {e}")))?,
            Some(other) => return Err(FrameError::Timestamp(other.to_string())),
        };

        Ok(Self {
            event_type,
            data,
            timestamp,
        })
    }

    /// Builds a locally generated event.
    pub fn synthetic(kind: EventType, data: serde_json::Value, at: DateTime<Utc>) -> Self {
        Self {
            event_type: kind.as_str().to_string(),
            data,
            timestamp: at,
        }
    }

    /// Classifies the event tag.
    pub fn kind(&self) -> EventType {
        EventType::from_tag(&self.event_type)
    }
}

/// Serialises the client liveness frame.
pub fn heartbeat_frame(at: DateTime<Utc>) -> String {
    serde_json::json!({
        "type": EventType::Ping.as_str(),
        "timestamp": at.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
    .to_string()
}
