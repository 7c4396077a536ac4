//! Wire model for the Mesos v1 Scheduler API.
//!
//! # Module Organization
//!
//! ```text
//! protocol/
//! ├── call      - outbound scheduler calls (SUBSCRIBE)
//! ├── event     - inbound events and their classification
//! └── recordio  - incremental RecordIO framing
//! ```
//!
//! The codec is parameterized by [`DataFormat`]: [`encode_call`] and
//! [`decode_event`] negotiate by format tag, and the format's content
//! type names the `Content-Type`/`Accept` headers of the subscribe
//! request. Only the JSON codec is wired in this crate.

pub mod call;
pub mod event;
pub mod recordio;

pub use call::{Call, CallType, FrameworkId, FrameworkInfo, Subscribe};
pub use event::{
    parse_event, AgentId, ErrorEvent, Event, EventType, ExecutorId, FailureEvent, MessageEvent,
    Offer, OfferId, OffersEvent, ParsedEvent, RescindEvent, SubscribedEvent, TaskId, TaskStatus,
    UpdateEvent, DEFAULT_HEARTBEAT_INTERVAL,
};
pub use recordio::{encode_frame, RecordIoDecoder};

use crate::error::{Result, SchedulerError};
use bytes::Bytes;

/// Wire serialization format for calls and events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataFormat {
    /// JSON with RecordIO framing (`application/json`).
    Json,
    /// Protobuf with RecordIO framing (`application/x-protobuf`).
    /// Negotiated but not wired in this crate.
    Protobuf,
}

impl DataFormat {
    /// The content type sent as both `Content-Type` and `Accept`.
    #[inline]
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self {
            DataFormat::Json => "application/json",
            DataFormat::Protobuf => "application/x-protobuf",
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataFormat::Json => write!(f, "json"),
            DataFormat::Protobuf => write!(f, "protobuf"),
        }
    }
}

/// Encode an outbound call in the given format.
pub fn encode_call(format: DataFormat, call: &Call) -> Result<Bytes> {
    match format {
        DataFormat::Json => Ok(Bytes::from(serde_json::to_vec(call)?)),
        DataFormat::Protobuf => Err(SchedulerError::Codec(
            "protobuf codec is not wired".to_string(),
        )),
    }
}

/// Decode one event record in the given format.
pub fn decode_event(format: DataFormat, record: &[u8]) -> Result<Event> {
    match format {
        DataFormat::Json => Ok(serde_json::from_slice(record)?),
        DataFormat::Protobuf => Err(SchedulerError::Codec(
            "protobuf codec is not wired".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types() {
        assert_eq!(DataFormat::Json.content_type(), "application/json");
        assert_eq!(
            DataFormat::Protobuf.content_type(),
            "application/x-protobuf"
        );
    }

    #[test]
    fn encode_then_decode_subscribe() {
        let call = Call::subscribe(FrameworkInfo::new("root", "analytics"), false);
        let encoded = encode_call(DataFormat::Json, &call).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value["type"], "SUBSCRIBE");
    }

    #[test]
    fn decode_event_rejects_garbage() {
        let err = decode_event(DataFormat::Json, b"{not json").unwrap_err();
        assert!(matches!(err, SchedulerError::Codec(_)));
    }

    #[test]
    fn protobuf_not_wired() {
        let call = Call::subscribe(FrameworkInfo::new("root", "analytics"), false);
        assert!(encode_call(DataFormat::Protobuf, &call).is_err());
        assert!(decode_event(DataFormat::Protobuf, b"").is_err());
    }
}
