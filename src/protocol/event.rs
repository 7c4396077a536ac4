//! Inbound scheduler events and their classification.
//!
//! The session core does not inspect event internals beyond what drives
//! its own state machine. [`parse_event`] classifies a decoded [`Event`]
//! into the variants the session cares about (`SUBSCRIBED`, `HEARTBEAT`
//! and `ERROR`) and forwards everything else verbatim for dispatch to
//! the user scheduler's callbacks.

use crate::error::{Result, SchedulerError};
use crate::protocol::call::FrameworkId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Heartbeat interval assumed when the master omits
/// `heartbeat_interval_seconds` from the `SUBSCRIBED` event.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Agent identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentId {
    /// Opaque id value.
    pub value: String,
}

/// Offer identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferId {
    /// Opaque id value.
    pub value: String,
}

/// Executor identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorId {
    /// Opaque id value.
    pub value: String,
}

/// Task identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskId {
    /// Opaque id value.
    pub value: String,
}

/// Event kind tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Registration acknowledged; carries the framework id.
    Subscribed,
    /// Resource offers.
    Offers,
    /// A previously sent offer is withdrawn.
    Rescind,
    /// Task status update.
    Update,
    /// Executor-to-framework message.
    Message,
    /// Agent or executor failure.
    Failure,
    /// Terminal master-side error.
    Error,
    /// Periodic liveness ping.
    Heartbeat,
    /// Any event kind this client does not model.
    #[serde(other)]
    Unknown,
}

/// `SUBSCRIBED` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscribedEvent {
    /// Id assigned (or re-confirmed) by the master.
    pub framework_id: FrameworkId,
    /// Master-declared heartbeat interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_seconds: Option<f64>,
}

/// A single resource offer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Offer id, referenced by accept/decline calls.
    pub id: OfferId,
    /// The framework the offer is made to.
    pub framework_id: FrameworkId,
    /// Agent the resources live on.
    pub agent_id: AgentId,
    /// Agent hostname.
    pub hostname: String,
    /// Offered resources, forwarded verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<serde_json::Value>,
}

/// `OFFERS` payload.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct OffersEvent {
    /// The offers in this batch.
    #[serde(default)]
    pub offers: Vec<Offer>,
}

/// `RESCIND` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RescindEvent {
    /// The withdrawn offer.
    pub offer_id: OfferId,
}

/// Task status carried by `UPDATE` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// The task this status refers to.
    pub task_id: TaskId,
    /// Task state name, e.g. `TASK_RUNNING`.
    pub state: String,
    /// Optional human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Agent the task runs on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Update uuid to acknowledge, when reliable delivery is requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// `UPDATE` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    /// The task status.
    pub status: TaskStatus,
}

/// `MESSAGE` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Originating agent.
    pub agent_id: AgentId,
    /// Originating executor.
    pub executor_id: ExecutorId,
    /// Raw message data as sent by the executor.
    pub data: String,
}

/// `FAILURE` payload.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct FailureEvent {
    /// Failed agent, if the failure is agent-level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Failed executor, if the failure is executor-level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<ExecutorId>,
    /// Executor exit status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
}

/// `ERROR` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Master-supplied error message.
    pub message: String,
}

/// A decoded scheduler event envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind tag.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// `SUBSCRIBED` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribed: Option<SubscribedEvent>,
    /// `OFFERS` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offers: Option<OffersEvent>,
    /// `RESCIND` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescind: Option<RescindEvent>,
    /// `UPDATE` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdateEvent>,
    /// `MESSAGE` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageEvent>,
    /// `FAILURE` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureEvent>,
    /// `ERROR` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEvent>,
}

/// An event classified for the session core.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedEvent {
    /// Registration acknowledged. `heartbeat_interval` is the master's
    /// declared interval converted to a positive duration.
    Subscribed {
        /// The wire payload, forwarded to the user callback.
        event: SubscribedEvent,
        /// Master-declared heartbeat interval.
        heartbeat_interval: Duration,
    },
    /// Liveness ping; consumed by the watchdog and not forwarded.
    Heartbeat,
    /// Terminal master-side error, delivered to the user `error` callback.
    Error(ErrorEvent),
    /// Anything else, forwarded verbatim to the user callbacks.
    Other(Event),
}

/// Classify a decoded event.
///
/// A `SUBSCRIBED` or `ERROR` envelope without its payload is malformed
/// and reported as a codec error, which abandons the current stream.
pub fn parse_event(mut event: Event) -> Result<ParsedEvent> {
    match event.event_type {
        EventType::Subscribed => {
            let subscribed = event
                .subscribed
                .take()
                .ok_or_else(|| SchedulerError::Codec("SUBSCRIBED event without payload".into()))?;
            let heartbeat_interval = subscribed
                .heartbeat_interval_seconds
                .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);
            Ok(ParsedEvent::Subscribed {
                event: subscribed,
                heartbeat_interval,
            })
        }
        EventType::Heartbeat => Ok(ParsedEvent::Heartbeat),
        EventType::Error => {
            let error = event
                .error
                .take()
                .ok_or_else(|| SchedulerError::Codec("ERROR event without payload".into()))?;
            Ok(ParsedEvent::Error(error))
        }
        _ => Ok(ParsedEvent::Other(event)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Event {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn subscribed_converts_seconds_to_duration() {
        let event = decode(json!({
            "type": "SUBSCRIBED",
            "subscribed": {
                "framework_id": {"value": "f-1"},
                "heartbeat_interval_seconds": 15.0
            }
        }));
        let parsed = parse_event(event).unwrap();
        match parsed {
            ParsedEvent::Subscribed {
                event,
                heartbeat_interval,
            } => {
                assert_eq!(event.framework_id, FrameworkId::new("f-1"));
                assert_eq!(heartbeat_interval, Duration::from_millis(15000));
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn subscribed_without_interval_takes_default() {
        let event = decode(json!({
            "type": "SUBSCRIBED",
            "subscribed": {"framework_id": {"value": "f-1"}}
        }));
        match parse_event(event).unwrap() {
            ParsedEvent::Subscribed {
                heartbeat_interval, ..
            } => assert_eq!(heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn subscribed_without_payload_is_malformed() {
        let event = decode(json!({"type": "SUBSCRIBED"}));
        assert!(parse_event(event).is_err());
    }

    #[test]
    fn heartbeat_classified() {
        let event = decode(json!({"type": "HEARTBEAT"}));
        assert_eq!(parse_event(event).unwrap(), ParsedEvent::Heartbeat);
    }

    #[test]
    fn error_carries_message() {
        let event = decode(json!({
            "type": "ERROR",
            "error": {"message": "framework failed over"}
        }));
        match parse_event(event).unwrap() {
            ParsedEvent::Error(error) => assert_eq!(error.message, "framework failed over"),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn offers_forwarded_as_other() {
        let event = decode(json!({
            "type": "OFFERS",
            "offers": {"offers": [{
                "id": {"value": "o-1"},
                "framework_id": {"value": "f-1"},
                "agent_id": {"value": "a-1"},
                "hostname": "agent-1"
            }]}
        }));
        match parse_event(event).unwrap() {
            ParsedEvent::Other(event) => {
                assert_eq!(event.event_type, EventType::Offers);
                assert_eq!(event.offers.unwrap().offers.len(), 1);
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn unknown_event_type_forwarded_as_other() {
        let event = decode(json!({"type": "GREETINGS"}));
        match parse_event(event).unwrap() {
            ParsedEvent::Other(event) => assert_eq!(event.event_type, EventType::Unknown),
            other => panic!("unexpected classification: {:?}", other),
        }
    }
}
