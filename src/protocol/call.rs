//! Outbound scheduler calls.
//!
//! A subscribe call is the only call the session core issues on its own:
//! it opens (and re-opens) the event stream. The payload follows the
//! Mesos v1 Scheduler API `Call` message, serialized with
//! SCREAMING_SNAKE_CASE type tags on the JSON variant.

use serde::{Deserialize, Serialize};

/// Framework identifier assigned by the master on first registration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameworkId {
    /// Opaque id value.
    pub value: String,
}

impl FrameworkId {
    /// Create an id from its value.
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        FrameworkId {
            value: value.into(),
        }
    }
}

impl std::fmt::Display for FrameworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl From<&str> for FrameworkId {
    #[inline]
    fn from(value: &str) -> Self {
        FrameworkId::new(value)
    }
}

impl From<String> for FrameworkId {
    #[inline]
    fn from(value: String) -> Self {
        FrameworkId { value }
    }
}

/// The framework's self-description carried in the subscribe payload.
///
/// Only the fields the subscribe call needs are modeled; the master
/// tolerates absent optional fields.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameworkInfo {
    /// Unix user the framework's tasks run as.
    pub user: String,
    /// Human-readable framework name.
    pub name: String,
    /// Known framework id; set on re-subscription only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<FrameworkId>,
    /// Failover timeout in seconds granted by the master.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failover_timeout: Option<f64>,
    /// Whether the agents checkpoint framework state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<bool>,
    /// Resource role the framework registers in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Hostname advertised to the master.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Authentication principal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
}

impl FrameworkInfo {
    /// Create a framework description with the required fields.
    #[must_use]
    pub fn new(user: impl Into<String>, name: impl Into<String>) -> Self {
        FrameworkInfo {
            user: user.into(),
            name: name.into(),
            ..FrameworkInfo::default()
        }
    }

    /// Set the resource role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the failover timeout in seconds.
    #[must_use]
    pub fn with_failover_timeout(mut self, seconds: f64) -> Self {
        self.failover_timeout = Some(seconds);
        self
    }

    /// Set the authentication principal.
    #[must_use]
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }
}

/// Scheduler call kinds issued by this client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallType {
    /// Open the event stream.
    Subscribe,
}

/// `SUBSCRIBE` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subscribe {
    /// The framework's self-description.
    pub framework_info: FrameworkInfo,
    /// Force re-registration, replacing a live session for the same id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
}

/// A scheduler call envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Known framework id; required by the master on every call after
    /// registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<FrameworkId>,
    /// Call kind tag.
    #[serde(rename = "type")]
    pub call_type: CallType,
    /// Subscribe payload, present when `call_type` is `Subscribe`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<Subscribe>,
}

impl Call {
    /// Build the initial subscribe call, before any registration.
    #[must_use]
    pub fn subscribe(framework_info: FrameworkInfo, force: bool) -> Self {
        Call {
            framework_id: None,
            call_type: CallType::Subscribe,
            subscribe: Some(Subscribe {
                framework_info,
                force: Some(force),
            }),
        }
    }

    /// Build a re-subscription call echoing the known framework id both
    /// at the envelope and inside `framework_info`.
    #[must_use]
    pub fn resubscribe(mut framework_info: FrameworkInfo, framework_id: FrameworkId) -> Self {
        framework_info.id = Some(framework_id.clone());
        Call {
            framework_id: Some(framework_id),
            call_type: CallType::Subscribe,
            subscribe: Some(Subscribe {
                framework_info,
                force: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subscribe_call_shape() {
        let info = FrameworkInfo::new("root", "analytics").with_role("batch");
        let call = Call::subscribe(info, true);
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "SUBSCRIBE",
                "subscribe": {
                    "framework_info": {
                        "user": "root",
                        "name": "analytics",
                        "role": "batch"
                    },
                    "force": true
                }
            })
        );
    }

    #[test]
    fn resubscribe_echoes_framework_id() {
        let info = FrameworkInfo::new("root", "analytics");
        let call = Call::resubscribe(info, FrameworkId::new("f-1"));
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["framework_id"]["value"], "f-1");
        assert_eq!(
            value["subscribe"]["framework_info"]["id"]["value"],
            "f-1"
        );
        assert!(value["subscribe"].get("force").is_none());
    }

    #[test]
    fn framework_id_display() {
        let id: FrameworkId = "f-42".into();
        assert_eq!(id.to_string(), "f-42");
    }
}
