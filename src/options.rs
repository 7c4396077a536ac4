//! Session option validation.
//!
//! Options arrive as a flat JSON mapping ([`RawOptions`]) and are validated
//! into a typed [`SchedulerOptions`] record before a session starts. The
//! validators run in a fixed order (`master_hosts`, `subscribe_req_options`,
//! `heartbeat_timeout_window`, `max_num_resubscribe`, `resubscribe_interval`)
//! and the first offending option is reported with its value. Missing
//! options take their defaults.
//!
//! # Example
//!
//! ```ignore
//! use mesos_scheduler::{RawOptions, SchedulerOptions};
//! use serde_json::json;
//!
//! let mut raw = RawOptions::new();
//! raw.insert("master_hosts".into(), json!(["10.0.0.1:5050", "10.0.0.2:5050"]));
//! raw.insert("max_num_resubscribe".into(), json!(5));
//!
//! let options = SchedulerOptions::validate(&raw)?;
//! assert_eq!(options.master_hosts.len(), 2);
//! ```

use crate::protocol::DataFormat;
use serde_json::Value;
use std::time::Duration;

/// The raw, not-yet-validated option mapping.
pub type RawOptions = serde_json::Map<String, Value>;

/// Validation failure naming the first offending option and its value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptionsError {
    /// `master_hosts` was not a non-empty list of strings.
    #[error("bad master_hosts option: {0}")]
    BadMasterHosts(Value),

    /// `subscribe_req_options` was not a valid request-option object.
    #[error("bad subscribe_req_options option: {0}")]
    BadSubscribeReqOptions(Value),

    /// `heartbeat_timeout_window` was not a non-negative integer.
    #[error("bad heartbeat_timeout_window option: {0}")]
    BadHeartbeatTimeoutWindow(Value),

    /// `max_num_resubscribe` was not a non-negative integer or `"infinity"`.
    #[error("bad max_num_resubscribe option: {0}")]
    BadMaxNumResubscribe(Value),

    /// `resubscribe_interval` was not a non-negative integer.
    #[error("bad resubscribe_interval option: {0}")]
    BadResubscribeInterval(Value),
}

/// Bound on resubscribe attempts since the last successful subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResubscribeLimit {
    /// At most this many attempts.
    Finite(u64),
    /// Never give up.
    Infinite,
}

impl ResubscribeLimit {
    /// Whether `attempts` already exhausted this limit.
    #[inline]
    #[must_use]
    pub fn reached(&self, attempts: u64) -> bool {
        match self {
            ResubscribeLimit::Finite(max) => attempts >= *max,
            ResubscribeLimit::Infinite => false,
        }
    }
}

impl Default for ResubscribeLimit {
    fn default() -> Self {
        ResubscribeLimit::Finite(1)
    }
}

/// Request options passed through to the HTTP streaming adapter.
///
/// The adapter-level streaming options (single async response, infinite
/// receive timeout, no automatic redirect following) are fixed by the
/// session and cannot appear here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestOptions {
    /// Extra headers for the subscribe request. The session's own
    /// `Content-Type`, `Accept` and `Connection` headers always win.
    pub headers: Vec<(String, String)>,
    /// TCP connect timeout, if any.
    pub connect_timeout: Option<Duration>,
}

/// Validated, immutable session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerOptions {
    /// Candidate masters in failover order, as `host:port`.
    pub master_hosts: Vec<String>,
    /// Request options handed to the HTTP adapter per subscribe.
    pub subscribe_req_options: RequestOptions,
    /// Slack added to the master's heartbeat interval before the
    /// watchdog fires.
    pub heartbeat_timeout_window: Duration,
    /// Bound on resubscribe attempts since the last success.
    pub max_num_resubscribe: ResubscribeLimit,
    /// Spacing between resubscribe attempts.
    pub resubscribe_interval: Duration,
    /// Wire format for calls and events.
    pub data_format: DataFormat,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        SchedulerOptions {
            master_hosts: vec![default_master_host()],
            subscribe_req_options: RequestOptions::default(),
            heartbeat_timeout_window: Duration::from_millis(5000),
            max_num_resubscribe: ResubscribeLimit::default(),
            resubscribe_interval: Duration::ZERO,
            data_format: DataFormat::Json,
        }
    }
}

fn default_master_host() -> String {
    "localhost:5050".to_string()
}

impl SchedulerOptions {
    /// Validate a raw option mapping into a typed configuration.
    ///
    /// Validators run in a fixed order and the first failure wins.
    /// Validation is idempotent: a configuration converted back with
    /// [`SchedulerOptions::to_raw`] validates to an equal configuration.
    pub fn validate(raw: &RawOptions) -> Result<Self, OptionsError> {
        let master_hosts = validate_master_hosts(raw)?;
        let subscribe_req_options = validate_subscribe_req_options(raw)?;
        let heartbeat_timeout_window = validate_heartbeat_timeout_window(raw)?;
        let max_num_resubscribe = validate_max_num_resubscribe(raw)?;
        let resubscribe_interval = validate_resubscribe_interval(raw)?;

        Ok(SchedulerOptions {
            master_hosts,
            subscribe_req_options,
            heartbeat_timeout_window,
            max_num_resubscribe,
            resubscribe_interval,
            data_format: DataFormat::Json,
        })
    }

    /// Render this configuration back into the raw mapping form.
    #[must_use]
    pub fn to_raw(&self) -> RawOptions {
        let mut raw = RawOptions::new();
        raw.insert(
            "master_hosts".to_string(),
            Value::from(self.master_hosts.clone()),
        );

        let mut req = serde_json::Map::new();
        if !self.subscribe_req_options.headers.is_empty() {
            let headers: serde_json::Map<String, Value> = self
                .subscribe_req_options
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                .collect();
            req.insert("headers".to_string(), Value::Object(headers));
        }
        if let Some(timeout) = self.subscribe_req_options.connect_timeout {
            req.insert(
                "connect_timeout_ms".to_string(),
                Value::from(timeout.as_millis() as u64),
            );
        }
        raw.insert("subscribe_req_options".to_string(), Value::Object(req));

        raw.insert(
            "heartbeat_timeout_window".to_string(),
            Value::from(self.heartbeat_timeout_window.as_millis() as u64),
        );
        raw.insert(
            "max_num_resubscribe".to_string(),
            match self.max_num_resubscribe {
                ResubscribeLimit::Finite(n) => Value::from(n),
                ResubscribeLimit::Infinite => Value::from("infinity"),
            },
        );
        raw.insert(
            "resubscribe_interval".to_string(),
            Value::from(self.resubscribe_interval.as_millis() as u64),
        );
        raw
    }
}

fn validate_master_hosts(raw: &RawOptions) -> Result<Vec<String>, OptionsError> {
    let Some(value) = raw.get("master_hosts") else {
        return Ok(vec![default_master_host()]);
    };
    let hosts = value
        .as_array()
        .filter(|hosts| !hosts.is_empty())
        .ok_or_else(|| OptionsError::BadMasterHosts(value.clone()))?;

    hosts
        .iter()
        .map(|host| {
            host.as_str()
                .map(str::to_string)
                .ok_or_else(|| OptionsError::BadMasterHosts(value.clone()))
        })
        .collect()
}

fn validate_subscribe_req_options(raw: &RawOptions) -> Result<RequestOptions, OptionsError> {
    let Some(value) = raw.get("subscribe_req_options") else {
        return Ok(RequestOptions::default());
    };
    let object = value
        .as_object()
        .ok_or_else(|| OptionsError::BadSubscribeReqOptions(value.clone()))?;

    let mut options = RequestOptions::default();
    if let Some(headers) = object.get("headers") {
        let headers = headers
            .as_object()
            .ok_or_else(|| OptionsError::BadSubscribeReqOptions(value.clone()))?;
        for (name, header_value) in headers {
            let header_value = header_value
                .as_str()
                .ok_or_else(|| OptionsError::BadSubscribeReqOptions(value.clone()))?;
            options
                .headers
                .push((name.clone(), header_value.to_string()));
        }
    }
    if let Some(timeout) = object.get("connect_timeout_ms") {
        let millis = timeout
            .as_u64()
            .ok_or_else(|| OptionsError::BadSubscribeReqOptions(value.clone()))?;
        options.connect_timeout = Some(Duration::from_millis(millis));
    }
    Ok(options)
}

fn validate_heartbeat_timeout_window(raw: &RawOptions) -> Result<Duration, OptionsError> {
    let Some(value) = raw.get("heartbeat_timeout_window") else {
        return Ok(Duration::from_millis(5000));
    };
    value
        .as_u64()
        .map(Duration::from_millis)
        .ok_or_else(|| OptionsError::BadHeartbeatTimeoutWindow(value.clone()))
}

fn validate_max_num_resubscribe(raw: &RawOptions) -> Result<ResubscribeLimit, OptionsError> {
    let Some(value) = raw.get("max_num_resubscribe") else {
        return Ok(ResubscribeLimit::default());
    };
    if let Some(n) = value.as_u64() {
        return Ok(ResubscribeLimit::Finite(n));
    }
    match value.as_str() {
        Some("infinity") => Ok(ResubscribeLimit::Infinite),
        _ => Err(OptionsError::BadMaxNumResubscribe(value.clone())),
    }
}

fn validate_resubscribe_interval(raw: &RawOptions) -> Result<Duration, OptionsError> {
    let Some(value) = raw.get("resubscribe_interval") else {
        return Ok(Duration::ZERO);
    };
    value
        .as_u64()
        .map(Duration::from_millis)
        .ok_or_else(|| OptionsError::BadResubscribeInterval(value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_raw_takes_defaults() {
        let options = SchedulerOptions::validate(&RawOptions::new()).unwrap();
        assert_eq!(options, SchedulerOptions::default());
        assert_eq!(options.master_hosts, vec!["localhost:5050".to_string()]);
        assert_eq!(options.heartbeat_timeout_window, Duration::from_millis(5000));
        assert_eq!(options.max_num_resubscribe, ResubscribeLimit::Finite(1));
        assert_eq!(options.resubscribe_interval, Duration::ZERO);
    }

    #[test]
    fn master_hosts_preserve_order() {
        let mut raw = RawOptions::new();
        raw.insert("master_hosts".into(), json!(["b:5050", "a:5050"]));
        let options = SchedulerOptions::validate(&raw).unwrap();
        assert_eq!(options.master_hosts, vec!["b:5050", "a:5050"]);
    }

    #[test]
    fn empty_master_hosts_rejected() {
        let mut raw = RawOptions::new();
        raw.insert("master_hosts".into(), json!([]));
        let err = SchedulerOptions::validate(&raw).unwrap_err();
        assert_eq!(err, OptionsError::BadMasterHosts(json!([])));
    }

    #[test]
    fn non_string_master_host_rejected() {
        let mut raw = RawOptions::new();
        raw.insert("master_hosts".into(), json!(["a:5050", 5050]));
        let err = SchedulerOptions::validate(&raw).unwrap_err();
        assert!(matches!(err, OptionsError::BadMasterHosts(_)));
    }

    #[test]
    fn first_offending_option_wins() {
        // Both master_hosts and resubscribe_interval are bad; validators
        // run in order so master_hosts must be reported.
        let mut raw = RawOptions::new();
        raw.insert("master_hosts".into(), json!("not-a-list"));
        raw.insert("resubscribe_interval".into(), json!("soon"));
        let err = SchedulerOptions::validate(&raw).unwrap_err();
        assert!(matches!(err, OptionsError::BadMasterHosts(_)));
    }

    #[test]
    fn subscribe_req_options_headers_and_timeout() {
        let mut raw = RawOptions::new();
        raw.insert(
            "subscribe_req_options".into(),
            json!({"headers": {"Authorization": "Basic xyz"}, "connect_timeout_ms": 750}),
        );
        let options = SchedulerOptions::validate(&raw).unwrap();
        assert_eq!(
            options.subscribe_req_options.headers,
            vec![("Authorization".to_string(), "Basic xyz".to_string())]
        );
        assert_eq!(
            options.subscribe_req_options.connect_timeout,
            Some(Duration::from_millis(750))
        );
    }

    #[test]
    fn subscribe_req_options_must_be_object() {
        let mut raw = RawOptions::new();
        raw.insert("subscribe_req_options".into(), json!(["not", "an", "object"]));
        let err = SchedulerOptions::validate(&raw).unwrap_err();
        assert!(matches!(err, OptionsError::BadSubscribeReqOptions(_)));
    }

    #[test]
    fn max_num_resubscribe_infinity() {
        let mut raw = RawOptions::new();
        raw.insert("max_num_resubscribe".into(), json!("infinity"));
        let options = SchedulerOptions::validate(&raw).unwrap();
        assert_eq!(options.max_num_resubscribe, ResubscribeLimit::Infinite);
        assert!(!options.max_num_resubscribe.reached(u64::MAX));
    }

    #[test]
    fn max_num_resubscribe_negative_rejected() {
        let mut raw = RawOptions::new();
        raw.insert("max_num_resubscribe".into(), json!(-1));
        let err = SchedulerOptions::validate(&raw).unwrap_err();
        assert!(matches!(err, OptionsError::BadMaxNumResubscribe(_)));
    }

    #[test]
    fn resubscribe_limit_reached() {
        assert!(ResubscribeLimit::Finite(0).reached(0));
        assert!(!ResubscribeLimit::Finite(2).reached(1));
        assert!(ResubscribeLimit::Finite(2).reached(2));
    }

    #[test]
    fn validation_is_idempotent() {
        let mut raw = RawOptions::new();
        raw.insert("master_hosts".into(), json!(["a:5050", "b:5050"]));
        raw.insert("heartbeat_timeout_window".into(), json!(2500));
        raw.insert("max_num_resubscribe".into(), json!("infinity"));
        raw.insert("resubscribe_interval".into(), json!(100));
        raw.insert(
            "subscribe_req_options".into(),
            json!({"headers": {"X-Tag": "prod"}}),
        );

        let first = SchedulerOptions::validate(&raw).unwrap();
        let second = SchedulerOptions::validate(&first.to_raw()).unwrap();
        assert_eq!(first, second);
    }
}
