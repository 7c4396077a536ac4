//! Error types for the scheduler client.

use crate::options::OptionsError;

/// Errors surfaced by the scheduler client.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Option validation failed at startup.
    #[error("bad options: {0}")]
    BadOptions(#[from] OptionsError),

    /// The user scheduler's `init` requested a stop.
    #[error("init stopped: {0}")]
    InitStopped(String),

    /// Every candidate master was tried without a subscribe request
    /// being issued.
    #[error("no usable master host")]
    BadHosts,

    /// Transport-level failure reported by the HTTP streaming adapter.
    #[error("http transport error: {0}")]
    Http(String),

    /// Encoding or decoding of a scheduler call or event failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// A RecordIO frame could not be parsed from the event stream.
    #[error("malformed record stream: {0}")]
    Recordio(String),
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Codec(err.to_string())
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_hosts_display() {
        let e = SchedulerError::BadHosts;
        assert_eq!(e.to_string(), "no usable master host");
    }

    #[test]
    fn codec_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let e: SchedulerError = json_err.into();
        assert!(matches!(e, SchedulerError::Codec(_)));
    }
}
