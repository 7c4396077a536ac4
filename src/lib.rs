//! Mesos v1 HTTP Scheduler API client.
//!
//! This crate maintains a subscribed session to a Mesos master on
//! behalf of a user-provided [`Scheduler`] implementation. The session
//! survives master failover, HTTP redirects, transient network errors
//! and silent connection loss, and dispatches decoded events to the
//! user's callbacks.
//!
//! # Overview
//!
//! - **Subscribe state machine**: a streaming POST to
//!   `/api/v1/scheduler` is driven through its response lifecycle
//!   (status → headers → body chunks → done/error), with 307 redirects
//!   consumed internally and 503 triggering failover to the next
//!   candidate master.
//! - **Heartbeat watchdog**: the master declares a heartbeat interval
//!   on registration; silence past `interval + heartbeat_timeout_window`
//!   tears the stream down and resubscribes.
//! - **Bounded recovery**: resubscribe attempts are counted since the
//!   last successful registration, bounded by `max_num_resubscribe` and
//!   spaced by `resubscribe_interval`.
//! - **Stable identity**: the framework id assigned on first
//!   registration is carried on every re-subscription for the process
//!   lifetime.
//!
//! # Modules
//!
//! - [`client`] - session core, user contract, HTTP streaming adapter
//! - [`protocol`] - calls, events and RecordIO framing
//! - [`options`] - session option validation
//! - [`error`] - error types
//!
//! # Quick Start
//!
//! ```ignore
//! use mesos_scheduler::{start, Flow, FrameworkInfo, RawOptions, Registration,
//!                       Scheduler, SchedulerInfo};
//! use mesos_scheduler::protocol::{ErrorEvent, SubscribedEvent};
//! use serde_json::json;
//!
//! struct MyFramework;
//!
//! impl Scheduler for MyFramework {
//!     fn init(&mut self) -> Result<Registration, String> {
//!         Ok(Registration::new(FrameworkInfo::new("root", "my-framework")))
//!     }
//!     fn registered(&mut self, info: &SchedulerInfo, ev: &SubscribedEvent) -> Flow {
//!         println!("registered as {} via {}", ev.framework_id, info.master_host);
//!         Flow::Continue
//!     }
//!     fn reregistered(&mut self, _: &SchedulerInfo) -> Flow { Flow::Continue }
//!     fn disconnected(&mut self, _: &SchedulerInfo) -> Flow { Flow::Continue }
//!     fn error(&mut self, _: &SchedulerInfo, _: &ErrorEvent) -> Flow { Flow::Stop }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut raw = RawOptions::new();
//!     raw.insert("master_hosts".into(), json!(["10.0.0.1:5050", "10.0.0.2:5050"]));
//!     let session = start(MyFramework, &raw)?;
//!     let reason = session.join().await;
//!     eprintln!("session ended: {:?}", reason);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod options;
pub mod protocol;

pub use client::{
    start, start_with_client, Flow, HttpStreamingClient, Registration, Scheduler, SchedulerInfo,
    SessionHandle, ShutdownReason, StreamingClient,
};
pub use error::{Result, SchedulerError};
pub use options::{OptionsError, RawOptions, RequestOptions, ResubscribeLimit, SchedulerOptions};
pub use protocol::{DataFormat, FrameworkId, FrameworkInfo};
