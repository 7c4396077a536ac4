//! Scheduler session client.
//!
//! This module provides the long-lived client side of the Mesos v1
//! Scheduler API:
//!
//! - **Subscribe** to a master and keep the event stream alive
//! - **Fail over** across candidate masters and follow 307 redirects
//! - **Watch liveness** via the master's heartbeats
//! - **Resubscribe** with bounded attempts after any disconnect
//! - **Dispatch** decoded events to user callbacks
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── http       - streaming POST adapter (pull-based fragments)
//! ├── scheduler  - user callback contract
//! └── session    - the subscribe state machine
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Scheduler`] | Callback set implemented by the framework author |
//! | [`SessionHandle`] | Running session: `stop()` / `join()` |
//! | [`SchedulerInfo`] | Per-callback snapshot of session identity |
//! | [`StreamingClient`] | Transport seam consumed by the session |
//! | [`ShutdownReason`] | Why a session terminated |

pub mod http;
pub mod scheduler;
pub mod session;

pub use http::{
    Fragment, HttpStreamingClient, StreamHandle, StreamId, StreamMessage, StreamRequest,
    StreamingClient,
};
pub use scheduler::{Flow, Registration, Scheduler, SchedulerInfo};
pub use session::{start, start_with_client, SessionHandle, ShutdownReason, MAX_REDIRECT};
