//! The user scheduler contract.
//!
//! A framework author implements [`Scheduler`] and hands the value to
//! [`start`](crate::client::session::start). The implementing value is
//! the framework's own state: the session task is the only caller, so
//! callbacks can mutate it freely through `&mut self`.
//!
//! Callbacks return [`Flow`]: [`Flow::Continue`] keeps the session
//! running, [`Flow::Stop`] terminates it with
//! [`ShutdownReason::CallbackRequested`](crate::client::session::ShutdownReason).
//! Callbacks are invoked sequentially from the session's driving task
//! and must not block indefinitely.
//!
//! # Example
//!
//! ```ignore
//! use mesos_scheduler::{Flow, FrameworkInfo, Registration, Scheduler, SchedulerInfo};
//! use mesos_scheduler::protocol::SubscribedEvent;
//!
//! struct MyFramework {
//!     tasks_launched: u64,
//! }
//!
//! impl Scheduler for MyFramework {
//!     fn init(&mut self) -> Result<Registration, String> {
//!         Ok(Registration::new(FrameworkInfo::new("root", "my-framework")))
//!     }
//!
//!     fn registered(&mut self, info: &SchedulerInfo, event: &SubscribedEvent) -> Flow {
//!         println!("registered as {} via {}", event.framework_id, info.master_host);
//!         Flow::Continue
//!     }
//!
//!     fn reregistered(&mut self, _info: &SchedulerInfo) -> Flow { Flow::Continue }
//!     fn disconnected(&mut self, _info: &SchedulerInfo) -> Flow { Flow::Continue }
//!     fn error(&mut self, _info: &SchedulerInfo, e: &mesos_scheduler::protocol::ErrorEvent) -> Flow {
//!         eprintln!("master error: {}", e.message);
//!         Flow::Stop
//!     }
//! }
//! ```

use crate::protocol::{
    DataFormat, ErrorEvent, Event, FailureEvent, FrameworkId, FrameworkInfo, MessageEvent,
    OffersEvent, RescindEvent, SubscribedEvent, UpdateEvent,
};

/// What a callback wants the session to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Keep the session running.
    Continue,
    /// Terminate the session.
    Stop,
}

/// The registration data `init` supplies for the subscribe payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Registration {
    /// The framework's self-description.
    pub framework_info: FrameworkInfo,
    /// Force re-registration, replacing a live session for the same id.
    pub force: bool,
}

impl Registration {
    /// Registration without the force flag.
    #[must_use]
    pub fn new(framework_info: FrameworkInfo) -> Self {
        Registration {
            framework_info,
            force: false,
        }
    }

    /// Set the force flag.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Immutable snapshot of session identity, rebuilt for every callback.
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerInfo {
    /// Wire format of the session.
    pub data_format: DataFormat,
    /// Master host currently in use.
    pub master_host: String,
    /// Framework id; `None` only before the first registration.
    pub framework_id: Option<FrameworkId>,
}

/// Callback set implemented by the library's user.
///
/// `init`, `registered`, `reregistered`, `disconnected` and `error` are
/// required. The per-event callbacks default to [`Flow::Continue`];
/// override the ones the framework cares about.
pub trait Scheduler: Send + 'static {
    /// Called once at startup, before the first subscribe. `Err`
    /// carries the user's stop reason and fails startup.
    fn init(&mut self) -> Result<Registration, String>;

    /// First successful registration: the master assigned a framework id.
    fn registered(&mut self, info: &SchedulerInfo, event: &SubscribedEvent) -> Flow;

    /// Re-registration after a disconnect, under the existing id.
    fn reregistered(&mut self, info: &SchedulerInfo) -> Flow;

    /// The subscribed stream was lost; a resubscribe follows.
    fn disconnected(&mut self, info: &SchedulerInfo) -> Flow;

    /// Terminal master-side error. Return [`Flow::Stop`] to shut the
    /// session down with the error's message.
    fn error(&mut self, info: &SchedulerInfo, event: &ErrorEvent) -> Flow;

    /// Resource offers.
    fn offers(&mut self, _info: &SchedulerInfo, _event: &OffersEvent) -> Flow {
        Flow::Continue
    }

    /// An offer was rescinded.
    fn rescind(&mut self, _info: &SchedulerInfo, _event: &RescindEvent) -> Flow {
        Flow::Continue
    }

    /// Task status update.
    fn update(&mut self, _info: &SchedulerInfo, _event: &UpdateEvent) -> Flow {
        Flow::Continue
    }

    /// Executor-to-framework message.
    fn message(&mut self, _info: &SchedulerInfo, _event: &MessageEvent) -> Flow {
        Flow::Continue
    }

    /// Agent or executor failure.
    fn failure(&mut self, _info: &SchedulerInfo, _event: &FailureEvent) -> Flow {
        Flow::Continue
    }

    /// Fallback for event kinds this client does not model.
    fn event(&mut self, _info: &SchedulerInfo, _event: &Event) -> Flow {
        Flow::Continue
    }
}
