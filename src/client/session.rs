//! The scheduler session core.
//!
//! A [`Session`] maintains one subscribed stream to a Mesos master on
//! behalf of a user [`Scheduler`]. It owns the subscribe state machine:
//! driving the streaming POST through status → headers → body chunks,
//! following 307 redirects to the elected master, failing over across
//! the configured master list on 503, watching liveness with a
//! heartbeat watchdog, and recovering from every transport-level loss
//! by resubscribing, bounded by `max_num_resubscribe` and spaced by
//! `resubscribe_interval`.
//!
//! # State machine
//!
//! ```text
//!               async_post
//! AwaitingStatus ──────────► AwaitingHeaders ──► AwaitingBody ──► Subscribed
//!       ▲   200/other status      │ 307: push Location,   SUBSCRIBED event:
//!       │                         │      re-subscribe     arm watchdog,
//!       │                         ▼                       reset counters
//!       └──────── resubscribe path (done / error / down / watchdog expiry)
//! ```
//!
//! The session is a single tokio task: one `select!` over the fragment
//! channel, the control channel and at most one armed timer. User
//! callbacks are invoked inline from that task, so they observe events
//! in arrival order and are never called concurrently.

use crate::client::http::{
    Fragment, HttpStreamingClient, StreamHandle, StreamMessage, StreamRequest, StreamingClient,
};
use crate::client::scheduler::{Flow, Scheduler, SchedulerInfo};
use crate::error::{Result, SchedulerError};
use crate::options::{RawOptions, SchedulerOptions};
use crate::protocol::{
    self, Call, EventType, FrameworkId, FrameworkInfo, ParsedEvent, RecordIoDecoder,
    SubscribedEvent,
};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Redirects tolerated on a single subscription path before failing
/// over to the next master.
pub const MAX_REDIRECT: u32 = 5;

/// Cap on how much of a non-2xx response body is collected for the
/// failure report.
const ERROR_BODY_LIMIT: usize = 64 * 1024;

const CHANNEL_CAPACITY: usize = 8;

/// Why a session terminated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Resubscribe attempts exhausted `max_num_resubscribe`.
    MaxAttemptsExceeded,
    /// A user callback returned [`Flow::Stop`].
    CallbackRequested,
    /// The master reported an error and the user `error` callback
    /// requested a stop.
    MasterError(String),
    /// [`SessionHandle::stop`] was called.
    StopRequested,
    /// The session task was torn down from outside.
    Aborted,
}

/// Handle to a running session.
#[derive(Debug)]
pub struct SessionHandle {
    ctrl_tx: mpsc::Sender<Control>,
    task: tokio::task::JoinHandle<ShutdownReason>,
}

impl SessionHandle {
    /// Request an orderly stop. The session closes its stream, cancels
    /// its timers and terminates with [`ShutdownReason::StopRequested`].
    pub fn stop(&self) {
        let _ = self.ctrl_tx.try_send(Control::Stop);
    }

    /// Wait for the session to terminate.
    pub async fn join(self) -> ShutdownReason {
        self.task.await.unwrap_or(ShutdownReason::Aborted)
    }
}

enum Control {
    Stop,
}

/// Start a session for `scheduler` with the given raw options.
///
/// Validates options, calls [`Scheduler::init`] and issues the first
/// subscribe before the driving task is spawned, so configuration
/// errors, an init stop and unreachable hosts all fail `start` itself.
///
/// Must be called from within a tokio runtime.
pub fn start<S: Scheduler>(scheduler: S, raw_options: &RawOptions) -> Result<SessionHandle> {
    let options = SchedulerOptions::validate(raw_options)?;
    let http = HttpStreamingClient::new(options.subscribe_req_options.connect_timeout)?;
    start_with_client(scheduler, options, Arc::new(http))
}

/// [`start`] with an injected [`StreamingClient`].
pub fn start_with_client<S: Scheduler>(
    mut scheduler: S,
    options: SchedulerOptions,
    http: Arc<dyn StreamingClient>,
) -> Result<SessionHandle> {
    let registration = scheduler.init().map_err(SchedulerError::InitStopped)?;

    let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (ctrl_tx, ctrl_rx) = mpsc::channel(1);

    let mut session = Session {
        scheduler,
        master_hosts_queue: options.master_hosts.iter().cloned().collect(),
        options,
        http,
        events_tx,
        events_rx,
        ctrl_rx,
        framework_info: registration.framework_info,
        force: registration.force,
        master_host: String::new(),
        client_ref: None,
        subscribe_state: SubscribeState::AwaitingStatus,
        framework_id: None,
        num_redirect: 0,
        num_resubscribe: 0,
        heartbeat_interval: None,
        timer: None,
        decoder: RecordIoDecoder::new(),
        collected_body: BytesMut::new(),
    };

    if session.try_subscribe() == SubscribeOutcome::Exhausted {
        return Err(SchedulerError::BadHosts);
    }

    let task = tokio::spawn(session.run());
    Ok(SessionHandle { ctrl_tx, task })
}

/// Progress of one subscription's response.
#[derive(Debug)]
enum SubscribeState {
    AwaitingStatus,
    AwaitingHeaders { status: u16 },
    AwaitingBody { status: u16 },
    Subscribed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerKind {
    Heartbeat,
    Resubscribe,
}

#[derive(Debug, PartialEq, Eq)]
enum SubscribeOutcome {
    Started,
    Exhausted,
}

struct Session<S: Scheduler> {
    scheduler: S,
    options: SchedulerOptions,
    http: Arc<dyn StreamingClient>,
    /// Kept so `events_rx.recv()` never observes a closed channel.
    events_tx: mpsc::Sender<StreamMessage>,
    events_rx: mpsc::Receiver<StreamMessage>,
    ctrl_rx: mpsc::Receiver<Control>,
    framework_info: FrameworkInfo,
    force: bool,
    /// Masters not yet tried in the current attempt cycle.
    master_hosts_queue: VecDeque<String>,
    /// Host currently being tried or in use.
    master_host: String,
    client_ref: Option<StreamHandle>,
    subscribe_state: SubscribeState,
    /// Assigned by the master on first registration; never cleared.
    framework_id: Option<FrameworkId>,
    num_redirect: u32,
    num_resubscribe: u64,
    heartbeat_interval: Option<Duration>,
    /// The single armed timer, if any.
    timer: Option<(TimerKind, Instant)>,
    decoder: RecordIoDecoder,
    /// Body of a non-2xx response, collected for the failure report.
    collected_body: BytesMut,
}

impl<S: Scheduler> Session<S> {
    async fn run(mut self) -> ShutdownReason {
        loop {
            let deadline = self.timer.map(|(_, at)| at);
            let flow = tokio::select! {
                message = self.events_rx.recv() => match message {
                    Some(message) => self.on_stream_message(message),
                    None => ControlFlow::Continue(()),
                },
                Some(Control::Stop) = self.ctrl_rx.recv() => {
                    ControlFlow::Break(ShutdownReason::StopRequested)
                }
                _ = wait_until(deadline), if deadline.is_some() => self.on_timer_expired(),
            };
            if let ControlFlow::Break(reason) = flow {
                self.shutdown();
                tracing::info!(reason = ?reason, "session terminated");
                return reason;
            }
        }
    }

    // ---- subscribe procedure ------------------------------------------

    /// Pop masters off the queue until a subscribe request is issued.
    fn try_subscribe(&mut self) -> SubscribeOutcome {
        while let Some(host) = self.master_hosts_queue.pop_front() {
            match self.open_stream(&host) {
                Ok(handle) => {
                    tracing::debug!(master = %host, stream = handle.id(), "subscribe issued");
                    self.master_host = host;
                    self.client_ref = Some(handle);
                    self.subscribe_state = SubscribeState::AwaitingStatus;
                    self.decoder.reset();
                    self.collected_body.clear();
                    // A master that accepts the connection but stays
                    // silent must still trip the watchdog once the
                    // heartbeat interval is known.
                    if let Some(interval) = self.heartbeat_interval {
                        self.arm_timer(
                            TimerKind::Heartbeat,
                            interval + self.options.heartbeat_timeout_window,
                        );
                    }
                    return SubscribeOutcome::Started;
                }
                Err(e) => {
                    tracing::warn!(master = %host, error = %e, "subscribe attempt failed");
                }
            }
        }
        SubscribeOutcome::Exhausted
    }

    fn open_stream(&self, host: &str) -> Result<StreamHandle> {
        let url = format!("http://{}/api/v1/scheduler", host);
        let call = match &self.framework_id {
            None => Call::subscribe(self.framework_info.clone(), self.force),
            Some(id) => Call::resubscribe(self.framework_info.clone(), id.clone()),
        };
        let body = protocol::encode_call(self.options.data_format, &call)?;
        let request = StreamRequest {
            url,
            headers: self.build_headers(),
            body,
        };
        self.http.async_post(request, self.events_tx.clone())
    }

    /// User headers never override `Content-Type`, `Accept` or
    /// `Connection`.
    fn build_headers(&self) -> Vec<(String, String)> {
        let content_type = self.options.data_format.content_type();
        let reserved = ["content-type", "accept", "connection"];
        let mut headers: Vec<(String, String)> = self
            .options
            .subscribe_req_options
            .headers
            .iter()
            .filter(|(name, _)| !reserved.iter().any(|r| name.eq_ignore_ascii_case(r)))
            .cloned()
            .collect();
        headers.push(("Content-Type".to_string(), content_type.to_string()));
        headers.push(("Accept".to_string(), content_type.to_string()));
        headers.push(("Connection".to_string(), "close".to_string()));
        headers
    }

    // ---- fragment handling --------------------------------------------

    fn on_stream_message(&mut self, message: StreamMessage) -> ControlFlow<ShutdownReason> {
        let current = self.client_ref.as_ref().map(StreamHandle::id);
        if current != Some(message.stream) {
            tracing::debug!(stream = message.stream, "discarding fragment from stale stream");
            return ControlFlow::Continue(());
        }
        match message.fragment {
            Fragment::Status { code, reason } => self.on_status(code, &reason),
            Fragment::Headers(headers) => self.on_headers(headers),
            Fragment::BodyChunk(chunk) => self.on_body_chunk(chunk),
            Fragment::Done => {
                tracing::debug!(master = %self.master_host, "event stream ended");
                self.begin_resubscribe()
            }
            Fragment::Error(reason) => {
                tracing::warn!(master = %self.master_host, error = %reason, "stream error");
                self.begin_resubscribe()
            }
            Fragment::Down(reason) => {
                tracing::warn!(master = %self.master_host, reason = %reason, "stream went down");
                self.begin_resubscribe()
            }
        }
    }

    fn on_status(&mut self, code: u16, reason: &str) -> ControlFlow<ShutdownReason> {
        if !matches!(self.subscribe_state, SubscribeState::AwaitingStatus) {
            tracing::warn!(code, "unexpected status fragment, abandoning stream");
            return self.begin_resubscribe();
        }
        if code == 503 {
            // No leader behind this host.
            tracing::warn!(master = %self.master_host, "master unavailable, failing over");
            self.close_stream();
            return self.failover();
        }
        tracing::debug!(code, reason, "subscribe response status");
        self.subscribe_state = SubscribeState::AwaitingHeaders { status: code };
        self.pull_next();
        ControlFlow::Continue(())
    }

    fn on_headers(&mut self, headers: Vec<(String, String)>) -> ControlFlow<ShutdownReason> {
        let status = match self.subscribe_state {
            SubscribeState::AwaitingHeaders { status } => status,
            _ => {
                tracing::warn!("unexpected headers fragment, abandoning stream");
                return self.begin_resubscribe();
            }
        };
        if status == 307 {
            return self.on_redirect(&headers);
        }
        self.subscribe_state = SubscribeState::AwaitingBody { status };
        self.pull_next();
        ControlFlow::Continue(())
    }

    fn on_redirect(&mut self, headers: &[(String, String)]) -> ControlFlow<ShutdownReason> {
        self.num_redirect += 1;
        self.close_stream();

        if self.num_redirect > MAX_REDIRECT {
            tracing::warn!(
                redirects = self.num_redirect,
                max = MAX_REDIRECT,
                "redirect limit exceeded, failing over"
            );
            return self.failover();
        }

        let location = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("location"))
            .map(|(_, value)| value.as_str());
        match location.and_then(redirect_host) {
            Some(host) => {
                tracing::debug!(master = %host, "following redirect to elected master");
                self.master_hosts_queue.push_front(host);
                self.failover()
            }
            None => {
                tracing::warn!("redirect without usable Location header, failing over");
                self.failover()
            }
        }
    }

    /// Advance to the next candidate master, entering the resubscribe
    /// path when none is left.
    fn failover(&mut self) -> ControlFlow<ShutdownReason> {
        match self.try_subscribe() {
            SubscribeOutcome::Started => ControlFlow::Continue(()),
            SubscribeOutcome::Exhausted => self.begin_resubscribe(),
        }
    }

    fn on_body_chunk(&mut self, chunk: Bytes) -> ControlFlow<ShutdownReason> {
        match self.subscribe_state {
            SubscribeState::AwaitingBody { status: 200 } | SubscribeState::Subscribed => {
                self.on_event_bytes(&chunk)
            }
            SubscribeState::AwaitingBody { .. } => {
                let available = ERROR_BODY_LIMIT.saturating_sub(self.collected_body.len());
                let take = available.min(chunk.len());
                self.collected_body.extend_from_slice(&chunk[..take]);
                self.pull_next();
                ControlFlow::Continue(())
            }
            _ => {
                tracing::warn!("unexpected body fragment, abandoning stream");
                self.begin_resubscribe()
            }
        }
    }

    fn on_event_bytes(&mut self, chunk: &[u8]) -> ControlFlow<ShutdownReason> {
        let records = match self.decoder.feed(chunk) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "malformed event stream, abandoning stream");
                return self.begin_resubscribe();
            }
        };
        for record in records {
            let event = match protocol::decode_event(self.options.data_format, &record) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable event, abandoning stream");
                    return self.begin_resubscribe();
                }
            };
            let parsed = match protocol::parse_event(event) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed event, abandoning stream");
                    return self.begin_resubscribe();
                }
            };
            if let ControlFlow::Break(reason) = self.dispatch(parsed) {
                return ControlFlow::Break(reason);
            }
        }
        if self.client_ref.is_some() {
            self.pull_next();
        }
        ControlFlow::Continue(())
    }

    // ---- event dispatch -----------------------------------------------

    fn dispatch(&mut self, parsed: ParsedEvent) -> ControlFlow<ShutdownReason> {
        match parsed {
            ParsedEvent::Subscribed {
                event,
                heartbeat_interval,
            } => self.on_subscribed(event, heartbeat_interval),
            ParsedEvent::Heartbeat => {
                if let Some(interval) = self.heartbeat_interval {
                    self.arm_timer(
                        TimerKind::Heartbeat,
                        interval + self.options.heartbeat_timeout_window,
                    );
                }
                ControlFlow::Continue(())
            }
            ParsedEvent::Error(error) => {
                tracing::warn!(message = %error.message, "master reported error");
                let info = self.scheduler_info();
                match self.scheduler.error(&info, &error) {
                    Flow::Continue => ControlFlow::Continue(()),
                    Flow::Stop => ControlFlow::Break(ShutdownReason::MasterError(error.message)),
                }
            }
            ParsedEvent::Other(event) => {
                let info = self.scheduler_info();
                let flow = match event.event_type {
                    EventType::Offers => match &event.offers {
                        Some(payload) => self.scheduler.offers(&info, payload),
                        None => self.scheduler.event(&info, &event),
                    },
                    EventType::Rescind => match &event.rescind {
                        Some(payload) => self.scheduler.rescind(&info, payload),
                        None => self.scheduler.event(&info, &event),
                    },
                    EventType::Update => match &event.update {
                        Some(payload) => self.scheduler.update(&info, payload),
                        None => self.scheduler.event(&info, &event),
                    },
                    EventType::Message => match &event.message {
                        Some(payload) => self.scheduler.message(&info, payload),
                        None => self.scheduler.event(&info, &event),
                    },
                    EventType::Failure => match &event.failure {
                        Some(payload) => self.scheduler.failure(&info, payload),
                        None => self.scheduler.event(&info, &event),
                    },
                    _ => self.scheduler.event(&info, &event),
                };
                match flow {
                    Flow::Continue => ControlFlow::Continue(()),
                    Flow::Stop => ControlFlow::Break(ShutdownReason::CallbackRequested),
                }
            }
        }
    }

    fn on_subscribed(
        &mut self,
        event: SubscribedEvent,
        heartbeat_interval: Duration,
    ) -> ControlFlow<ShutdownReason> {
        let already_subscribed = matches!(self.subscribe_state, SubscribeState::Subscribed);
        let first_registration = self.framework_id.is_none();

        if first_registration {
            self.framework_id = Some(event.framework_id.clone());
        } else if self.framework_id.as_ref() != Some(&event.framework_id) {
            // The id is stable for the process lifetime; keep ours.
            tracing::warn!(
                known = %self.framework_id.as_ref().map(ToString::to_string).unwrap_or_default(),
                echoed = %event.framework_id,
                "master echoed a different framework id"
            );
        }

        self.heartbeat_interval = Some(heartbeat_interval);
        self.num_redirect = 0;
        self.num_resubscribe = 0;
        self.subscribe_state = SubscribeState::Subscribed;
        self.arm_timer(
            TimerKind::Heartbeat,
            heartbeat_interval + self.options.heartbeat_timeout_window,
        );

        if already_subscribed {
            return ControlFlow::Continue(());
        }

        let info = self.scheduler_info();
        let flow = if first_registration {
            tracing::info!(
                framework_id = %event.framework_id,
                master = %self.master_host,
                "registered"
            );
            self.scheduler.registered(&info, &event)
        } else {
            tracing::info!(master = %self.master_host, "re-registered");
            self.scheduler.reregistered(&info)
        };
        match flow {
            Flow::Continue => ControlFlow::Continue(()),
            Flow::Stop => ControlFlow::Break(ShutdownReason::CallbackRequested),
        }
    }

    // ---- timers and recovery ------------------------------------------

    fn on_timer_expired(&mut self) -> ControlFlow<ShutdownReason> {
        let Some((kind, _)) = self.timer.take() else {
            return ControlFlow::Continue(());
        };
        match kind {
            TimerKind::Heartbeat => {
                tracing::warn!(master = %self.master_host, "heartbeat watchdog expired");
                self.begin_resubscribe()
            }
            TimerKind::Resubscribe => self.failover(),
        }
    }

    /// The resubscribe path: close the stream, inform the user, check
    /// the attempt bound, refill the master queue and try again,
    /// immediately or after `resubscribe_interval`.
    fn begin_resubscribe(&mut self) -> ControlFlow<ShutdownReason> {
        loop {
            if let SubscribeState::AwaitingBody { status } = self.subscribe_state {
                if status != 200 {
                    tracing::warn!(
                        status,
                        master = %self.master_host,
                        body = %String::from_utf8_lossy(&self.collected_body),
                        "subscribe rejected"
                    );
                }
            }
            self.close_stream();
            self.clear_timer();

            if matches!(self.subscribe_state, SubscribeState::Subscribed) {
                tracing::info!(master = %self.master_host, "disconnected from master");
                let info = self.scheduler_info();
                if self.scheduler.disconnected(&info) == Flow::Stop {
                    return ControlFlow::Break(ShutdownReason::CallbackRequested);
                }
            }
            self.subscribe_state = SubscribeState::AwaitingStatus;

            if self.options.max_num_resubscribe.reached(self.num_resubscribe) {
                tracing::error!(
                    attempts = self.num_resubscribe,
                    "resubscribe attempts exhausted"
                );
                return ControlFlow::Break(ShutdownReason::MaxAttemptsExceeded);
            }
            self.num_resubscribe += 1;
            self.master_hosts_queue = self.options.master_hosts.iter().cloned().collect();

            if self.options.resubscribe_interval > Duration::ZERO {
                self.arm_timer(TimerKind::Resubscribe, self.options.resubscribe_interval);
                return ControlFlow::Continue(());
            }
            match self.try_subscribe() {
                SubscribeOutcome::Started => return ControlFlow::Continue(()),
                SubscribeOutcome::Exhausted => continue,
            }
        }
    }

    fn arm_timer(&mut self, kind: TimerKind, after: Duration) {
        self.timer = Some((kind, Instant::now() + after));
    }

    fn clear_timer(&mut self) {
        self.timer = None;
    }

    fn pull_next(&self) {
        if let Some(handle) = &self.client_ref {
            handle.pull_next();
        }
    }

    fn close_stream(&mut self) {
        if let Some(mut handle) = self.client_ref.take() {
            handle.close();
        }
    }

    fn scheduler_info(&self) -> SchedulerInfo {
        SchedulerInfo {
            data_format: self.options.data_format,
            master_host: self.master_host.clone(),
            framework_id: self.framework_id.clone(),
        }
    }

    fn shutdown(&mut self) {
        self.clear_timer();
        self.close_stream();
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Reduce a `Location` header to a `host:port` candidate.
///
/// Masters send absolute (`http://host:port/...`) and scheme-relative
/// (`//host:port/...`) forms.
fn redirect_host(location: &str) -> Option<String> {
    let trimmed = location.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.starts_with("//") {
        format!("http:{}", trimmed)
    } else if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    let url = url::Url::parse(&candidate).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
