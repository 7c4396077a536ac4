//! HTTP streaming adapter.
//!
//! The session core never touches an HTTP library directly. It consumes
//! the [`StreamingClient`] interface: [`StreamingClient::async_post`]
//! starts a streaming POST and returns immediately with a
//! [`StreamHandle`]; response fragments are then delivered to the
//! session's channel as [`StreamMessage`]s.
//!
//! Delivery is pull-based: the first fragment (the status line, or a
//! transport error) arrives unprompted, and every subsequent fragment is
//! sent only after one [`StreamHandle::pull_next`]. This keeps at most
//! one fragment in flight per stream no matter how fast the master
//! produces events.
//!
//! [`HttpStreamingClient`] is the production implementation on top of
//! `reqwest`. Automatic redirect following is disabled (the session owns
//! 307 handling) and the subscribe request carries no receive timeout;
//! liveness is the watchdog's job, not the transport's.

use crate::error::{Result, SchedulerError};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identifier of one streaming request, unique within a client.
pub type StreamId = u64;

/// One fragment of a streaming response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Status line.
    Status {
        /// HTTP status code.
        code: u16,
        /// Canonical reason phrase, possibly empty.
        reason: String,
    },
    /// Response headers, in wire order.
    Headers(Vec<(String, String)>),
    /// One body chunk.
    BodyChunk(Bytes),
    /// The body ended cleanly.
    Done,
    /// The transport failed.
    Error(String),
    /// The stream task died without delivering a terminal fragment.
    Down(String),
}

/// A fragment tagged with the stream it belongs to.
#[derive(Debug)]
pub struct StreamMessage {
    /// The originating stream.
    pub stream: StreamId,
    /// The fragment.
    pub fragment: Fragment,
}

/// A subscribe request handed to the adapter.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Absolute request URL.
    pub url: String,
    /// Headers, already merged by the session.
    pub headers: Vec<(String, String)>,
    /// Encoded call body.
    pub body: Bytes,
}

/// Handle to an in-flight streaming request.
///
/// Dropping the handle closes the stream; [`StreamHandle::close`] is
/// idempotent.
#[derive(Debug)]
pub struct StreamHandle {
    id: StreamId,
    pull_tx: mpsc::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Create a handle over a running stream task. Used by
    /// [`StreamingClient`] implementations.
    #[must_use]
    pub fn new(id: StreamId, pull_tx: mpsc::Sender<()>, task: JoinHandle<()>) -> Self {
        StreamHandle {
            id,
            pull_tx,
            task: Some(task),
        }
    }

    /// The stream's identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Request the next fragment. At most one request is buffered;
    /// further calls before the fragment arrives are no-ops.
    pub fn pull_next(&self) {
        let _ = self.pull_tx.try_send(());
    }

    /// Release the stream, aborting the in-flight request.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// The streaming interface the session core consumes.
pub trait StreamingClient: Send + Sync + 'static {
    /// Start a streaming POST. Returns immediately; fragments are
    /// delivered to `events` as they become available.
    fn async_post(
        &self,
        request: StreamRequest,
        events: mpsc::Sender<StreamMessage>,
    ) -> Result<StreamHandle>;
}

/// Production [`StreamingClient`] backed by `reqwest`.
pub struct HttpStreamingClient {
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpStreamingClient {
    /// Build a client with the streaming options the session requires.
    pub fn new(connect_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_idle_timeout(Duration::from_secs(90));
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| SchedulerError::Http(e.to_string()))?;
        Ok(HttpStreamingClient {
            client,
            next_id: AtomicU64::new(1),
        })
    }

    /// Wrap an existing `reqwest` client.
    ///
    /// The caller is responsible for having disabled automatic redirect
    /// following and request timeouts.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        HttpStreamingClient {
            client,
            next_id: AtomicU64::new(1),
        }
    }
}

impl StreamingClient for HttpStreamingClient {
    fn async_post(
        &self,
        request: StreamRequest,
        events: mpsc::Sender<StreamMessage>,
    ) -> Result<StreamHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (pull_tx, pull_rx) = mpsc::channel(1);

        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = builder.body(request.body.clone());

        let task = tokio::spawn(pump(id, builder, events, pull_rx));
        Ok(StreamHandle::new(id, pull_tx, task))
    }
}

/// Drive one response through its fragment lifecycle.
async fn pump(
    id: StreamId,
    builder: reqwest::RequestBuilder,
    events: mpsc::Sender<StreamMessage>,
    mut pull_rx: mpsc::Receiver<()>,
) {
    let mut guard = DownGuard {
        id,
        events: events.clone(),
        armed: true,
    };

    let send = |fragment: Fragment| {
        let events = events.clone();
        async move {
            events
                .send(StreamMessage {
                    stream: id,
                    fragment,
                })
                .await
                .is_ok()
        }
    };

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => {
            guard.disarm();
            send(Fragment::Error(e.to_string())).await;
            return;
        }
    };

    let status = response.status();
    let delivered = send(Fragment::Status {
        code: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("").to_string(),
    })
    .await;
    if !delivered {
        guard.disarm();
        return;
    }

    if pull_rx.recv().await.is_none() {
        guard.disarm();
        return;
    }
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    if !send(Fragment::Headers(headers)).await {
        guard.disarm();
        return;
    }

    let mut body = response.bytes_stream();
    loop {
        if pull_rx.recv().await.is_none() {
            guard.disarm();
            return;
        }
        match body.next().await {
            Some(Ok(chunk)) => {
                if !send(Fragment::BodyChunk(chunk)).await {
                    guard.disarm();
                    return;
                }
            }
            Some(Err(e)) => {
                guard.disarm();
                send(Fragment::Error(e.to_string())).await;
                return;
            }
            None => {
                guard.disarm();
                send(Fragment::Done).await;
                return;
            }
        }
    }
}

/// Emits a `Down` notification if the pump dies without a terminal
/// fragment, e.g. on abort or panic.
struct DownGuard {
    id: StreamId,
    events: mpsc::Sender<StreamMessage>,
    armed: bool,
}

impl DownGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DownGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.events.try_send(StreamMessage {
                stream: self.id,
                fragment: Fragment::Down("stream task aborted".to_string()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_is_idempotent() {
        let (pull_tx, _pull_rx) = mpsc::channel(1);
        let task = tokio::spawn(async {});
        let mut handle = StreamHandle::new(7, pull_tx, task);
        assert_eq!(handle.id(), 7);
        handle.close();
        handle.close();
    }

    #[tokio::test]
    async fn aborted_pump_emits_down() {
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (pull_tx, mut pull_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let _guard = DownGuard {
                id: 3,
                events: events_tx,
                armed: true,
            };
            // Block forever; the abort below tears the task down.
            let _ = pull_rx.recv().await;
            std::future::pending::<()>().await;
        });

        let mut handle = StreamHandle::new(3, pull_tx, task);
        tokio::task::yield_now().await;
        handle.close();

        let message = events_rx.recv().await.expect("down notification");
        assert_eq!(message.stream, 3);
        assert!(matches!(message.fragment, Fragment::Down(_)));
    }
}
