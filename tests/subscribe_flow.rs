//! End-to-end subscribe flows against an in-process mock master.

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use futures::stream;
use futures::StreamExt;
use mesos_scheduler::protocol::{encode_frame, ErrorEvent, SubscribedEvent};
use mesos_scheduler::{
    start, Flow, FrameworkInfo, RawOptions, Registration, Scheduler, SchedulerError, SchedulerInfo,
    ShutdownReason,
};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Clone)]
enum MasterBehavior {
    /// 200 with a RecordIO event stream that stays open.
    Stream(Vec<Bytes>),
    /// 307 to another master.
    Redirect(String),
    /// 503, no leader here.
    Unavailable,
}

async fn spawn_master(behavior: MasterBehavior) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock master");
    let addr = listener.local_addr().expect("local addr");
    let app = Router::new().route(
        "/api/v1/scheduler",
        post(move || {
            let behavior = behavior.clone();
            async move { respond(behavior) }
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock master");
    });
    addr
}

fn respond(behavior: MasterBehavior) -> Response<Body> {
    match behavior {
        MasterBehavior::Stream(frames) => {
            let chunks = stream::iter(frames.into_iter().map(Ok::<_, Infallible>))
                .chain(stream::pending());
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/json")
                .body(Body::from_stream(chunks))
                .expect("stream response")
        }
        MasterBehavior::Redirect(location) => Response::builder()
            .status(StatusCode::TEMPORARY_REDIRECT)
            .header("Location", location)
            .body(Body::empty())
            .expect("redirect response"),
        MasterBehavior::Unavailable => Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .body(Body::empty())
            .expect("unavailable response"),
    }
}

fn subscribed_frame(id: &str, interval_seconds: f64) -> Bytes {
    encode_frame(
        json!({
            "type": "SUBSCRIBED",
            "subscribed": {
                "framework_id": {"value": id},
                "heartbeat_interval_seconds": interval_seconds
            }
        })
        .to_string()
        .as_bytes(),
    )
}

fn heartbeat_frame() -> Bytes {
    encode_frame(json!({"type": "HEARTBEAT"}).to_string().as_bytes())
}

struct ProbeScheduler {
    events: mpsc::UnboundedSender<String>,
}

impl Scheduler for ProbeScheduler {
    fn init(&mut self) -> Result<Registration, String> {
        Ok(Registration::new(FrameworkInfo::new("root", "flow-test")))
    }

    fn registered(&mut self, info: &SchedulerInfo, event: &SubscribedEvent) -> Flow {
        let _ = self.events.send(format!(
            "registered:{}@{}",
            event.framework_id, info.master_host
        ));
        Flow::Continue
    }

    fn reregistered(&mut self, info: &SchedulerInfo) -> Flow {
        let _ = self.events.send(format!("reregistered@{}", info.master_host));
        Flow::Continue
    }

    fn disconnected(&mut self, _info: &SchedulerInfo) -> Flow {
        let _ = self.events.send("disconnected".to_string());
        Flow::Continue
    }

    fn error(&mut self, _info: &SchedulerInfo, event: &ErrorEvent) -> Flow {
        let _ = self.events.send(format!("error:{}", event.message));
        Flow::Continue
    }
}

fn session_options(hosts: &[SocketAddr]) -> RawOptions {
    let mut raw = RawOptions::new();
    raw.insert(
        "master_hosts".into(),
        json!(hosts.iter().map(ToString::to_string).collect::<Vec<_>>()),
    );
    raw
}

async fn expect_event(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for callback")
        .expect("callback channel closed")
}

#[tokio::test]
async fn registers_against_live_master() {
    let master = spawn_master(MasterBehavior::Stream(vec![
        subscribed_frame("f-1", 15.0),
        heartbeat_frame(),
    ]))
    .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = start(ProbeScheduler { events: tx }, &session_options(&[master]))
        .expect("start session");

    assert_eq!(
        expect_event(&mut rx).await,
        format!("registered:f-1@{}", master)
    );

    session.stop();
    assert_eq!(session.join().await, ShutdownReason::StopRequested);
}

#[tokio::test]
async fn follows_redirect_to_elected_master() {
    let leader = spawn_master(MasterBehavior::Stream(vec![subscribed_frame(
        "f-redir", 15.0,
    )]))
    .await;
    let front = spawn_master(MasterBehavior::Redirect(format!(
        "http://{}/api/v1/scheduler",
        leader
    )))
    .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = start(ProbeScheduler { events: tx }, &session_options(&[front]))
        .expect("start session");

    assert_eq!(
        expect_event(&mut rx).await,
        format!("registered:f-redir@{}", leader)
    );

    session.stop();
    session.join().await;
}

#[tokio::test]
async fn fails_over_when_leader_unavailable() {
    let dead = spawn_master(MasterBehavior::Unavailable).await;
    let live = spawn_master(MasterBehavior::Stream(vec![subscribed_frame(
        "f-over", 15.0,
    )]))
    .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = start(
        ProbeScheduler { events: tx },
        &session_options(&[dead, live]),
    )
    .expect("start session");

    assert_eq!(
        expect_event(&mut rx).await,
        format!("registered:f-over@{}", live)
    );

    session.stop();
    session.join().await;
}

#[tokio::test]
async fn empty_master_hosts_fail_before_any_request() {
    let mut raw = RawOptions::new();
    raw.insert("master_hosts".into(), json!([]));

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = start(ProbeScheduler { events: tx }, &raw).unwrap_err();
    assert!(matches!(err, SchedulerError::BadOptions(_)));
}
