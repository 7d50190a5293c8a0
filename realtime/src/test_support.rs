//! In-memory transport and cache fakes shared by the unit tests.

use crate::client::RealtimeClient;
use crate::connection::{ConnectRequest, Connector, Link, LinkEvent};
use crate::error::{transport_error, Result, TransportErrorKind};
use crate::invalidation::Cache;
use crate::state::Status;
use async_trait::async_trait;
use events::RealtimeEvent;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(600);

/// Connector whose links are driven by the test through [`MockServer`]s.
pub(crate) struct MockConnector {
    accepted: mpsc::UnboundedSender<MockServer>,
    refusing: AtomicBool,
    hanging: AtomicBool,
    stalled_sends: Arc<AtomicBool>,
    attempts: AtomicUsize,
}

/// Test side of a [`MockConnector`].
pub(crate) struct MockHub {
    accepted: mpsc::UnboundedReceiver<MockServer>,
    connector: Arc<MockConnector>,
}

impl MockConnector {
    pub(crate) fn new() -> (Arc<Self>, MockHub) {
        let (accepted, accepted_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted,
            refusing: AtomicBool::new(false),
            hanging: AtomicBool::new(false),
            stalled_sends: Arc::new(AtomicBool::new(false)),
            attempts: AtomicUsize::new(0),
        });
        let hub = MockHub {
            accepted: accepted_rx,
            connector: Arc::clone(&connector),
        };
        (connector, hub)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, request: &ConnectRequest) -> Result<Box<dyn Link>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(transport_error(
                TransportErrorKind::ConnectFailed,
                "connection refused",
            ));
        }
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let server = MockServer {
            request: request.clone(),
            to_client,
            from_client,
            closed: Arc::clone(&closed),
        };
        if self.accepted.send(server).is_err() {
            return Err(transport_error(
                TransportErrorKind::ConnectFailed,
                "hub is gone",
            ));
        }

        Ok(Box::new(MockLink {
            inbound,
            outbound,
            closed,
            stalled_sends: Arc::clone(&self.stalled_sends),
        }))
    }
}

impl MockHub {
    /// Wait for the client's next successful handshake.
    pub(crate) async fn accept(&mut self) -> MockServer {
        tokio::time::timeout(WAIT, self.accepted.recv())
            .await
            .expect("client never connected")
            .expect("connector dropped")
    }

    pub(crate) fn try_accept(&mut self) -> Option<MockServer> {
        self.accepted.try_recv().ok()
    }

    /// Make every following handshake fail.
    pub(crate) fn set_refusing(&self, refusing: bool) {
        self.connector.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Make every following handshake wait forever.
    pub(crate) fn set_hanging(&self, hanging: bool) {
        self.connector.hanging.store(hanging, Ordering::SeqCst);
    }

    /// Make client sends on every link wait forever, like a socket whose
    /// write buffer never drains.
    pub(crate) fn set_stalled_sends(&self, stalled: bool) {
        self.connector.stalled_sends.store(stalled, Ordering::SeqCst);
    }

    /// Handshakes attempted so far, refused ones included.
    pub(crate) fn attempts(&self) -> usize {
        self.connector.attempts.load(Ordering::SeqCst)
    }
}

/// Server end of one mock connection. Dropping it closes the connection.
pub(crate) struct MockServer {
    pub(crate) request: ConnectRequest,
    to_client: mpsc::UnboundedSender<LinkEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl MockServer {
    pub(crate) fn send(&self, frame: Value) {
        self.send_raw(&frame.to_string());
    }

    pub(crate) fn send_raw(&self, frame: &str) {
        let _ = self.to_client.send(LinkEvent::Message(frame.to_string()));
    }

    pub(crate) fn send_event(&self, event: &RealtimeEvent) {
        self.send(json!({ "type": "event", "event": event }));
    }

    /// Close with a close frame.
    pub(crate) fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(LinkEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    /// Next frame the client sent, parsed as JSON.
    pub(crate) async fn next_frame(&mut self) -> Value {
        let frame = tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("client sent nothing")
            .expect("client closed the link");
        serde_json::from_str(&frame).expect("client sent invalid JSON")
    }

    /// Frames the client has sent and the test has not read yet.
    pub(crate) fn drain_frames(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(serde_json::from_str(&frame).expect("client sent invalid JSON"));
        }
        frames
    }

    /// Whether the client closed its end.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockLink {
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
    outbound: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
    stalled_sends: Arc<AtomicBool>,
}

#[async_trait]
impl Link for MockLink {
    async fn send(&mut self, frame: String) -> Result<()> {
        if self.stalled_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.outbound.send(frame).map_err(|_| {
            transport_error(TransportErrorKind::SendFailed, "server went away")
        })
    }

    async fn next(&mut self) -> LinkEvent {
        self.inbound.recv().await.unwrap_or(LinkEvent::Closed {
            code: None,
            reason: "server went away".to_string(),
        })
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Cache that records invalidations in call order.
#[derive(Default)]
pub(crate) struct RecordingCache {
    keys: Vec<String>,
    invalidated: Mutex<Vec<String>>,
}

impl RecordingCache {
    /// Cache pre-populated with `keys`, for prefix expansion.
    pub(crate) fn with_keys(keys: &[&str]) -> Self {
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            invalidated: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn invalidated(&self) -> Vec<String> {
        self.invalidated.lock().unwrap().clone()
    }
}

impl Cache for RecordingCache {
    fn invalidate(&self, key: &str) {
        self.invalidated.lock().unwrap().push(key.to_string());
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.keys
            .iter()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// Wait until the client's status satisfies `predicate`, returning it.
pub(crate) async fn wait_for_status<F>(client: &RealtimeClient, predicate: F) -> Status
where
    F: Fn(&Status) -> bool,
{
    let mut status = client.watch_status();
    tokio::time::timeout(WAIT, async move {
        loop {
            {
                let current = status.borrow_and_update();
                if predicate(&*current) {
                    return current.clone();
                }
            }
            status.changed().await.expect("client dropped");
        }
    })
    .await
    .expect("status never matched")
}

/// Poll `condition`, letting background tasks run in between.
pub(crate) async fn eventually<F>(condition: F)
where
    F: Fn() -> bool,
{
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}
