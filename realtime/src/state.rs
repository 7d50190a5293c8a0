//! Connection state shared between the public client and its supervisor task.

use crate::client::ClientConfig;
use crate::connection::Connector;
use crate::credentials::CredentialProvider;
use crate::invalidation::InvalidationRouter;
use crate::subscriptions::SubscriptionRegistry;
use events::{ClientMessage, Dispatcher, RealtimeEvent};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Snapshot of what the application can observe about the connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    pub state: ConnectionState,
    /// Latest transport failure or hub-reported error; cleared when a
    /// connection opens.
    pub last_error: Option<String>,
    /// Set when the supervisor gave up; only `connect()` clears it.
    pub retries_exhausted: bool,
    /// Reconnect attempts made since the last successful open.
    pub reconnect_attempt: u32,
    /// Payload of the hub's `connected` frame on the current connection.
    pub session: Option<Value>,
}

impl Status {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// State owned jointly by [`crate::RealtimeClient`] and its supervisor.
///
/// Every lifecycle transition carries the generation of the supervisor run
/// that requested it. `connect()` and `disconnect()` bump the generation, so
/// a run that has been superseded or cancelled can never change the status
/// again.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) router: Option<InvalidationRouter>,
    status: watch::Sender<Status>,
    generation: Mutex<u64>,
}

impl Shared {
    pub(crate) fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
        router: Option<InvalidationRouter>,
    ) -> Self {
        let (status, _) = watch::channel(Status::default());
        Self {
            config,
            connector,
            credentials,
            registry: SubscriptionRegistry::new(),
            dispatcher: Arc::new(Dispatcher::new()),
            router,
            status,
            generation: Mutex::new(0),
        }
    }

    pub(crate) fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    pub(crate) fn watch_status(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Start a new supervisor run: invalidate any previous run and reset the
    /// status to `Connecting`.
    pub(crate) fn begin(&self) -> u64 {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.registry.go_offline();
        self.status.send_modify(|status| {
            *status = Status {
                state: ConnectionState::Connecting,
                last_error: status.last_error.take(),
                ..Status::default()
            };
        });
        *generation
    }

    /// Invalidate the current run and go to `Disconnected` immediately.
    pub(crate) fn end(&self) {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.registry.go_offline();
        self.status.send_modify(|status| {
            status.state = ConnectionState::Disconnected;
            status.session = None;
            status.reconnect_attempt = 0;
        });
    }

    /// Apply `change` if run `generation` is still current.
    pub(crate) fn transition<F>(&self, generation: u64, change: F) -> bool
    where
        F: FnOnce(&mut Status),
    {
        let current = self.generation.lock();
        if *current != generation {
            return false;
        }
        self.status.send_modify(change);
        true
    }

    /// Enter `Connected` and attach the connection's outbound queue. Returns
    /// the channels to replay, or `None` if the run is no longer current.
    pub(crate) fn go_live(
        &self,
        generation: u64,
        outbound: mpsc::UnboundedSender<ClientMessage>,
    ) -> Option<Vec<String>> {
        let current = self.generation.lock();
        if *current != generation {
            return None;
        }
        let replay = self.registry.go_live(outbound);
        self.status.send_modify(|status| {
            status.state = ConnectionState::Connected;
            status.last_error = None;
            status.reconnect_attempt = 0;
            status.session = None;
        });
        Some(replay)
    }

    /// Leave `Connected`, recording `error` if the connection failed.
    pub(crate) fn go_offline(&self, generation: u64, error: Option<String>) -> bool {
        let current = self.generation.lock();
        if *current != generation {
            return false;
        }
        self.registry.go_offline();
        self.status.send_modify(|status| {
            status.state = ConnectionState::Disconnected;
            status.session = None;
            if error.is_some() {
                status.last_error = error;
            }
        });
        true
    }

    /// Terminal state of a run: disconnected and not retrying.
    pub(crate) fn give_up(&self, generation: u64, error: Option<String>) -> bool {
        self.transition(generation, |status| {
            status.state = ConnectionState::Disconnected;
            status.session = None;
            status.retries_exhausted = true;
            if error.is_some() {
                status.last_error = error;
            }
        })
    }

    /// Invalidate caches, then hand the event to application handlers.
    pub(crate) fn deliver(&self, event: &RealtimeEvent) {
        if let Some(router) = &self.router {
            router.route(event);
        }
        self.dispatcher.dispatch(event);
    }
}
