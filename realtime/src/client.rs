//! The application-facing client.
//!
//! A [`RealtimeClient`] is constructed explicitly, passed to whatever needs
//! it, and torn down with [`RealtimeClient::shutdown`]. It owns one
//! supervisor task at a time; all public methods are synchronous and never
//! wait on the network.

use crate::connection::{validate_endpoint, Connector, WsConnector};
use crate::credentials::{self, CredentialProvider};
use crate::error::{credential_error, CredentialErrorKind, Result};
use crate::invalidation::{Cache, InvalidationRouter};
use crate::policy::ReconnectPolicy;
use crate::state::{ConnectionState, Shared, Status};
use crate::supervisor;
use events::{Dispatcher, Disposer, EventHandler, HandlerKey, HandlerResult, RealtimeEvent};
use log::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Library-level configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `ws://` or `wss://` URL of the event hub.
    pub endpoint: Url,
    pub reconnect: ReconnectPolicy,
    /// Treat the connection as dead when no frame arrives for this long.
    pub idle_timeout: Option<Duration>,
    /// Handshake timeout for the default WebSocket connector.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            reconnect: ReconnectPolicy::default(),
            idle_timeout: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn parse(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        validate_endpoint(&endpoint)?;
        Ok(Self::new(endpoint))
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

pub struct ClientBuilder {
    config: ClientConfig,
    credentials: Arc<dyn CredentialProvider>,
    connector: Option<Arc<dyn Connector>>,
    cache: Option<Arc<dyn Cache>>,
}

impl ClientBuilder {
    /// Replace the WebSocket transport.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Cache to invalidate as events arrive.
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> RealtimeClient {
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector::new(self.config.connect_timeout)));
        let router = self.cache.map(InvalidationRouter::new);

        RealtimeClient {
            shared: Arc::new(Shared::new(
                self.config,
                connector,
                self.credentials,
                router,
            )),
            supervisor: Mutex::new(None),
        }
    }
}

struct SupervisorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Client for the event hub: one multiplexed connection, durable channel
/// subscriptions, typed event handlers, and cache invalidation.
pub struct RealtimeClient {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<SupervisorHandle>>,
}

impl RealtimeClient {
    pub fn builder(
        config: ClientConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ClientBuilder {
        ClientBuilder {
            config,
            credentials,
            connector: None,
            cache: None,
        }
    }

    pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::builder(config, credentials).build()
    }

    /// Start connecting in the background.
    ///
    /// Fails only when no usable credentials are available or the endpoint
    /// is not a WebSocket URL; transport failures go through the reconnect
    /// path instead. A no-op while a connection is open or being attempted.
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) -> Result<()> {
        let mut supervisor = self.supervisor.lock();

        if let Some(handle) = supervisor.as_ref() {
            let status = self.shared.status();
            if !handle.task.is_finished() && !status.retries_exhausted {
                debug!("connect() ignored, client is {}", status.state);
                return Ok(());
            }
        }

        validate_endpoint(&self.shared.config.endpoint)?;
        if credentials::resolve(self.shared.credentials.as_ref()).is_none() {
            return Err(credential_error(
                CredentialErrorKind::Missing,
                "no access token or user id available",
            ));
        }

        if let Some(previous) = supervisor.take() {
            previous.cancel.cancel();
        }

        let generation = self.shared.begin();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervisor::run(
            Arc::clone(&self.shared),
            generation,
            cancel.clone(),
        ));
        *supervisor = Some(SupervisorHandle { cancel, task });

        Ok(())
    }

    /// Close the connection and cancel any pending reconnect. No further
    /// attempts are made until [`RealtimeClient::connect`] is called again.
    pub fn disconnect(&self) {
        let handle = self.supervisor.lock().take();
        if let Some(handle) = handle {
            handle.cancel.cancel();
            info!("Disconnecting from {}", self.shared.config.endpoint);
        }
        self.shared.end();
    }

    /// Disconnect, then drop every subscription and handler.
    pub fn shutdown(&self) {
        self.disconnect();
        self.shared.registry.clear();
        self.shared.dispatcher.clear();
    }

    /// Add a channel to the desired set. Returns whether it was new.
    pub fn subscribe(&self, channel: impl Into<String>) -> bool {
        self.shared.registry.subscribe(channel)
    }

    /// Remove a channel from the desired set. Returns whether it was present.
    pub fn unsubscribe(&self, channel: &str) -> bool {
        self.shared.registry.unsubscribe(channel)
    }

    /// Channels the application wants, whether or not connected.
    pub fn channels(&self) -> Vec<String> {
        self.shared.registry.channels()
    }

    /// Channels the hub confirmed on the current connection.
    pub fn acknowledged_channels(&self) -> Vec<String> {
        self.shared.registry.acknowledged()
    }

    pub fn on(&self, key: impl Into<HandlerKey>, handler: Arc<dyn EventHandler>) -> Disposer {
        self.shared.dispatcher.on(key, handler)
    }

    pub fn on_fn<F>(&self, key: impl Into<HandlerKey>, handler: F) -> Disposer
    where
        F: Fn(&RealtimeEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.shared.dispatcher.on_fn(key, handler)
    }

    pub fn off(&self, key: impl Into<HandlerKey>, handler: &Arc<dyn EventHandler>) -> bool {
        self.shared.dispatcher.off(key, handler)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.shared.dispatcher
    }

    pub fn is_connected(&self) -> bool {
        self.shared.status().is_connected()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.status().last_error
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.status().state
    }

    pub fn status(&self) -> Status {
        self.shared.status()
    }

    /// Receiver notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.shared.watch_status()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(handle) = self.supervisor.get_mut().take() {
            handle.cancel.cancel();
        }
    }
}
