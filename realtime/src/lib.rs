//! Real-time event client for the event hub.
//!
//! This crate keeps one long-lived WebSocket connection to the hub and turns
//! its frames into typed [`events::RealtimeEvent`]s for the rest of the
//! application.
//!
//! # Architecture
//!
//! - **Single multiplexed connection**: every channel subscription shares
//!   one transport. The application never opens connections directly.
//! - **Durable subscriptions**: the set of desired channels lives outside
//!   any connection and is replayed, once per channel, on every open.
//! - **Supervised reconnects**: a background task reconnects on close or
//!   failure with a bounded number of attempts, and gives up cleanly.
//! - **Ephemeral events**: events published while disconnected are missed.
//!   Caches are invalidated as events arrive so reads fall back to fresh
//!   data.
//! - **Isolated handlers**: a failing or panicking handler is logged and
//!   never affects other handlers or the connection.
//!
//! # Frame Flow
//!
//! 1. `connect()` validates credentials and spawns the supervisor
//! 2. The supervisor opens a link, with the identity in the query string
//! 3. Desired channels are replayed as `subscribe` frames
//! 4. Each inbound `event` frame is routed to the cache invalidation table,
//!    then to handlers for its exact type, then to wildcard handlers
//! 5. On close the supervisor waits per the reconnect policy and repeats
//!
//! # Example
//!
//! ```rust,ignore
//! use events::EventType;
//! use realtime::{ClientConfig, Credentials, RealtimeClient, StaticCredentials};
//! use std::sync::Arc;
//!
//! let config = ClientConfig::parse("wss://hub.example.com/ws")?;
//! let credentials = Arc::new(StaticCredentials::new(Some(Credentials::new(token, user_id))));
//! let client = RealtimeClient::new(config, credentials);
//!
//! client.subscribe("workspace:42");
//! let _disposer = client.on_fn(EventType::ResourceUpdated, |event| {
//!     println!("resource {:?} changed", event.entity_id);
//!     Ok(())
//! });
//! client.connect()?;
//! ```
//!
//! # Modules
//!
//! - `client`: the `RealtimeClient` facade and its configuration
//! - `connection`: the transport seam and its WebSocket implementation
//! - `credentials`: identity used for the handshake
//! - `invalidation`: event domain to cache key routing
//! - `policy`: reconnect attempt cap and delays
//! - `subscriptions`: the desired channel set

pub mod client;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod invalidation;
pub mod policy;
pub mod state;
pub mod subscriptions;

mod supervisor;

#[cfg(test)]
mod test_support;

pub use client::{ClientBuilder, ClientConfig, RealtimeClient};
pub use connection::{ConnectRequest, ConnectionId, Connector, Link, LinkEvent, WsConnector};
pub use credentials::{CredentialProvider, Credentials, StaticCredentials};
pub use error::{Error, ErrorKind, Result};
pub use invalidation::{Cache, CacheKey, InvalidationRouter, InvalidationRule};
pub use policy::{Backoff, ReconnectPolicy};
pub use state::{ConnectionState, Status};
pub use subscriptions::SubscriptionRegistry;
