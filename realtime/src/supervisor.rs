//! Reconnection Supervisor.
//!
//! One supervised task per `connect()` call drives the state machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected -> (delay) -> Connecting ...
//! ```
//!
//! Lifecycle:
//! 1. Resolve credentials; give up immediately if there are none
//! 2. Open a link and replay the desired subscriptions
//! 3. Read frames until the link closes, fails, or goes idle
//! 4. Schedule the next attempt per the reconnect policy, or give up once
//!    the attempt cap is reached
//!
//! Cancelling the token (user-initiated disconnect) ends the task at any
//! await point without scheduling another attempt.

use crate::connection::{ConnectRequest, Link, LinkEvent};
use crate::credentials;
use crate::error::{
    protocol_error, transport_error, Error, ProtocolErrorKind, TransportErrorKind,
};
use crate::state::{ConnectionState, Shared};
use events::{ClientMessage, ServerMessage};
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Stand-in deadline when no idle timeout is configured.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// How one connection ended.
enum SessionEnd {
    Cancelled,
    Closed { code: Option<u16>, reason: String },
    Failed(Error),
}

pub(crate) async fn run(shared: Arc<Shared>, generation: u64, cancel: CancellationToken) {
    let policy = shared.config.reconnect.clone();
    let mut attempt: u32 = 0;

    loop {
        let Some(credentials) = credentials::resolve(shared.credentials.as_ref()) else {
            warn!("No credentials available, not retrying");
            shared.give_up(generation, Some("no credentials available".to_string()));
            return;
        };

        if !shared.transition(generation, |status| {
            status.state = ConnectionState::Connecting;
            status.reconnect_attempt = attempt;
        }) {
            return;
        }

        let request = ConnectRequest::new(shared.config.endpoint.clone(), credentials);
        info!(
            "Connecting to {} (connection {}, attempt {})",
            request.endpoint, request.connection_id, attempt
        );

        let opened = tokio::select! {
            biased;

            _ = cancel.cancelled() => return,
            opened = shared.connector.open(&request) => opened,
        };

        match opened {
            Ok(mut link) => {
                let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
                let Some(replay) = shared.go_live(generation, outbound_tx) else {
                    link.close().await;
                    return;
                };
                attempt = 0;
                info!(
                    "Connected to {} (connection {}), replaying {} subscription(s)",
                    request.endpoint,
                    request.connection_id,
                    replay.len()
                );

                let end = run_session(
                    &shared,
                    generation,
                    link.as_mut(),
                    replay,
                    &mut outbound_rx,
                    &cancel,
                )
                .await;

                match end {
                    SessionEnd::Cancelled => {
                        info!("Closing connection {} on request", request.connection_id);
                        link.close().await;
                        return;
                    }
                    SessionEnd::Closed { code, reason } => {
                        info!(
                            "Connection {} closed by hub (code {:?}, reason {:?})",
                            request.connection_id, code, reason
                        );
                        shared.go_offline(generation, None);
                    }
                    SessionEnd::Failed(e) => {
                        warn!("Connection {} failed: {}", request.connection_id, e);
                        link.close().await;
                        shared.go_offline(generation, Some(e.to_string()));
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Connection attempt {} to {} failed: {}",
                    request.connection_id, request.endpoint, e
                );
                shared.go_offline(generation, Some(e.to_string()));
            }
        }

        if cancel.is_cancelled() {
            return;
        }

        if !policy.allows(attempt) {
            warn!(
                "Giving up after {} reconnect attempt(s); call connect() to resume",
                attempt
            );
            shared.give_up(generation, None);
            return;
        }

        attempt += 1;
        let delay = policy.delay(attempt);
        info!(
            "Reconnecting in {:?} (attempt {}/{})",
            delay, attempt, policy.max_attempts
        );
        if !shared.transition(generation, |status| status.reconnect_attempt = attempt) {
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Serve one open link: replay subscriptions, then multiplex inbound frames,
/// queued outbound frames, cancellation and the idle deadline. Inbound frames
/// are handled one at a time, in arrival order.
async fn run_session(
    shared: &Shared,
    generation: u64,
    link: &mut dyn Link,
    replay: Vec<String>,
    outbound: &mut mpsc::UnboundedReceiver<ClientMessage>,
    cancel: &CancellationToken,
) -> SessionEnd {
    for channel in replay {
        if let Err(end) = send_or_cancel(link, ClientMessage::subscribe(channel), cancel).await {
            return end;
        }
    }

    let idle_timeout = shared.config.idle_timeout;
    let idle_window = idle_timeout.unwrap_or(FAR_FUTURE);
    let mut idle_deadline = Instant::now() + idle_window;

    loop {
        let idle = tokio::time::sleep_until(idle_deadline);
        tokio::pin!(idle);

        tokio::select! {
            biased;

            _ = cancel.cancelled() => return SessionEnd::Cancelled,

            Some(message) = outbound.recv() => {
                if let Err(end) = send_or_cancel(link, message, cancel).await {
                    return end;
                }
            }

            event = link.next() => match event {
                LinkEvent::Message(raw) => {
                    idle_deadline = Instant::now() + idle_window;
                    handle_frame(shared, generation, &raw);
                }
                LinkEvent::Closed { code, reason } => {
                    return SessionEnd::Closed { code, reason };
                }
                LinkEvent::Failed(e) => return SessionEnd::Failed(e),
            },

            _ = &mut idle, if idle_timeout.is_some() => {
                return SessionEnd::Failed(transport_error(
                    TransportErrorKind::IdleTimeout,
                    &format!("no frame received for {:?}", idle_window),
                ));
            }
        }
    }
}

/// Send one frame, giving up as soon as the run is cancelled.
async fn send_or_cancel(
    link: &mut dyn Link,
    message: ClientMessage,
    cancel: &CancellationToken,
) -> Result<(), SessionEnd> {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(SessionEnd::Cancelled),
        sent = send(link, message) => sent.map_err(SessionEnd::Failed),
    }
}

async fn send(link: &mut dyn Link, message: ClientMessage) -> Result<(), Error> {
    let frame = message
        .to_frame()
        .map_err(|e| protocol_error(ProtocolErrorKind::Encode, &e.to_string()))?;
    trace!("Sending {}", frame);
    link.send(frame).await
}

/// Parse and route one inbound frame. Malformed and unknown frames are
/// dropped; the connection stays open.
fn handle_frame(shared: &Shared, generation: u64, raw: &str) {
    let message = match ServerMessage::parse(raw) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping malformed frame: {}", e);
            return;
        }
    };

    match message {
        ServerMessage::Event { event } => {
            trace!("Received {} ({})", event.event_type, event.id);
            shared.deliver(&event);
        }
        ServerMessage::Subscribed { channel } => {
            debug!("Hub confirmed subscription to {}", channel);
            shared.registry.acknowledge(channel);
        }
        ServerMessage::Unsubscribed { channel } => {
            debug!("Hub confirmed unsubscription from {}", channel);
            shared.registry.release(&channel);
        }
        ServerMessage::Error { error } => {
            warn!("Hub reported an error: {}", error);
            shared.transition(generation, |status| status.last_error = Some(error));
        }
        ServerMessage::Heartbeat => {
            trace!("Heartbeat");
        }
        ServerMessage::Connected { data } => {
            debug!("Hub accepted session: {}", data);
            shared.transition(generation, |status| status.session = Some(data));
        }
        ServerMessage::Unknown => {
            debug!("Dropping frame with unknown type");
        }
    }
}
