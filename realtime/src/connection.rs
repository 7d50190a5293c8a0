//! Transport Connection: one physical connection to the event hub.
//!
//! The supervisor only talks to the [`Connector`] and [`Link`] traits. The
//! production implementation is [`WsConnector`], a WebSocket client built on
//! `tokio-tungstenite`; tests plug in an in-memory transport.

use crate::credentials::Credentials;
use crate::error::{
    endpoint_error, protocol_error, transport_error, EndpointErrorKind, Error,
    ProtocolErrorKind, Result, TransportErrorKind,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::*;
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

/// Unique identifier for one connection attempt (client-generated, logs only).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything needed to open one connection.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub connection_id: ConnectionId,
    pub endpoint: Url,
    pub credentials: Credentials,
}

impl ConnectRequest {
    pub fn new(endpoint: Url, credentials: Credentials) -> Self {
        Self {
            connection_id: ConnectionId::new(),
            endpoint,
            credentials,
        }
    }

    /// Handshake URL: the endpoint with the identity appended as query
    /// parameters. Existing query parameters on the endpoint are kept.
    pub fn url(&self) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("token", &self.credentials.token);
            query.append_pair("user_id", &self.credentials.user_id);
            if let Some(organization_id) = &self.credentials.organization_id {
                query.append_pair("organization_id", organization_id);
            }
            if let Some(workspace_id) = &self.credentials.workspace_id {
                query.append_pair("workspace_id", workspace_id);
            }
        }
        url
    }
}

/// One lifecycle notification from an open link.
#[derive(Debug)]
pub enum LinkEvent {
    /// A raw text frame, not yet parsed.
    Message(String),
    /// The peer closed the connection, or the stream ended.
    Closed { code: Option<u16>, reason: String },
    /// The connection failed at the socket level.
    Failed(Error),
}

/// An open connection. Owned by a single task; never shared.
#[async_trait]
pub trait Link: Send {
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Wait for the next frame or lifecycle change. Once `Closed` or `Failed`
    /// has been returned the link is finished.
    async fn next(&mut self) -> LinkEvent;

    /// Close the connection, best effort.
    async fn close(&mut self);
}

/// Opens links to the event hub.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, request: &ConnectRequest) -> Result<Box<dyn Link>>;
}

/// Make sure an endpoint can be dialled before any attempt is made.
pub fn validate_endpoint(endpoint: &Url) -> Result<()> {
    match endpoint.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(endpoint_error(
            EndpointErrorKind::UnsupportedScheme,
            &format!("expected ws:// or wss://, got {other}://"),
        )),
    }
}

/// WebSocket connector. TLS (`wss://`) goes through native-tls.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, request: &ConnectRequest) -> Result<Box<dyn Link>> {
        // The full URL carries the token, so only the bare endpoint is logged.
        debug!(
            "Opening WebSocket to {} (connection {})",
            request.endpoint, request.connection_id
        );

        let url = request.url();
        let (stream, response) = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| {
            transport_error(
                TransportErrorKind::ConnectTimeout,
                &format!("no handshake within {:?}", self.connect_timeout),
            )
        })?
        .map_err(|e| match e {
            tokio_tungstenite::tungstenite::Error::Http(response) => transport_error(
                TransportErrorKind::Rejected,
                &format!("hub rejected handshake with HTTP {}", response.status()),
            ),
            other => Error::transport(TransportErrorKind::ConnectFailed, other),
        })?;

        debug!(
            "WebSocket handshake completed with HTTP {} (connection {})",
            response.status(),
            request.connection_id
        );

        Ok(Box::new(WsLink {
            stream,
            connection_id: request.connection_id.clone(),
        }))
    }
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    connection_id: ConnectionId,
}

#[async_trait]
impl Link for WsLink {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| Error::transport(TransportErrorKind::SendFailed, e))
    }

    async fn next(&mut self) -> LinkEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return LinkEvent::Message(text),
                Some(Ok(Message::Binary(bytes))) => match decode_binary(bytes) {
                    Ok(text) => return LinkEvent::Message(text),
                    Err(e) => {
                        warn!("Dropping frame on connection {}: {}", self.connection_id, e);
                    }
                },
                // Pings are answered by tungstenite itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    return LinkEvent::Closed { code, reason };
                }
                Some(Err(e)) => return LinkEvent::Failed(e.into()),
                None => {
                    return LinkEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(
                "Ignoring error while closing connection {}: {}",
                self.connection_id, e
            );
        }
    }
}

/// Binary frames carry the same JSON as text frames when they are UTF-8.
fn decode_binary(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| {
        protocol_error(
            ProtocolErrorKind::NonTextFrame,
            &format!("binary frame is not UTF-8: {e}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::http::StatusCode;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    fn request(endpoint: &str, credentials: Credentials) -> ConnectRequest {
        ConnectRequest::new(Url::parse(endpoint).unwrap(), credentials)
    }

    #[test]
    fn test_url_carries_identity_as_query_parameters() {
        let request = request(
            "wss://hub.example.com/ws",
            Credentials::new("tok en", "user-1")
                .with_organization_id("org-1")
                .with_workspace_id("ws-1"),
        );

        let url = request.url();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/ws");
        assert_eq!(
            pairs,
            vec![
                ("token".to_string(), "tok en".to_string()),
                ("user_id".to_string(), "user-1".to_string()),
                ("organization_id".to_string(), "org-1".to_string()),
                ("workspace_id".to_string(), "ws-1".to_string()),
            ]
        );
    }

    #[test]
    fn test_url_keeps_existing_query_and_skips_missing_tenant_ids() {
        let request = request(
            "ws://localhost:4000/ws?client=cli",
            Credentials::new("token", "user-1"),
        );

        let pairs: Vec<(String, String)> = request.url().query_pairs().into_owned().collect();

        assert_eq!(
            pairs,
            vec![
                ("client".to_string(), "cli".to_string()),
                ("token".to_string(), "token".to_string()),
                ("user_id".to_string(), "user-1".to_string()),
            ]
        );
    }

    #[test]
    fn test_each_request_gets_a_fresh_connection_id() {
        let a = request("ws://localhost/ws", Credentials::new("t", "u"));
        let b = request("ws://localhost/ws", Credentials::new("t", "u"));
        assert_ne!(a.connection_id, b.connection_id);
    }

    #[test]
    fn test_validate_endpoint_requires_websocket_scheme() {
        assert!(validate_endpoint(&Url::parse("ws://localhost/ws").unwrap()).is_ok());
        assert!(validate_endpoint(&Url::parse("wss://localhost/ws").unwrap()).is_ok());
        assert!(validate_endpoint(&Url::parse("https://localhost/ws").unwrap()).is_err());
    }

    #[test]
    fn test_decode_binary_rejects_invalid_utf8() {
        assert_eq!(decode_binary(b"{}".to_vec()).unwrap(), "{}");

        let err = decode_binary(vec![0xff, 0xfe]).unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::Protocol(ProtocolErrorKind::NonTextFrame)
        );
    }

    async fn listen() -> (TcpListener, Url) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let endpoint = Url::parse(&format!("ws://{addr}/ws")).unwrap();
        (listener, endpoint)
    }

    async fn expect_message(link: &mut Box<dyn Link>) -> String {
        match link.next().await {
            LinkEvent::Message(text) => text,
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ws_link_decodes_frames_and_reports_close() {
        let (listener, endpoint) = listen().await;
        let (uri_tx, uri_rx) = oneshot::channel();
        let (frame_tx, frame_rx) = oneshot::channel();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = move |request: &Request,
                                 response: Response|
                  -> std::result::Result<Response, ErrorResponse> {
                let _ = uri_tx.send(request.uri().to_string());
                Ok(response)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();

            ws.send(Message::Text(r#"{"type":"heartbeat"}"#.to_string()))
                .await
                .unwrap();
            ws.send(Message::Binary(
                br#"{"type":"subscribed","channel":"room:1"}"#.to_vec(),
            ))
            .await
            .unwrap();
            ws.send(Message::Binary(vec![0xff, 0xfe, 0xfd])).await.unwrap();

            let frame = loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => break text,
                    Some(Ok(_)) => continue,
                    other => panic!("client went away: {other:?}"),
                }
            };
            let _ = frame_tx.send(frame);

            ws.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "restarting".into(),
            })))
            .await
            .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let request = ConnectRequest::new(endpoint, Credentials::new("token-1", "user-1"));
        let mut link = WsConnector::default().open(&request).await.unwrap();

        assert_eq!(expect_message(&mut link).await, r#"{"type":"heartbeat"}"#);
        assert_eq!(
            expect_message(&mut link).await,
            r#"{"type":"subscribed","channel":"room:1"}"#
        );

        link.send(r#"{"type":"subscribe","channel":"room:1"}"#.to_string())
            .await
            .unwrap();
        assert_eq!(
            frame_rx.await.unwrap(),
            r#"{"type":"subscribe","channel":"room:1"}"#
        );

        // The invalid binary frame is skipped; the close frame comes next.
        match link.next().await {
            LinkEvent::Closed { code, reason } => {
                assert_eq!(code, Some(1001));
                assert_eq!(reason, "restarting");
            }
            other => panic!("expected close, got {other:?}"),
        }
        link.close().await;

        let uri = uri_rx.await.unwrap();
        assert!(uri.starts_with("/ws?"), "unexpected handshake uri {uri}");
        assert!(uri.contains("token=token-1"));
        assert!(uri.contains("user_id=user-1"));

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not finish")
            .unwrap();
    }

    #[tokio::test]
    async fn test_ws_connector_maps_http_rejection() {
        let (listener, endpoint) = listen().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = |_: &Request,
                            _: Response|
             -> std::result::Result<Response, ErrorResponse> {
                let mut response = ErrorResponse::new(Some("invalid token".to_string()));
                *response.status_mut() = StatusCode::UNAUTHORIZED;
                Err(response)
            };
            assert!(tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .is_err());
        });

        let request = ConnectRequest::new(endpoint, Credentials::new("bad", "user-1"));
        let err = WsConnector::default().open(&request).await.err().unwrap();

        assert_eq!(
            err.kind(),
            ErrorKind::Transport(TransportErrorKind::Rejected)
        );
        assert!(err.to_string().contains("401"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_ws_connector_times_out_silent_handshake() {
        // The listener never accepts, so the upgrade request goes unanswered.
        let (_listener, endpoint) = listen().await;
        let connector = WsConnector::new(Duration::from_millis(200));

        let request = ConnectRequest::new(endpoint, Credentials::new("token", "user-1"));
        let err = connector.open(&request).await.err().unwrap();

        assert_eq!(
            err.kind(),
            ErrorKind::Transport(TransportErrorKind::ConnectTimeout)
        );
    }
}
