//! Error types for the `realtime` crate.
//!
//! Follows a root Error struct carrying an error kind enum plus an optional
//! source for chaining. Only [`crate::RealtimeClient::connect`] returns these
//! to callers; everything else is logged or surfaced through `last_error`.

use std::error::Error as StdError;
use std::fmt;
use tokio_tungstenite::tungstenite;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the realtime client.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Credential(CredentialErrorKind),
    Endpoint(EndpointErrorKind),
    Transport(TransportErrorKind),
    Protocol(ProtocolErrorKind),
}

/// No usable identity to put in the handshake. Never retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialErrorKind {
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointErrorKind {
    InvalidUrl,
    UnsupportedScheme,
}

/// Socket-level failures. These feed the reconnect path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    ConnectFailed,
    ConnectTimeout,
    Rejected,
    SendFailed,
    ReceiveFailed,
    Closed,
    IdleTimeout,
}

/// A frame could not be encoded or decoded. The connection stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    MalformedFrame,
    NonTextFrame,
    Encode,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.error_kind
    }

    /// Wrap an underlying error as a transport error of the given kind.
    pub fn transport<E>(kind: TransportErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Error {
            source: Some(source.into()),
            error_kind: ErrorKind::Transport(kind),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self.error_kind, ErrorKind::Transport(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Credential(kind) => write!(f, "Credential error: {:?}", kind)?,
            ErrorKind::Endpoint(kind) => write!(f, "Endpoint error: {:?}", kind)?,
            ErrorKind::Transport(kind) => write!(f, "Transport error: {:?}", kind)?,
            ErrorKind::Protocol(kind) => write!(f, "Protocol error: {:?}", kind)?,
        }
        match &self.source {
            Some(source) => write!(f, ": {}", source),
            None => Ok(()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        let kind = match &err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportErrorKind::Closed
            }
            tungstenite::Error::Http(_) => TransportErrorKind::Rejected,
            _ => TransportErrorKind::ReceiveFailed,
        };
        Error::transport(kind, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Protocol(ProtocolErrorKind::MalformedFrame),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Endpoint(EndpointErrorKind::InvalidUrl),
        }
    }
}

/// Helper function to create credential errors.
pub fn credential_error(kind: CredentialErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Credential(kind),
    }
}

/// Helper function to create endpoint errors.
pub fn endpoint_error(kind: EndpointErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Endpoint(kind),
    }
}

/// Helper function to create transport errors.
pub fn transport_error(kind: TransportErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Transport(kind),
    }
}

/// Helper function to create protocol errors.
pub fn protocol_error(kind: ProtocolErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Protocol(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = credential_error(CredentialErrorKind::Missing, "no access token");
        assert_eq!(err.to_string(), "Credential error: Missing: no access token");
    }

    #[test]
    fn test_closed_websocket_maps_to_transport_closed() {
        let err: Error = tungstenite::Error::ConnectionClosed.into();
        assert_eq!(
            err.kind(),
            ErrorKind::Transport(TransportErrorKind::Closed)
        );
        assert!(err.is_transport());
    }

    #[test]
    fn test_json_error_maps_to_malformed_frame() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(
            err.kind(),
            ErrorKind::Protocol(ProtocolErrorKind::MalformedFrame)
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_url_error_maps_to_invalid_endpoint() {
        let err: Error = url::Url::parse("not a url").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Endpoint(EndpointErrorKind::InvalidUrl));
    }
}
