//! Event model and dispatch for the real-time event hub client.
//!
//! This crate holds everything about *what* travels over the hub connection
//! and *who* gets told about it, without knowing anything about sockets.
//!
//! # Architecture
//!
//! - **RealtimeEvent**: an immutable domain event pushed by the hub
//! - **EventType**: closed enumeration of `<domain>:<action>` event kinds
//! - **ServerMessage / ClientMessage**: the JSON frames exchanged with the hub
//! - **EventHandler**: trait for application callbacks
//! - **Dispatcher**: delivers each event to the handlers registered for its
//!   exact type, then to the wildcard handlers
//!
//! This crate has no dependencies on internal crates, so both the transport
//! runtime and application code can depend on it.

pub mod dispatcher;
pub mod event;
pub mod handler;
pub mod message;

pub use dispatcher::{panic_message, DispatchOutcome, Dispatcher, Disposer, HandlerId};
pub use event::{EventType, RealtimeEvent, UnknownEventType};
pub use handler::{EventHandler, HandlerError, HandlerKey, HandlerResult};
pub use message::{ClientMessage, ServerMessage};
