use crate::event::{EventType, RealtimeEvent, UnknownEventType};
use std::fmt;
use std::str::FromStr;

/// Error a handler may report back to the dispatcher. It is logged, never
/// propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = Result<(), HandlerError>;

/// Trait for application code that reacts to realtime events.
///
/// Handlers run synchronously on the connection's read loop, so they should
/// hand off anything slow (e.g. spawn a task or push onto a channel).
/// Closures of the shape `Fn(&RealtimeEvent) -> HandlerResult` implement this
/// trait directly.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &RealtimeEvent) -> HandlerResult;
}

impl<F> EventHandler for F
where
    F: Fn(&RealtimeEvent) -> HandlerResult + Send + Sync,
{
    fn handle(&self, event: &RealtimeEvent) -> HandlerResult {
        self(event)
    }
}

/// What a handler is registered under: one exact event type, or every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    Type(EventType),
    /// Registered as `*`; sees every event after the exact-type handlers.
    Wildcard,
}

impl From<EventType> for HandlerKey {
    fn from(event_type: EventType) -> Self {
        HandlerKey::Type(event_type)
    }
}

impl FromStr for HandlerKey {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            Ok(HandlerKey::Wildcard)
        } else {
            s.parse().map(HandlerKey::Type)
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HandlerKey::Type(event_type) => write!(f, "{event_type}"),
            HandlerKey::Wildcard => f.write_str("*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_key_parses_wildcard_and_types() {
        assert_eq!("*".parse::<HandlerKey>(), Ok(HandlerKey::Wildcard));
        assert_eq!(
            "member:added".parse::<HandlerKey>(),
            Ok(HandlerKey::Type(EventType::MemberAdded))
        );
        assert!("member".parse::<HandlerKey>().is_err());
    }

    #[test]
    fn test_handler_key_display_round_trips() {
        assert_eq!(HandlerKey::Wildcard.to_string(), "*");
        assert_eq!(
            HandlerKey::from(EventType::ResourceDeleted).to_string(),
            "resource:deleted"
        );
    }
}
