use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Every event kind the hub can push, named `<domain>:<action>` on the wire.
///
/// The set is closed and versioned together with the hub. The domain half is
/// what cache invalidation routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "resource:created")]
    ResourceCreated,
    #[serde(rename = "resource:updated")]
    ResourceUpdated,
    #[serde(rename = "resource:status_changed")]
    ResourceStatusChanged,
    #[serde(rename = "resource:deleted")]
    ResourceDeleted,

    #[serde(rename = "workspace:created")]
    WorkspaceCreated,
    #[serde(rename = "workspace:updated")]
    WorkspaceUpdated,
    #[serde(rename = "workspace:deleted")]
    WorkspaceDeleted,

    #[serde(rename = "member:added")]
    MemberAdded,
    #[serde(rename = "member:updated")]
    MemberUpdated,
    #[serde(rename = "member:removed")]
    MemberRemoved,

    #[serde(rename = "system:heartbeat")]
    SystemHeartbeat,
    #[serde(rename = "system:error")]
    SystemError,
}

impl EventType {
    pub const ALL: [EventType; 12] = [
        EventType::ResourceCreated,
        EventType::ResourceUpdated,
        EventType::ResourceStatusChanged,
        EventType::ResourceDeleted,
        EventType::WorkspaceCreated,
        EventType::WorkspaceUpdated,
        EventType::WorkspaceDeleted,
        EventType::MemberAdded,
        EventType::MemberUpdated,
        EventType::MemberRemoved,
        EventType::SystemHeartbeat,
        EventType::SystemError,
    ];

    /// Wire name, e.g. `resource:status_changed`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ResourceCreated => "resource:created",
            EventType::ResourceUpdated => "resource:updated",
            EventType::ResourceStatusChanged => "resource:status_changed",
            EventType::ResourceDeleted => "resource:deleted",
            EventType::WorkspaceCreated => "workspace:created",
            EventType::WorkspaceUpdated => "workspace:updated",
            EventType::WorkspaceDeleted => "workspace:deleted",
            EventType::MemberAdded => "member:added",
            EventType::MemberUpdated => "member:updated",
            EventType::MemberRemoved => "member:removed",
            EventType::SystemHeartbeat => "system:heartbeat",
            EventType::SystemError => "system:error",
        }
    }

    /// The part of the wire name before the colon.
    pub fn domain(&self) -> &'static str {
        self.split().0
    }

    /// The part of the wire name after the colon.
    pub fn action(&self) -> &'static str {
        self.split().1
    }

    fn split(&self) -> (&'static str, &'static str) {
        // Every wire name has exactly one colon.
        self.as_str().split_once(':').unwrap_or((self.as_str(), ""))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType(pub String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for UnknownEventType {}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// A domain event pushed by the hub.
///
/// Created when an `event` frame is parsed and discarded once every handler
/// has seen it. Handlers only ever receive a shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// ISO-8601 timestamp as sent by the hub; kept verbatim.
    pub timestamp: String,
    /// Opaque payload, usually the serialized entity after the change.
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl RealtimeEvent {
    pub fn new(id: impl Into<String>, event_type: EventType, timestamp: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            event_type,
            timestamp: timestamp.into(),
            data: Value::Null,
            organization_id: None,
            workspace_id: None,
            entity_id: None,
            entity_type: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_organization_id(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn with_workspace_id(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn domain(&self) -> &'static str {
        self.event_type.domain()
    }
}
