use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Addressing mode for a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipient {
    /// A single agent, addressed by its registered ID.
    Agent(String),
    /// Every active agent holding the given role tag.
    Role(String),
}

impl Recipient {
    /// The agent ID or role tag this recipient names.
    pub fn target(&self) -> &str {
        match self {
            Self::Agent(id) => id,
            Self::Role(role) => role,
        }
    }
}

/// Category of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Work handed to an agent by the dispatcher.
    Assignment,
    /// A progress report from an agent.
    StatusUpdate,
    /// A problem raised for supervisory attention.
    Escalation,
    /// A terminal outcome report for an assignment.
    Completion,
}

/// A single message delivered through the communication hub.
///
/// Messages are append-only payloads: the hub never inspects `payload`, it
/// only routes on `to` and preserves arrival order per mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
    /// ID of the sending agent, or a system name such as `"dispatcher"`.
    pub from: String,
    /// Where the message is going.
    pub to: Recipient,
    /// What kind of message this is.
    pub kind: MessageKind,
    /// Sender-assigned priority; smaller values are more urgent.
    #[serde(default)]
    pub priority: i32,
    /// Opaque JSON payload; never interpreted by the hub.
    pub payload: serde_json::Value,
    /// Conversation thread this message belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<Uuid>,
}

impl Message {
    /// Creates a new message with a fresh ID and the current timestamp.
    pub fn new(
        from: impl Into<String>,
        to: Recipient,
        kind: MessageKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            from: from.into(),
            to,
            kind,
            priority: 0,
            payload,
            thread_id: None,
        }
    }

    /// Creates an [`MessageKind::Assignment`] message addressed to one agent.
    pub fn assignment(
        from: impl Into<String>,
        agent_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(
            from,
            Recipient::Agent(agent_id.into()),
            MessageKind::Assignment,
            payload,
        )
    }

    /// Creates a [`MessageKind::StatusUpdate`] message.
    pub fn status_update(from: impl Into<String>, to: Recipient, payload: serde_json::Value) -> Self {
        Self::new(from, to, MessageKind::StatusUpdate, payload)
    }

    /// Creates an [`MessageKind::Escalation`] message addressed to a role.
    pub fn escalation(
        from: impl Into<String>,
        role: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(
            from,
            Recipient::Role(role.into()),
            MessageKind::Escalation,
            payload,
        )
    }

    /// Creates a [`MessageKind::Completion`] message.
    pub fn completion(from: impl Into<String>, to: Recipient, payload: serde_json::Value) -> Self {
        Self::new(from, to, MessageKind::Completion, payload)
    }

    /// Sets the priority and returns the message.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Attaches the message to a conversation thread and returns it.
    pub fn with_thread(mut self, thread_id: Uuid) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    /// Creates an independent copy with a fresh ID.
    ///
    /// All other fields, including the thread ID, are preserved. Role
    /// fan-out uses this so each mailbox holds its own message.
    pub fn duplicate(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }
}
