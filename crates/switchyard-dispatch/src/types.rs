use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Whether an agent may be selected for new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// Eligible for dispatch.
    Available,
    /// Registered but excluded from selection.
    Unavailable,
}

impl Default for Availability {
    fn default() -> Self {
        Self::Available
    }
}

/// A worker registered with the dispatch core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Caller-chosen unique identifier.
    pub id: String,
    /// Capability tags this agent serves; these double as its broadcast roles.
    pub capabilities: HashSet<String>,
    /// Maximum number of concurrent assignments.
    pub capacity: u32,
    /// Assignments currently in flight.
    #[serde(default)]
    pub load: u32,
    /// Whether the agent may be selected for new work.
    #[serde(default)]
    pub availability: Availability,
    /// When the agent first registered.
    pub registered_at: DateTime<Utc>,
}

impl Agent {
    /// Creates an available agent with no load.
    pub fn new(id: impl Into<String>, capabilities: HashSet<String>, capacity: u32) -> Self {
        Self {
            id: id.into(),
            capabilities,
            capacity,
            load: 0,
            availability: Availability::Available,
            registered_at: Utc::now(),
        }
    }

    /// Whether this agent can take one more assignment for `capability`.
    pub fn can_accept(&self, capability: &str) -> bool {
        self.availability == Availability::Available
            && self.load < self.capacity
            && self.capabilities.contains(capability)
    }

    /// Concurrent slots still open.
    pub fn free_slots(&self) -> u32 {
        self.capacity.saturating_sub(self.load)
    }
}

/// A unit of work to dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Caller-chosen key, unique among tasks that are queued or in flight.
    pub key: String,
    /// Capability an agent must hold to take this task.
    pub capability: String,
    /// Queueing priority; smaller values drain first.
    #[serde(default)]
    pub priority: i32,
    /// Opaque work description handed through to the agent.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// When the task was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl Task {
    /// Creates a task with priority 0 and an empty payload.
    pub fn new(key: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            capability: capability.into(),
            priority: 0,
            payload: serde_json::Value::Null,
            submitted_at: Utc::now(),
        }
    }

    /// Sets the queueing priority and returns the task.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the payload and returns the task.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Lifecycle state of an [`Assignment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    /// Handed to an agent and not yet resolved.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully; see the assignment's failure reason.
    Failed,
}

/// Terminal outcome reported for an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// The work succeeded.
    Completed,
    /// The work failed.
    Failed {
        /// Agent-supplied explanation.
        reason: String,
    },
}

impl CompletionOutcome {
    /// The assignment state this outcome resolves to.
    pub fn target_state(&self) -> AssignmentState {
        match self {
            Self::Completed => AssignmentState::Completed,
            Self::Failed { .. } => AssignmentState::Failed,
        }
    }
}

/// A task bound to an agent, tracked from hand-off to terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    /// Unique identifier, minted at hand-off.
    pub id: Uuid,
    /// Key of the task being worked.
    pub task_key: String,
    /// Agent the work went to.
    pub agent_id: String,
    /// Current lifecycle state.
    pub state: AssignmentState,
    /// When the work was handed to the agent.
    pub started_at: DateTime<Utc>,
    /// When the assignment reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Why the assignment failed, when it did.
    pub failure_reason: Option<String>,
}

impl Assignment {
    /// Opens a Processing assignment for the given task and agent.
    pub fn new(task_key: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_key: task_key.into(),
            agent_id: agent_id.into(),
            state: AssignmentState::Processing,
            started_at: Utc::now(),
            completed_at: None,
            failure_reason: None,
        }
    }

    /// Whether the assignment has reached Completed or Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            AssignmentState::Completed | AssignmentState::Failed
        )
    }
}

/// Totals of assignments by lifecycle state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AssignmentCounts {
    /// Assignments still in flight.
    pub processing: usize,
    /// Assignments that finished successfully.
    pub completed: usize,
    /// Assignments that failed or were expired.
    pub failed: usize,
}

/// Point-in-time view of one registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Agent identifier.
    pub id: String,
    /// Capability tags, sorted for stable output.
    pub capabilities: Vec<String>,
    /// Maximum concurrent assignments.
    pub capacity: u32,
    /// Assignments currently in flight.
    pub load: u32,
    /// Whether the agent may be selected.
    pub availability: Availability,
    /// Messages waiting in the agent's mailbox.
    pub pending_messages: usize,
}

/// Point-in-time view of the whole dispatch core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Every registered agent, in registration order.
    pub agents: Vec<AgentStatus>,
    /// Registered agents, available or not.
    pub total_agents: usize,
    /// Agents currently eligible for selection.
    pub active_agents: usize,
    /// Tasks waiting for capacity.
    pub queue_depth: usize,
    /// Keys of waiting tasks in drain order.
    pub queued_keys: Vec<String>,
    /// Assignment totals by state.
    pub assignments: AssignmentCounts,
}
