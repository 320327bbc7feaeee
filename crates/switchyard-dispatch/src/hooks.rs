use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Events emitted by the dispatch pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispatchEvent {
    /// An agent joined the roster, or re-registered.
    AgentRegistered {
        agent_id: String,
    },
    /// An agent was taken off duty.
    AgentDeregistered {
        agent_id: String,
        forced: bool,
    },
    /// A task found no capacity and went into the wait queue.
    TaskQueued {
        task_key: String,
        depth: usize,
    },
    /// A task was handed to an agent.
    Assigned {
        assignment_id: Uuid,
        task_key: String,
        agent_id: String,
    },
    /// An assignment resolved as completed.
    AssignmentCompleted {
        assignment_id: Uuid,
        task_key: String,
        agent_id: String,
    },
    /// An assignment resolved as failed.
    AssignmentFailed {
        assignment_id: Uuid,
        task_key: String,
        agent_id: String,
        reason: String,
    },
    /// The sweeper expired an assignment that sat Processing too long.
    AssignmentExpired {
        assignment_id: Uuid,
        task_key: String,
        agent_id: String,
    },
}

/// Trait for receiving dispatch events from the pipeline.
#[async_trait]
pub trait DispatchHook: Send + Sync {
    /// Called once per event, in emission order.
    async fn on_event(&self, event: &DispatchEvent);
}

/// Composite hook that dispatches events to multiple hooks.
pub struct HookChain {
    hooks: Vec<Arc<dyn DispatchHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Add a hook to the chain.
    pub fn add(&mut self, hook: Arc<dyn DispatchHook>) {
        self.hooks.push(hook);
    }

    /// Emit an event to all hooks in the chain.
    pub async fn emit(&self, event: DispatchEvent) {
        for hook in &self.hooks {
            hook.on_event(&event).await;
        }
    }

    /// Get the number of hooks in the chain.
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }
}

impl Default for HookChain {
    fn default() -> Self {
        Self::new()
    }
}

/// One observed event with the time it was recorded.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// When the trail saw the event.
    pub timestamp: DateTime<Utc>,
    /// The event itself.
    pub event: DispatchEvent,
}

/// Hook that keeps the most recent dispatch events in memory.
///
/// A bounded ring: once full, recording a new event drops the oldest.
/// Every event is also mirrored to the structured log.
pub struct AuditTrail {
    capacity: usize,
    records: RwLock<VecDeque<AuditRecord>>,
}

impl AuditTrail {
    /// Creates a trail holding at most `capacity` records.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            records: RwLock::new(VecDeque::new()),
        })
    }

    /// The most recent `limit` records, oldest of them first.
    pub async fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let records = self.records.read().await;
        let skip = records.len().saturating_sub(limit);
        records.iter().skip(skip).cloned().collect()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the trail is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DispatchHook for AuditTrail {
    async fn on_event(&self, event: &DispatchEvent) {
        tracing::info!(event = ?event, "dispatch audit");
        let mut records = self.records.write().await;
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(AuditRecord {
            timestamp: Utc::now(),
            event: event.clone(),
        });
    }
}
