use crate::registry::AgentRegistry;
use crate::types::{Assignment, AssignmentCounts, AssignmentState, CompletionOutcome};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_core::{SwitchyardError, SwitchyardResult};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct TrackerInner {
    assignments: HashMap<Uuid, Assignment>,
    /// Task keys with a Processing assignment. This is the duplicate gate.
    active_by_key: HashMap<String, Uuid>,
    /// Most recent assignment per task key, any state.
    latest_by_key: HashMap<String, Uuid>,
}

/// Tracks every assignment from hand-off to terminal state.
///
/// Resolving an assignment releases the agent's registry slot exactly once,
/// no matter how many times the outcome is reported. Lock order is tracker
/// before registry; the registry never calls back into the tracker.
pub struct AssignmentTracker {
    registry: Arc<AgentRegistry>,
    inner: RwLock<TrackerInner>,
}

impl AssignmentTracker {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            inner: RwLock::new(TrackerInner::default()),
        }
    }

    /// Opens a Processing assignment binding a task key to an agent.
    ///
    /// The check-and-insert is one write-lock section, so of two concurrent
    /// calls for the same key exactly one succeeds; the other gets
    /// [`SwitchyardError::TaskAlreadyActive`] and records nothing.
    pub async fn begin(&self, task_key: &str, agent_id: &str) -> SwitchyardResult<Assignment> {
        let mut inner = self.inner.write().await;
        if inner.active_by_key.contains_key(task_key) {
            return Err(SwitchyardError::TaskAlreadyActive(task_key.to_string()));
        }
        let assignment = Assignment::new(task_key, agent_id);
        inner
            .active_by_key
            .insert(task_key.to_string(), assignment.id);
        inner
            .latest_by_key
            .insert(task_key.to_string(), assignment.id);
        inner.assignments.insert(assignment.id, assignment.clone());
        tracing::info!(
            assignment_id = %assignment.id,
            task_key = %task_key,
            agent_id = %agent_id,
            "Assignment opened"
        );
        Ok(assignment)
    }

    /// Resolves an assignment with the reported outcome.
    ///
    /// The first report moves Processing to the terminal state, stamps
    /// `completed_at`, and releases the agent's slot. Reporting the same
    /// outcome again is a no-op that returns the stored record (a repeated
    /// failure keeps the first recorded reason). Reporting a conflicting
    /// outcome is [`SwitchyardError::InvalidStateTransition`] and changes
    /// nothing.
    pub async fn record_completion(
        &self,
        assignment_id: Uuid,
        outcome: CompletionOutcome,
    ) -> SwitchyardResult<Assignment> {
        let (resolved, release) = {
            let mut inner = self.inner.write().await;
            let TrackerInner {
                assignments,
                active_by_key,
                ..
            } = &mut *inner;
            let assignment = match assignments.get_mut(&assignment_id) {
                Some(found) => found,
                None => {
                    return Err(SwitchyardError::NotFound(format!(
                        "assignment {assignment_id}"
                    )))
                }
            };

            if assignment.state == AssignmentState::Processing {
                assignment.state = outcome.target_state();
                assignment.completed_at = Some(Utc::now());
                if let CompletionOutcome::Failed { reason } = &outcome {
                    assignment.failure_reason = Some(reason.clone());
                }
                active_by_key.remove(&assignment.task_key);
                tracing::info!(
                    assignment_id = %assignment.id,
                    task_key = %assignment.task_key,
                    state = ?assignment.state,
                    "Assignment resolved"
                );
                (assignment.clone(), Some(assignment.agent_id.clone()))
            } else if assignment.state == outcome.target_state() {
                // repeated report; the slot already came back
                tracing::debug!(assignment_id = %assignment_id, "Duplicate completion report ignored");
                (assignment.clone(), None)
            } else {
                tracing::warn!(
                    assignment_id = %assignment_id,
                    current = ?assignment.state,
                    reported = ?outcome.target_state(),
                    "Conflicting completion report rejected"
                );
                return Err(SwitchyardError::InvalidStateTransition(format!(
                    "assignment {assignment_id} is {:?} and cannot become {:?}",
                    assignment.state,
                    outcome.target_state()
                )));
            }
        };

        if let Some(agent_id) = release {
            self.registry.release(&agent_id).await;
        }
        Ok(resolved)
    }

    /// The most recent assignment for a task key, in any state.
    pub async fn lookup(&self, task_key: &str) -> Option<Assignment> {
        let inner = self.inner.read().await;
        inner
            .latest_by_key
            .get(task_key)
            .and_then(|id| inner.assignments.get(id))
            .cloned()
    }

    /// An assignment by its ID.
    pub async fn get(&self, assignment_id: Uuid) -> Option<Assignment> {
        self.inner
            .read()
            .await
            .assignments
            .get(&assignment_id)
            .cloned()
    }

    /// Processing assignments currently held by one agent.
    pub async fn active_for_agent(&self, agent_id: &str) -> Vec<Assignment> {
        let inner = self.inner.read().await;
        inner
            .assignments
            .values()
            .filter(|a| a.agent_id == agent_id && a.state == AssignmentState::Processing)
            .cloned()
            .collect()
    }

    /// Processing assignments older than `older_than`, oldest first.
    ///
    /// A read-only scan: what to do with stale work is the supervisory
    /// loop's call, and it fails each one through the normal completion
    /// path so the state machine and slot release behave as usual.
    pub async fn sweep_stale(&self, older_than: std::time::Duration) -> Vec<Assignment> {
        let window = chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let inner = self.inner.read().await;
        let mut stale: Vec<Assignment> = inner
            .assignments
            .values()
            .filter(|a| a.state == AssignmentState::Processing && a.started_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|a| a.started_at);
        stale
    }

    /// Fails every Processing assignment held by one agent.
    ///
    /// Used by forced deregistration; slots come back through the normal
    /// completion path.
    pub async fn fail_all_for_agent(&self, agent_id: &str, reason: &str) -> Vec<Assignment> {
        let active = self.active_for_agent(agent_id).await;
        let mut failed = Vec::new();
        for assignment in active {
            let outcome = CompletionOutcome::Failed {
                reason: reason.to_string(),
            };
            if let Ok(resolved) = self.record_completion(assignment.id, outcome).await {
                failed.push(resolved);
            }
        }
        failed
    }

    /// One-pass totals by state.
    pub async fn counts(&self) -> AssignmentCounts {
        let inner = self.inner.read().await;
        let mut counts = AssignmentCounts::default();
        for assignment in inner.assignments.values() {
            match assignment.state {
                AssignmentState::Processing => counts.processing += 1,
                AssignmentState::Completed => counts.completed += 1,
                AssignmentState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Total number of assignments ever opened.
    pub async fn total_count(&self) -> usize {
        self.inner.read().await.assignments.len()
    }
}
