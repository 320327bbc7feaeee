use crate::hooks::{DispatchEvent, HookChain};
use crate::registry::AgentRegistry;
use crate::tracker::AssignmentTracker;
use crate::types::{Assignment, CompletionOutcome, Task};
use std::sync::Arc;
use switchyard_core::{Message, SwitchyardError, SwitchyardResult};
use switchyard_hub::CommunicationHub;

/// Sender name stamped on hand-off messages.
pub const DISPATCHER_NAME: &str = "dispatcher";

/// Binds tasks to agents: reserve a slot, open the assignment, deliver the
/// hand-off message.
pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
    tracker: Arc<AssignmentTracker>,
    hub: Arc<CommunicationHub>,
    hooks: Arc<HookChain>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<AgentRegistry>,
        tracker: Arc<AssignmentTracker>,
        hub: Arc<CommunicationHub>,
        hooks: Arc<HookChain>,
    ) -> Self {
        Self {
            registry,
            tracker,
            hub,
            hooks,
        }
    }

    /// Dispatches one task to the least-loaded capable agent.
    ///
    /// The reservation is the atomic step; everything after it either
    /// completes the hand-off or rolls the slot back. A duplicate task key
    /// releases the reservation directly; a mailbox that vanished between
    /// reservation and delivery fails the assignment through the normal
    /// completion path, which releases the slot too.
    pub async fn dispatch(&self, task: &Task) -> SwitchyardResult<Assignment> {
        let agent = self.registry.reserve(&task.capability).await?;

        let assignment = match self.tracker.begin(&task.key, &agent.id).await {
            Ok(opened) => opened,
            Err(e) => {
                self.registry.release(&agent.id).await;
                return Err(e);
            }
        };

        let handoff = Message::assignment(
            DISPATCHER_NAME,
            &agent.id,
            serde_json::json!({
                "assignment_id": assignment.id,
                "task_key": task.key,
                "capability": task.capability,
                "payload": task.payload,
            }),
        )
        .with_priority(task.priority)
        .with_thread(assignment.id);

        if let Err(e) = self.hub.send_to(&agent.id, handoff).await {
            // the agent deregistered between reservation and delivery
            tracing::warn!(
                agent_id = %agent.id,
                task_key = %task.key,
                error = %e,
                "Hand-off failed, voiding assignment"
            );
            let outcome = CompletionOutcome::Failed {
                reason: format!("hand-off failed: {e}"),
            };
            let _ = self.tracker.record_completion(assignment.id, outcome).await;
            self.hooks
                .emit(DispatchEvent::AssignmentFailed {
                    assignment_id: assignment.id,
                    task_key: task.key.clone(),
                    agent_id: agent.id.clone(),
                    reason: "hand-off failed".to_string(),
                })
                .await;
            return Err(SwitchyardError::NoAgentAvailable(task.capability.clone()));
        }

        tracing::info!(
            task_key = %task.key,
            agent_id = %agent.id,
            assignment_id = %assignment.id,
            load = agent.load,
            "Task dispatched"
        );
        self.hooks
            .emit(DispatchEvent::Assigned {
                assignment_id: assignment.id,
                task_key: task.key.clone(),
                agent_id: agent.id.clone(),
            })
            .await;
        Ok(assignment)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::Agent;
    use std::collections::HashSet;
    use switchyard_core::MessageKind;

    fn caps(tags: &[&str]) -> HashSet<String> {
        tags.iter().map(|t| (*t).to_string()).collect()
    }

    fn wired() -> (Arc<AgentRegistry>, Arc<AssignmentTracker>, Arc<CommunicationHub>, Dispatcher) {
        let registry = Arc::new(AgentRegistry::new());
        let tracker = Arc::new(AssignmentTracker::new(registry.clone()));
        let hub = Arc::new(CommunicationHub::new());
        let dispatcher = Dispatcher::new(
            registry.clone(),
            tracker.clone(),
            hub.clone(),
            Arc::new(HookChain::new()),
        );
        (registry, tracker, hub, dispatcher)
    }

    #[tokio::test]
    async fn test_dispatch_reserves_and_delivers() {
        let (registry, _tracker, hub, dispatcher) = wired();
        registry
            .register(Agent::new("qa-1", caps(&["qa"]), 2))
            .await
            .unwrap();
        hub.attach("qa-1", caps(&["qa"])).await;

        let task = Task::new("t-1", "qa").with_payload(serde_json::json!({"suite": "smoke"}));
        let assignment = dispatcher.dispatch(&task).await.unwrap();
        assert_eq!(assignment.agent_id, "qa-1");
        assert_eq!(registry.get("qa-1").await.unwrap().load, 1);

        let mail = hub.drain("qa-1").await.unwrap();
        assert_eq!(mail.len(), 1);
        assert_eq!(mail[0].kind, MessageKind::Assignment);
        assert_eq!(mail[0].from, DISPATCHER_NAME);
        assert_eq!(mail[0].thread_id, Some(assignment.id));
        assert_eq!(mail[0].payload["task_key"], "t-1");
        assert_eq!(mail[0].payload["payload"]["suite"], "smoke");
    }

    #[tokio::test]
    async fn test_duplicate_key_rolls_back_reservation() {
        let (registry, _tracker, hub, dispatcher) = wired();
        registry
            .register(Agent::new("qa-1", caps(&["qa"]), 4))
            .await
            .unwrap();
        hub.attach("qa-1", caps(&["qa"])).await;

        let task = Task::new("t-1", "qa");
        dispatcher.dispatch(&task).await.unwrap();
        let err = dispatcher.dispatch(&task).await.unwrap_err();
        assert!(matches!(err, SwitchyardError::TaskAlreadyActive(_)));

        // the failed attempt's reservation was rolled back
        assert_eq!(registry.get("qa-1").await.unwrap().load, 1);
        assert_eq!(hub.pending_count("qa-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_mailbox_voids_assignment() {
        let (registry, tracker, _hub, dispatcher) = wired();
        registry
            .register(Agent::new("qa-1", caps(&["qa"]), 1))
            .await
            .unwrap();
        // no hub.attach: simulates an agent torn down mid-dispatch

        let err = dispatcher.dispatch(&Task::new("t-1", "qa")).await.unwrap_err();
        assert!(matches!(err, SwitchyardError::NoAgentAvailable(_)));

        // the slot came back and the assignment is failed, not dangling
        assert_eq!(registry.get("qa-1").await.unwrap().load, 0);
        let voided = tracker.lookup("t-1").await.unwrap();
        assert!(voided.failure_reason.as_deref().unwrap().contains("hand-off"));
    }
}
