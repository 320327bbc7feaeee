use crate::dispatcher::Dispatcher;
use crate::hooks::{DispatchEvent, HookChain};
use crate::queue::WorkQueue;
use crate::registry::AgentRegistry;
use crate::tracker::AssignmentTracker;
use crate::types::{
    Agent, AgentStatus, Assignment, AssignmentState, Availability, CompletionOutcome,
    StatusSnapshot, Task,
};
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::{SwitchyardError, SwitchyardResult};
use switchyard_hub::CommunicationHub;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// What happened to a submitted task.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The task was handed to an agent immediately.
    Dispatched(Assignment),
    /// No capacity; the task is waiting in the queue at this depth.
    Queued {
        /// Queue depth after the task was enqueued.
        depth: usize,
    },
}

/// Owns the registry, tracker, hub and queue, and runs the dispatch cycle
/// over them.
///
/// Construct one, wrap it in an [`Arc`], and start the background loops:
///
/// ```ignore
/// let coordinator = Arc::new(Coordinator::new());
/// coordinator.start_drain_loop(Duration::from_secs(1));
/// coordinator.start_stale_sweeper(Duration::from_secs(30), Duration::from_secs(300));
/// ```
pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    tracker: Arc<AssignmentTracker>,
    hub: Arc<CommunicationHub>,
    queue: Arc<WorkQueue>,
    dispatcher: Dispatcher,
    hooks: Arc<HookChain>,
    drain_lock: tokio::sync::Mutex<()>,
    drain_nudge: Notify,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::with_hooks(HookChain::new())
    }

    /// Builds a coordinator that reports dispatch events to `hooks`.
    pub fn with_hooks(hooks: HookChain) -> Self {
        let registry = Arc::new(AgentRegistry::new());
        let tracker = Arc::new(AssignmentTracker::new(registry.clone()));
        let hub = Arc::new(CommunicationHub::new());
        let hooks = Arc::new(hooks);
        let dispatcher = Dispatcher::new(
            registry.clone(),
            tracker.clone(),
            hub.clone(),
            hooks.clone(),
        );
        Self {
            registry,
            tracker,
            hub,
            queue: Arc::new(WorkQueue::new()),
            dispatcher,
            hooks,
            drain_lock: tokio::sync::Mutex::new(()),
            drain_nudge: Notify::new(),
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<AssignmentTracker> {
        &self.tracker
    }

    pub fn hub(&self) -> &Arc<CommunicationHub> {
        &self.hub
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Registers an agent and attaches its mailbox, its capability tags
    /// doubling as broadcast roles. Queued work that was waiting for this
    /// capacity gets picked up on the next drain.
    pub async fn register_agent(&self, agent: Agent) -> SwitchyardResult<()> {
        let agent_id = agent.id.clone();
        let roles = agent.capabilities.clone();
        self.registry.register(agent).await?;
        self.hub.attach(&agent_id, roles).await;
        self.hooks
            .emit(DispatchEvent::AgentRegistered {
                agent_id: agent_id.clone(),
            })
            .await;
        self.drain_nudge.notify_one();
        Ok(())
    }

    /// Removes an agent from rotation.
    ///
    /// The agent is made unavailable first so the dispatcher stops picking
    /// it, then its in-flight assignments are checked. With work still
    /// processing and `force` unset the removal is refused and the agent is
    /// restored. A forced removal fails the in-flight assignments and
    /// returns them; their tasks are gone unless callers resubmit.
    pub async fn deregister_agent(
        &self,
        agent_id: &str,
        force: bool,
    ) -> SwitchyardResult<Vec<Assignment>> {
        self.registry
            .set_availability(agent_id, Availability::Unavailable)
            .await?;

        let active = self.tracker.active_for_agent(agent_id).await;
        if !active.is_empty() && !force {
            self.registry
                .set_availability(agent_id, Availability::Available)
                .await?;
            return Err(SwitchyardError::AgentBusy(agent_id.to_string()));
        }

        let failed = if active.is_empty() {
            Vec::new()
        } else {
            self.tracker
                .fail_all_for_agent(agent_id, &format!("agent '{agent_id}' deregistered"))
                .await
        };
        for assignment in &failed {
            self.hooks
                .emit(DispatchEvent::AssignmentFailed {
                    assignment_id: assignment.id,
                    task_key: assignment.task_key.clone(),
                    agent_id: assignment.agent_id.clone(),
                    reason: assignment.failure_reason.clone().unwrap_or_default(),
                })
                .await;
        }

        self.hub.detach(agent_id).await;
        self.hooks
            .emit(DispatchEvent::AgentDeregistered {
                agent_id: agent_id.to_string(),
                forced: force,
            })
            .await;
        tracing::info!(
            agent_id = %agent_id,
            forced = force,
            failed = failed.len(),
            "Agent deregistered"
        );
        Ok(failed)
    }

    /// Submits a task for dispatch.
    ///
    /// A task key that is already queued or has an assignment still
    /// processing is rejected. When every capable agent is full the task is
    /// queued if `queue_on_busy` is set, otherwise the capacity error is
    /// returned to the caller.
    pub async fn submit(&self, task: Task, queue_on_busy: bool) -> SwitchyardResult<SubmitOutcome> {
        if self.queue.contains(&task.key).await {
            return Err(SwitchyardError::TaskAlreadyActive(task.key.clone()));
        }
        if let Some(existing) = self.tracker.lookup(&task.key).await {
            if existing.state == AssignmentState::Processing {
                return Err(SwitchyardError::TaskAlreadyActive(task.key.clone()));
            }
        }

        match self.dispatcher.dispatch(&task).await {
            Ok(assignment) => Ok(SubmitOutcome::Dispatched(assignment)),
            Err(SwitchyardError::NoAgentAvailable(_)) if queue_on_busy => {
                let task_key = task.key.clone();
                self.queue.push(task).await;
                let depth = self.queue.depth().await;
                tracing::info!(task_key = %task_key, depth, "No capacity, task queued");
                self.hooks
                    .emit(DispatchEvent::TaskQueued { task_key, depth })
                    .await;
                Ok(SubmitOutcome::Queued { depth })
            }
            Err(e) => Err(e),
        }
    }

    /// Records the outcome an agent reported for an assignment.
    ///
    /// Completion frees a slot on the agent, so the drain loop is nudged to
    /// check the queue right away.
    pub async fn report_completion(
        &self,
        assignment_id: Uuid,
        outcome: CompletionOutcome,
    ) -> SwitchyardResult<Assignment> {
        let assignment = self.tracker.record_completion(assignment_id, outcome).await?;
        match assignment.state {
            AssignmentState::Completed => {
                self.hooks
                    .emit(DispatchEvent::AssignmentCompleted {
                        assignment_id: assignment.id,
                        task_key: assignment.task_key.clone(),
                        agent_id: assignment.agent_id.clone(),
                    })
                    .await;
            }
            AssignmentState::Failed => {
                self.hooks
                    .emit(DispatchEvent::AssignmentFailed {
                        assignment_id: assignment.id,
                        task_key: assignment.task_key.clone(),
                        agent_id: assignment.agent_id.clone(),
                        reason: assignment.failure_reason.clone().unwrap_or_default(),
                    })
                    .await;
            }
            AssignmentState::Processing => {}
        }
        self.drain_nudge.notify_one();
        Ok(assignment)
    }

    /// Dispatches queued tasks until the queue is empty or capacity runs out.
    ///
    /// Runs as a single flight; a drain already in progress makes this call
    /// return immediately. A task that finds no capacity goes back to the
    /// head of the queue and ends the cycle, so queue order holds even when
    /// only part of the backlog fits. Returns how many tasks were
    /// dispatched.
    pub async fn drain_queue(&self) -> usize {
        let _guard = match self.drain_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => return 0,
        };

        let mut dispatched = 0;
        while let Some(task) = self.queue.pop().await {
            match self.dispatcher.dispatch(&task).await {
                Ok(_) => dispatched += 1,
                Err(SwitchyardError::NoAgentAvailable(_)) => {
                    self.queue.push_front(task).await;
                    break;
                }
                Err(e) => {
                    tracing::warn!(task_key = %task.key, error = %e, "Dropping undispatchable task");
                }
            }
        }
        if dispatched > 0 {
            tracing::debug!(dispatched, "Queue drained");
        }
        dispatched
    }

    /// Fails every assignment that has been processing longer than
    /// `stale_after` and returns the expired assignments, oldest first.
    ///
    /// The tracker sweep only reports; each stale assignment is failed here
    /// through the normal completion path, so the slot comes back exactly
    /// once even if an agent reports in parallel.
    pub async fn expire_stale(&self, stale_after: Duration) -> Vec<Assignment> {
        let mut expired = Vec::new();
        for assignment in self.tracker.sweep_stale(stale_after).await {
            let reason = SwitchyardError::StaleAssignment(assignment.id).to_string();
            let outcome = CompletionOutcome::Failed { reason };
            // an agent may report between the scan and this resolve; the
            // tracker refuses the conflicting transition and we move on
            let Ok(resolved) = self.tracker.record_completion(assignment.id, outcome).await
            else {
                continue;
            };
            tracing::warn!(
                assignment_id = %resolved.id,
                task_key = %resolved.task_key,
                agent_id = %resolved.agent_id,
                "Assignment expired"
            );
            self.hooks
                .emit(DispatchEvent::AssignmentExpired {
                    assignment_id: resolved.id,
                    task_key: resolved.task_key.clone(),
                    agent_id: resolved.agent_id.clone(),
                })
                .await;
            expired.push(resolved);
        }
        if !expired.is_empty() {
            self.drain_nudge.notify_one();
        }
        expired
    }

    /// Point-in-time view of agents, queue and assignment counts.
    pub async fn status(&self) -> StatusSnapshot {
        let mut agents = Vec::new();
        let mut active_agents = 0;
        for agent in self.registry.snapshot().await {
            let pending_messages = self.hub.pending_count(&agent.id).await.unwrap_or(0);
            let mut capabilities: Vec<String> = agent.capabilities.iter().cloned().collect();
            capabilities.sort();
            if agent.availability == Availability::Available {
                active_agents += 1;
            }
            agents.push(AgentStatus {
                id: agent.id,
                capabilities,
                capacity: agent.capacity,
                load: agent.load,
                availability: agent.availability,
                pending_messages,
            });
        }
        StatusSnapshot {
            total_agents: agents.len(),
            active_agents,
            agents,
            queue_depth: self.queue.depth().await,
            queued_keys: self.queue.queued_keys().await,
            assignments: self.tracker.counts().await,
        }
    }

    /// Spawns the queue drain loop.
    ///
    /// The loop wakes on its interval or earlier when a completion or a
    /// registration frees capacity. Missed ticks are skipped rather than
    /// bursted.
    pub fn start_drain_loop(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = coordinator.drain_nudge.notified() => {}
                }
                coordinator.drain_queue().await;
            }
        })
    }

    /// Spawns the stale assignment sweeper.
    pub fn start_stale_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        stale_after: Duration,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let expired = coordinator.expire_stale(stale_after).await;
                if !expired.is_empty() {
                    tracing::info!(count = expired.len(), "Stale assignments expired");
                }
            }
        })
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
