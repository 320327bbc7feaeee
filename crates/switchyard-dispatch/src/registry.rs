use crate::types::{Agent, Availability};
use switchyard_core::{SwitchyardError, SwitchyardResult};
use tokio::sync::RwLock;

/// The roster of registered agents.
///
/// Backed by a `Vec` in registration order: selection ties go to the
/// earliest-registered agent, and that order must survive re-registration
/// and deregistration. Records are therefore never removed, only marked
/// [`Availability::Unavailable`]. All mutation happens under one write lock,
/// so a reservation's find-and-increment is a single atomic step.
pub struct AgentRegistry {
    agents: RwLock<Vec<Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(Vec::new()),
        }
    }

    /// Registers an agent, or updates an existing record in place.
    ///
    /// Re-registering keeps the roster position, the current load, and the
    /// original registration time, and marks the agent available again. The
    /// one thing that cannot change while work is in flight is capacity;
    /// that combination is rejected with [`SwitchyardError::DuplicateAgent`].
    pub async fn register(&self, agent: Agent) -> SwitchyardResult<()> {
        let mut agents = self.agents.write().await;
        if let Some(existing) = agents.iter_mut().find(|a| a.id == agent.id) {
            if existing.load > 0 && existing.capacity != agent.capacity {
                return Err(SwitchyardError::DuplicateAgent(agent.id));
            }
            existing.capabilities = agent.capabilities;
            existing.capacity = agent.capacity;
            existing.availability = Availability::Available;
            tracing::info!(agent_id = %existing.id, load = existing.load, "Agent re-registered");
            return Ok(());
        }
        tracing::info!(agent_id = %agent.id, capacity = agent.capacity, "Agent registered");
        agents.push(agent);
        Ok(())
    }

    /// Sets an agent's availability.
    pub async fn set_availability(
        &self,
        agent_id: &str,
        availability: Availability,
    ) -> SwitchyardResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .iter_mut()
            .find(|a| a.id == agent_id)
            .ok_or_else(|| SwitchyardError::NotFound(format!("agent '{agent_id}'")))?;
        agent.availability = availability;
        Ok(())
    }

    /// Marks an agent unavailable so it stops receiving new work.
    ///
    /// In-flight load is untouched; it drains through completions.
    pub async fn mark_unavailable(&self, agent_id: &str) -> SwitchyardResult<()> {
        self.set_availability(agent_id, Availability::Unavailable)
            .await
    }

    /// Atomically selects and reserves the least-loaded eligible agent.
    ///
    /// Eligible means available, advertising `capability`, and under
    /// capacity. Ties on load go to the earliest-registered agent. The
    /// winner's load is incremented before the lock is released, so two
    /// concurrent reservations can never both claim an agent's last slot.
    pub async fn reserve(&self, capability: &str) -> SwitchyardResult<Agent> {
        let mut agents = self.agents.write().await;

        let mut winner: Option<(usize, u32)> = None;
        for (idx, agent) in agents.iter().enumerate() {
            if !agent.can_accept(capability) {
                continue;
            }
            if winner.map_or(true, |(_, load)| agent.load < load) {
                winner = Some((idx, agent.load));
            }
        }
        let idx = match winner {
            Some((idx, _)) => idx,
            None => return Err(SwitchyardError::NoAgentAvailable(capability.to_string())),
        };

        agents[idx].load += 1;
        let reserved = agents[idx].clone();
        tracing::debug!(agent_id = %reserved.id, load = reserved.load, capability = %capability, "Slot reserved");
        Ok(reserved)
    }

    /// Returns a previously reserved slot.
    ///
    /// Load never goes below zero. A release for an unknown agent is logged
    /// and ignored; the assignment it backed is already gone.
    pub async fn release(&self, agent_id: &str) {
        let mut agents = self.agents.write().await;
        match agents.iter_mut().find(|a| a.id == agent_id) {
            Some(agent) => {
                debug_assert!(agent.load > 0, "release without matching reservation");
                agent.load = agent.load.saturating_sub(1);
                tracing::debug!(agent_id = %agent_id, load = agent.load, "Slot released");
            }
            None => {
                tracing::warn!(agent_id = %agent_id, "Release for unknown agent ignored");
            }
        }
    }

    /// Looks up one agent by ID.
    pub async fn get(&self, agent_id: &str) -> Option<Agent> {
        self.agents
            .read()
            .await
            .iter()
            .find(|a| a.id == agent_id)
            .cloned()
    }

    /// Available agents advertising `capability`, in registration order.
    ///
    /// Full agents are included; load is only checked at reservation.
    pub async fn list_eligible(&self, capability: &str) -> Vec<Agent> {
        self.agents
            .read()
            .await
            .iter()
            .filter(|a| {
                a.availability == Availability::Available && a.capabilities.contains(capability)
            })
            .cloned()
            .collect()
    }

    /// All registered agents in registration order.
    pub async fn snapshot(&self) -> Vec<Agent> {
        self.agents.read().await.clone()
    }

    /// Number of registered agents, unavailable ones included.
    pub async fn count(&self) -> usize {
        self.agents.read().await.len()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
