use crate::mailbox::Mailbox;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use switchyard_core::{Message, Recipient, SwitchyardError, SwitchyardResult};
use tokio::sync::RwLock;

/// Roster entry for one attached agent.
#[derive(Debug)]
struct MailboxEntry {
    roles: HashSet<String>,
    active: bool,
    mailbox: Arc<Mailbox>,
}

/// Routes messages to per-agent mailboxes.
///
/// The roster lock is only held to resolve mailbox handles and is never held
/// across an await point or a mailbox operation. Inactive agents keep their
/// mailbox and still receive direct sends, but are skipped by role fan-out.
pub struct CommunicationHub {
    entries: RwLock<HashMap<String, MailboxEntry>>,
}

impl CommunicationHub {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Attaches an agent to the hub, creating its mailbox.
    ///
    /// Re-attaching an already known agent replaces its roles and marks it
    /// active again; any messages still queued from before are kept.
    pub async fn attach(&self, agent_id: impl Into<String>, roles: HashSet<String>) {
        let agent_id = agent_id.into();
        let mut entries = self.entries.write().await;
        match entries.get_mut(&agent_id) {
            Some(entry) => {
                entry.roles = roles;
                entry.active = true;
                tracing::info!(agent_id = %agent_id, "Mailbox reattached");
            }
            None => {
                entries.insert(
                    agent_id.clone(),
                    MailboxEntry {
                        roles,
                        active: true,
                        mailbox: Arc::new(Mailbox::new()),
                    },
                );
                tracing::info!(agent_id = %agent_id, "Mailbox attached");
            }
        }
    }

    /// Detaches an agent, dropping its mailbox and any undelivered messages.
    pub async fn detach(&self, agent_id: &str) {
        let removed = self.entries.write().await.remove(agent_id);
        if let Some(entry) = removed {
            let dropped = entry.mailbox.len();
            if dropped > 0 {
                tracing::warn!(agent_id = %agent_id, dropped, "Mailbox detached with undelivered messages");
            } else {
                tracing::info!(agent_id = %agent_id, "Mailbox detached");
            }
        }
    }

    /// Marks an agent as active or inactive for role fan-out.
    pub async fn set_active(&self, agent_id: &str, active: bool) -> SwitchyardResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(agent_id)
            .ok_or_else(|| SwitchyardError::UnknownRecipient(agent_id.to_string()))?;
        entry.active = active;
        Ok(())
    }

    /// Routes a message according to its recipient.
    ///
    /// Returns the number of mailboxes the message landed in: 1 for a direct
    /// send, the fan-out width for a role broadcast.
    pub async fn deliver(&self, message: Message) -> SwitchyardResult<usize> {
        match message.to.clone() {
            Recipient::Agent(agent_id) => {
                self.send_to(&agent_id, message).await?;
                Ok(1)
            }
            Recipient::Role(role) => self.broadcast_to_role(&role, message).await,
        }
    }

    /// Queues a message into one agent's mailbox.
    pub async fn send_to(&self, agent_id: &str, message: Message) -> SwitchyardResult<()> {
        let mailbox = {
            let entries = self.entries.read().await;
            let entry = entries
                .get(agent_id)
                .ok_or_else(|| SwitchyardError::UnknownRecipient(agent_id.to_string()))?;
            entry.mailbox.clone()
        };
        tracing::debug!(agent_id = %agent_id, message_id = %message.id, kind = ?message.kind, "Message queued");
        mailbox.push(message);
        Ok(())
    }

    /// Fans a message out to every active agent holding `role`.
    ///
    /// Each recipient gets an independent copy with its own ID; the thread
    /// ID and payload are shared. A role nobody currently holds is not an
    /// error, the returned count is simply 0.
    pub async fn broadcast_to_role(&self, role: &str, message: Message) -> SwitchyardResult<usize> {
        let targets: Vec<Arc<Mailbox>> = {
            let entries = self.entries.read().await;
            entries
                .values()
                .filter(|entry| entry.active && entry.roles.contains(role))
                .map(|entry| entry.mailbox.clone())
                .collect()
        };
        if targets.is_empty() {
            tracing::debug!(role = %role, message_id = %message.id, "Broadcast found no audience");
            return Ok(0);
        }
        for mailbox in &targets {
            mailbox.push(message.duplicate());
        }
        tracing::debug!(role = %role, recipients = targets.len(), message_id = %message.id, "Message fanned out");
        Ok(targets.len())
    }

    /// Removes and returns everything in an agent's mailbox, oldest first.
    pub async fn drain(&self, agent_id: &str) -> SwitchyardResult<Vec<Message>> {
        let mailbox = {
            let entries = self.entries.read().await;
            let entry = entries
                .get(agent_id)
                .ok_or_else(|| SwitchyardError::UnknownRecipient(agent_id.to_string()))?;
            entry.mailbox.clone()
        };
        let messages = mailbox.drain();
        if !messages.is_empty() {
            tracing::debug!(agent_id = %agent_id, count = messages.len(), "Mailbox drained");
        }
        Ok(messages)
    }

    /// Number of messages waiting for one agent.
    pub async fn pending_count(&self, agent_id: &str) -> SwitchyardResult<usize> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(agent_id)
            .ok_or_else(|| SwitchyardError::UnknownRecipient(agent_id.to_string()))?;
        Ok(entry.mailbox.len())
    }

    /// Number of currently attached agents.
    pub async fn attached_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Total messages waiting across all mailboxes.
    pub async fn total_pending(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().map(|entry| entry.mailbox.len()).sum()
    }
}

impl Default for CommunicationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn roles(tags: &[&str]) -> HashSet<String> {
        tags.iter().map(|t| (*t).to_string()).collect()
    }

    #[tokio::test]
    async fn test_attach_send_drain() {
        let hub = CommunicationHub::new();
        hub.attach("builder-1", roles(&["build"])).await;

        let msg = Message::assignment("dispatcher", "builder-1", json!({"task_key": "t-1"}));
        let delivered = hub.deliver(msg).await.unwrap();
        assert_eq!(delivered, 1);

        let drained = hub.drain("builder-1").await.unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].payload["task_key"], "t-1");

        // second drain finds nothing
        assert!(hub.drain("builder-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_to_unknown_agent() {
        let hub = CommunicationHub::new();
        let msg = Message::assignment("dispatcher", "ghost", json!({}));
        let err = hub.deliver(msg).await.unwrap_err();
        assert!(matches!(err, SwitchyardError::UnknownRecipient(_)));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_role_members_only() {
        let hub = CommunicationHub::new();
        hub.attach("qa-1", roles(&["qa"])).await;
        hub.attach("qa-2", roles(&["qa", "review"])).await;
        hub.attach("builder-1", roles(&["build"])).await;

        let thread = Uuid::new_v4();
        let msg = Message::status_update(
            "lead",
            Recipient::Role("qa".into()),
            json!({"note": "freeze at 17:00"}),
        )
        .with_thread(thread);
        let delivered = hub.deliver(msg).await.unwrap();
        assert_eq!(delivered, 2);

        let a = hub.drain("qa-1").await.unwrap();
        let b = hub.drain("qa-2").await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        // independent copies share the thread but not the ID
        assert_ne!(a[0].id, b[0].id);
        assert_eq!(a[0].thread_id, Some(thread));
        assert_eq!(b[0].thread_id, Some(thread));
        assert_eq!(a[0].to, Recipient::Role("qa".into()));

        assert!(hub.drain("builder-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_skips_inactive_agents() {
        let hub = CommunicationHub::new();
        hub.attach("qa-1", roles(&["qa"])).await;
        hub.attach("qa-2", roles(&["qa"])).await;
        hub.set_active("qa-2", false).await.unwrap();

        let msg = Message::status_update("lead", Recipient::Role("qa".into()), json!({}));
        assert_eq!(hub.deliver(msg).await.unwrap(), 1);
        assert_eq!(hub.pending_count("qa-1").await.unwrap(), 1);
        assert_eq!(hub.pending_count("qa-2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_with_no_audience_delivers_nothing() {
        let hub = CommunicationHub::new();
        hub.attach("builder-1", roles(&["build"])).await;

        let msg = Message::escalation("builder-1", "oncall", json!({"reason": "disk full"}));
        assert_eq!(hub.deliver(msg).await.unwrap(), 0);
        assert_eq!(hub.total_pending().await, 0);
    }

    #[tokio::test]
    async fn test_inactive_agent_still_gets_direct_sends() {
        let hub = CommunicationHub::new();
        hub.attach("qa-1", roles(&["qa"])).await;
        hub.set_active("qa-1", false).await.unwrap();

        hub.send_to("qa-1", Message::assignment("dispatcher", "qa-1", json!({})))
            .await
            .unwrap();
        assert_eq!(hub.pending_count("qa-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reattach_keeps_pending_mail() {
        let hub = CommunicationHub::new();
        hub.attach("qa-1", roles(&["qa"])).await;
        hub.send_to("qa-1", Message::assignment("dispatcher", "qa-1", json!({})))
            .await
            .unwrap();

        hub.attach("qa-1", roles(&["qa", "review"])).await;
        assert_eq!(hub.pending_count("qa-1").await.unwrap(), 1);

        // the new role set is in effect
        let msg = Message::status_update("lead", Recipient::Role("review".into()), json!({}));
        assert_eq!(hub.deliver(msg).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_detach_removes_mailbox() {
        let hub = CommunicationHub::new();
        hub.attach("qa-1", roles(&["qa"])).await;
        hub.send_to("qa-1", Message::assignment("dispatcher", "qa-1", json!({})))
            .await
            .unwrap();
        hub.detach("qa-1").await;

        assert_eq!(hub.attached_count().await, 0);
        let err = hub.drain("qa-1").await.unwrap_err();
        assert!(matches!(err, SwitchyardError::UnknownRecipient(_)));
    }

    #[tokio::test]
    async fn test_concurrent_drains_never_share_messages() {
        let hub = Arc::new(CommunicationHub::new());
        hub.attach("qa-1", roles(&["qa"])).await;
        for n in 0..100 {
            hub.send_to("qa-1", Message::assignment("dispatcher", "qa-1", json!({"seq": n})))
                .await
                .unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let hub = hub.clone();
                tokio::spawn(async move { hub.drain("qa-1").await.unwrap() })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for msg in handle.await.unwrap() {
                assert!(seen.insert(msg.id), "message drained twice");
                total += 1;
            }
        }
        assert_eq!(total, 100);
        assert_eq!(hub.total_pending().await, 0);
    }
}
