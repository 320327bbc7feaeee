use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use switchyard_core::{Message, MessageKind, Recipient, SwitchyardError};
use switchyard_dispatch::{
    Agent, Assignment, CompletionOutcome, StatusSnapshot, SubmitOutcome, Task,
};
use uuid::Uuid;

/// Error wrapper that maps dispatch errors onto HTTP status codes.
pub struct ApiError(pub SwitchyardError);

impl From<SwitchyardError> for ApiError {
    fn from(err: SwitchyardError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SwitchyardError::NoAgentAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SwitchyardError::DuplicateAgent(_)
            | SwitchyardError::AgentBusy(_)
            | SwitchyardError::TaskAlreadyActive(_)
            | SwitchyardError::InvalidStateTransition(_) => StatusCode::CONFLICT,
            SwitchyardError::NotFound(_) | SwitchyardError::UnknownRecipient(_) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::warn!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "Request rejected");
        }
        (status, Json(serde_json::json!({"error": self.0.to_string()}))).into_response()
    }
}

/// Body for `POST /agents`.
#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    /// Unique agent ID.
    pub id: String,
    /// Capability tags this agent serves; they double as broadcast roles.
    pub capabilities: Vec<String>,
    /// How many assignments the agent works at once.
    pub capacity: u32,
}

/// Query parameters for `DELETE /agents/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct DeregisterParams {
    /// Fail in-flight assignments instead of refusing the removal.
    #[serde(default)]
    pub force: bool,
}

/// Body for `POST /tasks`.
#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    /// Caller-chosen task key, unique among active tasks.
    pub key: String,
    /// Capability tag the task requires.
    pub capability: String,
    /// Queueing priority; lower values dispatch first.
    #[serde(default)]
    pub priority: i32,
    /// Opaque work description forwarded to the agent.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Overrides the server-wide queue-on-busy default for this task.
    pub queue_on_busy: Option<bool>,
}

/// Body for `POST /assignments/{id}/completion`.
#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    /// Reported outcome: `"completed"` or `{"failed": {"reason": "..."}}`.
    pub outcome: CompletionOutcome,
}

/// Body for `POST /messages`.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Sender name.
    pub from: String,
    /// Target: `{"agent": "..."}` or `{"role": "..."}`.
    pub to: Recipient,
    /// Message category, `status_update` unless given.
    #[serde(default = "default_kind")]
    pub kind: MessageKind,
    /// Urgency marker carried to the recipient.
    #[serde(default)]
    pub priority: i32,
    /// Free-form message body.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Conversation thread to continue, if any.
    #[serde(default)]
    pub thread_id: Option<Uuid>,
}

/// Body for `POST /messages/broadcast`.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    /// Sender name.
    pub from: String,
    /// Role whose active members receive a copy.
    pub role: String,
    /// Message category, `status_update` unless given.
    #[serde(default = "default_kind")]
    pub kind: MessageKind,
    /// Urgency marker carried to the recipients.
    #[serde(default)]
    pub priority: i32,
    /// Free-form message body.
    #[serde(default)]
    pub payload: serde_json::Value,
}

fn default_kind() -> MessageKind {
    MessageKind::StatusUpdate
}

/// `POST /agents`: add an agent to the roster and attach its mailbox.
pub async fn register_agent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterAgentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let capabilities: HashSet<String> = req.capabilities.into_iter().collect();
    let agent = Agent::new(req.id.clone(), capabilities, req.capacity);
    state.coordinator.register_agent(agent).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"registered": req.id})),
    ))
}

/// `DELETE /agents/{id}`: take an agent off duty.
pub async fn deregister_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<DeregisterParams>,
) -> Result<StatusCode, ApiError> {
    state.coordinator.deregister_agent(&id, params.force).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /tasks`: dispatch a task, or queue it when the pool is full.
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitTaskRequest>,
) -> Result<Response, ApiError> {
    let queue_on_busy = req.queue_on_busy.unwrap_or(state.queue_on_busy);
    let task = Task::new(req.key, req.capability)
        .with_priority(req.priority)
        .with_payload(req.payload);
    match state.coordinator.submit(task, queue_on_busy).await? {
        SubmitOutcome::Dispatched(assignment) => Ok(Json(assignment).into_response()),
        SubmitOutcome::Queued { depth } => Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"queued": true, "depth": depth})),
        )
            .into_response()),
    }
}

/// `POST /assignments/{id}/completion`: record the outcome an agent reports.
pub async fn report_completion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompletionRequest>,
) -> Result<Json<Assignment>, ApiError> {
    let assignment = state.coordinator.report_completion(id, req.outcome).await?;
    Ok(Json(assignment))
}

/// `GET /assignments/{id}`: latest assignment for a task key.
pub async fn lookup_assignment(
    State(state): State<Arc<AppState>>,
    Path(task_key): Path<String>,
) -> Result<Json<Assignment>, ApiError> {
    match state.coordinator.tracker().lookup(&task_key).await {
        Some(assignment) => Ok(Json(assignment)),
        None => Err(ApiError(SwitchyardError::NotFound(format!(
            "assignment for task '{task_key}'"
        )))),
    }
}

/// `POST /messages`: queue a message for an agent or fan it out to a role.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut message =
        Message::new(req.from, req.to, req.kind, req.payload).with_priority(req.priority);
    if let Some(thread_id) = req.thread_id {
        message = message.with_thread(thread_id);
    }
    let delivered = state.coordinator.hub().deliver(message).await?;
    Ok(Json(serde_json::json!({"delivered": delivered})))
}

/// `POST /messages/broadcast`: copy a message to every active member of a role.
pub async fn broadcast_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BroadcastRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let message = Message::new(
        req.from,
        Recipient::Role(req.role.clone()),
        req.kind,
        req.payload,
    )
    .with_priority(req.priority);
    let recipients = state
        .coordinator
        .hub()
        .broadcast_to_role(&req.role, message)
        .await?;
    Ok(Json(
        serde_json::json!({"role": req.role, "recipients": recipients}),
    ))
}

/// `POST /agents/{id}/mailbox/drain`: hand the agent its pending messages.
pub async fn drain_mailbox(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state.coordinator.hub().drain(&id).await?;
    Ok(Json(messages))
}

/// `GET /status`: agents, queue depth, and assignment counts.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusSnapshot> {
    Json(state.coordinator.status().await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_deserialization() {
        let json = r#"{"id": "qa-1", "capabilities": ["qa", "review"], "capacity": 3}"#;
        let req: RegisterAgentRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.id, "qa-1");
        assert_eq!(req.capabilities.len(), 2);
        assert_eq!(req.capacity, 3);
    }

    #[test]
    fn test_submit_request_defaults() {
        let json = r#"{"key": "t-1", "capability": "qa"}"#;
        let req: SubmitTaskRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.priority, 0);
        assert!(req.payload.is_null());
        assert!(req.queue_on_busy.is_none());
    }

    #[test]
    fn test_completion_request_forms() {
        let done: CompletionRequest = serde_json::from_str(r#"{"outcome": "completed"}"#).unwrap();
        assert_eq!(done.outcome, CompletionOutcome::Completed);

        let failed: CompletionRequest =
            serde_json::from_str(r#"{"outcome": {"failed": {"reason": "timeout"}}}"#).unwrap();
        assert_eq!(
            failed.outcome,
            CompletionOutcome::Failed {
                reason: "timeout".to_string()
            }
        );
    }

    #[test]
    fn test_send_message_request_role_target() {
        let json = r#"{"from": "ops", "to": {"role": "qa"}, "payload": {"note": "standup"}}"#;
        let req: SendMessageRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.to, Recipient::Role("qa".to_string()));
        assert_eq!(req.kind, MessageKind::StatusUpdate);
        assert_eq!(req.priority, 0);
        assert!(req.thread_id.is_none());
    }

    #[test]
    fn test_deregister_params_default() {
        let params: DeregisterParams = serde_json::from_str("{}").unwrap();
        assert!(!params.force);
    }
}
