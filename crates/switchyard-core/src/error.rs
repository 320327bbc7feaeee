use uuid::Uuid;

/// Top-level error type for the Switchyard framework.
///
/// Domain variants carry the identifier the caller needs to react (agent ID,
/// task key, assignment ID); infrastructure variants wrap their source.
#[derive(Debug, thiserror::Error)]
pub enum SwitchyardError {
    /// No registered agent can take on work requiring the given capability.
    ///
    /// Raised both when no agent advertises the capability at all and when
    /// every agent that does is unavailable or already at capacity.
    #[error("no agent available for capability '{0}'")]
    NoAgentAvailable(String),

    /// An agent re-registered with a conflicting capacity while it still
    /// holds in-flight work.
    #[error("agent '{0}' is already registered with a different capacity and has work in flight")]
    DuplicateAgent(String),

    /// A non-forced deregistration was attempted while the agent still has
    /// assignments in flight.
    #[error("agent '{0}' still has assignments in flight")]
    AgentBusy(String),

    /// A task key was submitted while a Processing assignment for the same
    /// key already exists.
    #[error("task '{0}' already has an active assignment")]
    TaskAlreadyActive(String),

    /// A completion report targeted an assignment whose recorded outcome
    /// conflicts with the reported one.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// A message was addressed to an agent with no attached mailbox.
    #[error("no mailbox registered for recipient '{0}'")]
    UnknownRecipient(String),

    /// A lookup by identifier found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// An assignment sat in Processing past the staleness window and was
    /// forcibly failed by the sweeper.
    #[error("assignment {0} exceeded the staleness window")]
    StaleAssignment(Uuid),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`SwitchyardError`].
pub type SwitchyardResult<T> = Result<T, SwitchyardError>;
