use crate::routes;
use axum::{
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use switchyard_dispatch::Coordinator;

/// Shared application state.
pub struct AppState {
    /// The coordinator every route operates on.
    pub coordinator: Arc<Coordinator>,
    /// Whether task submissions queue when the pool is full, unless the
    /// request says otherwise.
    pub queue_on_busy: bool,
}

/// The main gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway router around a coordinator.
    pub fn build(coordinator: Arc<Coordinator>, queue_on_busy: bool) -> Router {
        let state = Arc::new(AppState {
            coordinator,
            queue_on_busy,
        });

        Router::new()
            .route("/agents", post(routes::register_agent))
            .route("/agents/{id}", delete(routes::deregister_agent))
            .route("/agents/{id}/mailbox/drain", post(routes::drain_mailbox))
            .route("/tasks", post(routes::submit_task))
            .route(
                "/assignments/{id}/completion",
                post(routes::report_completion),
            )
            .route("/assignments/{id}", get(routes::lookup_assignment))
            .route("/messages", post(routes::send_message))
            .route("/messages/broadcast", post(routes::broadcast_message))
            .route("/status", get(routes::status))
            .route("/health", get(health_handler))
            .with_state(state)
    }
}

async fn health_handler() -> impl IntoResponse {
    serde_json::json!({"status": "ok", "service": "switchyard"}).to_string()
}
