//! HTTP control plane over a [`switchyard_dispatch::Coordinator`]: agent
//! registration, task submission, completion reports, messaging, and status.

/// Request/response types and route handlers.
pub mod routes;
/// Router assembly and shared state.
pub mod server;

pub use server::{AppState, GatewayServer};
