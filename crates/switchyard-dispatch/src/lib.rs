//! Capacity-aware dispatch: agent roster, least-loaded selection, assignment
//! tracking, and the queued-work drain loop.
//!
//! Callers submit a [`Task`]; the [`Dispatcher`] reserves a slot on the
//! least-loaded capable [`Agent`], the [`AssignmentTracker`] opens a
//! Processing [`Assignment`], and the hand-off message lands in the agent's
//! mailbox. Completion reports release the slot exactly once, a sweeper
//! expires assignments that sit Processing too long, and tasks that found no
//! capacity wait in the [`WorkQueue`] until a drain cycle retries them.
//!
//! # Main types
//!
//! - [`Coordinator`] — Facade wiring registry, tracker, hub, queue, and hooks.
//! - [`AgentRegistry`] — Roster with atomic least-loaded slot reservation.
//! - [`AssignmentTracker`] — Assignment lifecycle with idempotent completion.
//! - [`WorkQueue`] — Priority-ordered wait queue, drained head-first.
//! - [`DispatchHook`] — Observer seam for dispatch events.

/// Task-to-agent binding.
pub mod dispatcher;
/// Dispatch event observers and the in-memory audit trail.
pub mod hooks;
/// Wait queue for tasks that found no capacity.
pub mod queue;
/// Agent roster and slot reservation.
pub mod registry;
/// Coordinator facade and background loops.
pub mod service;
/// Assignment lifecycle tracking.
pub mod tracker;
/// Shared dispatch types (Agent, Task, Assignment, ...).
pub mod types;

pub use dispatcher::Dispatcher;
pub use hooks::{AuditRecord, AuditTrail, DispatchEvent, DispatchHook, HookChain};
pub use queue::WorkQueue;
pub use registry::AgentRegistry;
pub use service::{Coordinator, SubmitOutcome};
pub use tracker::AssignmentTracker;
pub use types::{
    Agent, AgentStatus, Assignment, AssignmentCounts, AssignmentState, Availability,
    CompletionOutcome, StatusSnapshot, Task,
};
