//! Core types and error definitions for the Switchyard dispatch framework.
//!
//! This crate provides the foundational types shared across all Switchyard
//! crates, including error handling and the inter-agent message model.
//!
//! # Main types
//!
//! - [`SwitchyardError`] — Unified error enum for all Switchyard subsystems.
//! - [`SwitchyardResult`] — Convenience alias for `Result<T, SwitchyardError>`.
//! - [`Message`] — A unit of communication delivered through the hub.
//! - [`MessageKind`] — Category of a message (assignment, status update, ...).
//! - [`Recipient`] — Addressing mode: a single agent, or every agent with a role.

/// Error enum and result alias.
pub mod error;
/// Inter-agent message model.
pub mod message;

pub use error::{SwitchyardError, SwitchyardResult};
pub use message::{Message, MessageKind, Recipient};
