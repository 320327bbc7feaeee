//! Per-agent mailboxes and message routing for Switchyard.
//!
//! Every attached agent owns one FIFO mailbox. Direct sends land in exactly
//! one mailbox; role broadcasts fan an independent copy out to every active
//! agent holding the role. Draining a mailbox is atomic, so concurrent
//! consumers never observe the same message twice.
//!
//! # Main types
//!
//! - [`CommunicationHub`] — Roster of attached agents plus routing.
//! - [`Mailbox`] — A per-agent FIFO buffer with atomic drain.

/// Roster management and message routing.
pub mod hub;
/// Per-agent FIFO message buffer.
pub mod mailbox;

pub use hub::CommunicationHub;
pub use mailbox::Mailbox;
