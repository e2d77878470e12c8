//! Connection tracking for client tabs.
//!
//! This module maps transient transport connections to the identity that
//! opened them. One identity may hold any number of connections at once
//! (browser tabs), and the registry is the authority on how many remain.

pub mod registry;

pub use registry::ConnectionRegistry;

/// Type alias for connection identifiers.
///
/// Connection IDs are allocated by the engine when a transport connects and
/// are never reused within a process lifetime.
pub type ConnectionId = usize;
