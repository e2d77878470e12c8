//! Registry of joined connections and their owning identities.
//!
//! The registry keeps a bidirectional mapping: connection → identity for
//! resolving inbound events, and identity → connection set for counting the
//! tabs an identity still has open. It performs no I/O and holds no lock of
//! its own; callers serialize access through the world state lock.

use super::ConnectionId;
use crate::types::Identity;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Central registry for all joined connections.
///
/// A connection appears here only after a successful join. Bare transport
/// connections that never completed a join are unknown to the registry, and
/// unregistering them is a no-op.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Map of connection ID to the identity that joined on it
    owners: HashMap<ConnectionId, Identity>,

    /// Open connections per identity; an entry exists only while non-empty
    tabs: HashMap<Identity, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a connection to an identity.
    ///
    /// Creates the identity's connection set if absent. Re-registering a
    /// connection under a different identity moves it.
    ///
    /// # Returns
    ///
    /// The number of connections the identity holds after registration.
    pub fn register(&mut self, connection_id: ConnectionId, identity: Identity) -> usize {
        if let Some(previous) = self.owners.insert(connection_id, identity.clone()) {
            if previous != identity {
                self.detach_from(&previous, connection_id);
            }
        }

        let tabs = self.tabs.entry(identity.clone()).or_default();
        tabs.insert(connection_id);
        debug!(
            "🔗 Connection {} bound to {} ({} open)",
            connection_id,
            identity,
            tabs.len()
        );
        tabs.len()
    }

    /// Resolves the identity that joined on a connection.
    pub fn resolve(&self, connection_id: ConnectionId) -> Option<&Identity> {
        self.owners.get(&connection_id)
    }

    /// Removes a connection binding.
    ///
    /// # Returns
    ///
    /// The identity that owned the connection together with how many
    /// connections it still has open, or `None` if the connection was never
    /// registered.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<(Identity, usize)> {
        let identity = self.owners.remove(&connection_id)?;
        let remaining = self.detach_from(&identity, connection_id);
        debug!(
            "❌ Connection {} of {} unregistered ({} remaining)",
            connection_id, identity, remaining
        );
        Some((identity, remaining))
    }

    /// Number of connections an identity currently holds.
    pub fn connection_count(&self, identity: &Identity) -> usize {
        self.tabs.get(identity).map_or(0, HashSet::len)
    }

    /// Iterates the connections an identity currently holds.
    pub fn connections_of<'a>(
        &'a self,
        identity: &Identity,
    ) -> impl Iterator<Item = ConnectionId> + 'a {
        self.tabs.get(identity).into_iter().flatten().copied()
    }

    /// Number of identities with at least one connection.
    pub fn identity_count(&self) -> usize {
        self.tabs.len()
    }

    fn detach_from(&mut self, identity: &Identity, connection_id: ConnectionId) -> usize {
        let Some(tabs) = self.tabs.get_mut(identity) else {
            return 0;
        };
        tabs.remove(&connection_id);
        let remaining = tabs.len();
        if remaining == 0 {
            self.tabs.remove(identity);
        }
        remaining
    }
}
