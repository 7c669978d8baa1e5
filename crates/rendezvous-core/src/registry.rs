//! Connection registry.
//!
//! The registry is the single source of truth for routing. There is no room
//! or stream index: every lookup is a linear scan, which matches the cost of
//! a fan-out anyway.

use crate::connection::{Connection, ConnectionId};
use std::collections::HashMap;
use tracing::debug;

/// The live set of connections.
#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, Connection>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a newly accepted connection.
    pub fn register(&mut self, connection: Connection) {
        let id = connection.id();
        self.connections.insert(id, connection);
        debug!(connection = %id, total = self.connections.len(), "Registered");
    }

    /// Remove a connection. Removing an unknown connection is a no-op.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Connection> {
        let removed = self.connections.remove(&id);
        if removed.is_some() {
            debug!(connection = %id, total = self.connections.len(), "Unregistered");
        }
        removed
    }

    /// Look up a connection.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Check whether a connection is registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Iterate over all live connections.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Find a connection other than `except` bound to `uuid`.
    #[must_use]
    pub fn find_identity_owner(&self, uuid: &str, except: ConnectionId) -> Option<ConnectionId> {
        self.iter()
            .find(|c| c.id() != except && c.identity() == Some(uuid))
            .map(Connection::id)
    }

    /// Find a connection other than `except` bound to `stream_id`.
    #[must_use]
    pub fn find_stream_owner(&self, stream_id: &str, except: ConnectionId) -> Option<ConnectionId> {
        self.iter()
            .find(|c| c.id() != except && c.stream_id() == Some(stream_id))
            .map(Connection::id)
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            connection_count: self.connections.len(),
            ..RegistryStats::default()
        };
        for conn in self.iter() {
            stats.identity_count += usize::from(conn.identity().is_some());
            stats.stream_count += usize::from(conn.stream_id().is_some());
            stats.room_scoped_count += usize::from(conn.room().is_some());
        }
        stats
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of live connections.
    pub connection_count: usize,
    /// Connections with a bound identity.
    pub identity_count: usize,
    /// Connections with a bound stream ID.
    pub stream_count: usize,
    /// Connections currently in a room.
    pub room_scoped_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn add(registry: &mut Registry) -> ConnectionId {
        let (tx, _rx) = mpsc::channel(1);
        let id = ConnectionId::generate();
        registry.register(Connection::new(id, tx));
        id
    }

    #[test]
    fn test_register_unregister() {
        let mut registry = Registry::new();
        let id = add(&mut registry);
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(id).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut registry = Registry::new();
        let id = add(&mut registry);
        assert!(registry.unregister(id).is_some());
        assert!(registry.unregister(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_owner_skips_self() {
        let mut registry = Registry::new();
        let a = add(&mut registry);
        let b = add(&mut registry);
        registry.get_mut(a).unwrap().bind_identity("u1");
        registry.get_mut(a).unwrap().bind_stream("s1");

        assert_eq!(registry.find_identity_owner("u1", a), None);
        assert_eq!(registry.find_identity_owner("u1", b), Some(a));
        assert_eq!(registry.find_stream_owner("s1", b), Some(a));
        assert_eq!(registry.find_stream_owner("s2", b), None);
    }

    #[test]
    fn test_registry_stats() {
        let mut registry = Registry::new();
        let a = add(&mut registry);
        let b = add(&mut registry);
        let _c = add(&mut registry);
        registry.get_mut(a).unwrap().bind_identity("u1");
        registry.get_mut(b).unwrap().bind_identity("u2");
        registry.get_mut(b).unwrap().bind_stream("s1");
        registry.get_mut(b).unwrap().set_room("r1");

        let stats = registry.stats();
        assert_eq!(stats.connection_count, 3);
        assert_eq!(stats.identity_count, 2);
        assert_eq!(stats.stream_count, 1);
        assert_eq!(stats.room_scoped_count, 1);
    }
}
