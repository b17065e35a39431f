use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;

use crate::{util::Id, PrimaryKey, RoomId};

pub type ConnectionId = Id<Connection>;

/// The outbound half of a gateway connection. Events are serialized before
/// they reach this channel, and the channel preserves their order.
pub type OutboundSender = UnboundedSender<String>;

/// A live gateway connection
pub struct Connection {
    pub id: ConnectionId,
    sender: OutboundSender,
}

/// The user and room a connection currently acts as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub user_id: PrimaryKey,
    pub room_id: RoomId,
}

/// Tracks live connections and their room bindings. A connection is bound to
/// at most one room at a time.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    bindings: DashMap<ConnectionId, Binding>,
    rooms: DashMap<RoomId, Vec<ConnectionId>>,
}

impl ConnectionRegistry {
    /// Registers a newly opened connection
    pub fn register(&self, sender: OutboundSender) -> ConnectionId {
        let connection = Connection {
            id: ConnectionId::new(),
            sender,
        };

        let id = connection.id;
        self.connections.insert(id, connection);

        id
    }

    /// Removes a closed connection entirely. Returns the binding it held, if
    /// any, so the caller can run room cleanup. Safe to call twice.
    pub fn unregister(&self, id: ConnectionId) -> Option<Binding> {
        self.connections.remove(&id);
        self.unbind(id)
    }

    /// Binds a connection to a room, replacing any previous binding.
    /// Returns the previous binding, if any.
    pub fn bind(&self, id: ConnectionId, room_id: RoomId, user_id: PrimaryKey) -> Option<Binding> {
        let previous = self.unbind(id);

        self.bindings.insert(id, Binding { user_id, room_id });
        self.rooms.entry(room_id).or_default().push(id);

        previous
    }

    /// Releases a connection's binding, if any
    pub fn unbind(&self, id: ConnectionId) -> Option<Binding> {
        let (_, binding) = self.bindings.remove(&id)?;

        if let Some(mut members) = self.rooms.get_mut(&binding.room_id) {
            members.retain(|m| *m != id);
        }

        Some(binding)
    }

    pub fn binding(&self, id: ConnectionId) -> Option<Binding> {
        self.bindings.get(&id).map(|b| *b)
    }

    /// Snapshot of the live connections currently bound to a room
    pub fn members_of(&self, room_id: RoomId) -> Vec<(ConnectionId, OutboundSender)> {
        let members = self
            .rooms
            .get(&room_id)
            .map(|m| m.clone())
            .unwrap_or_default();

        members
            .into_iter()
            .filter_map(|id| self.connections.get(&id).map(|c| (id, c.sender.clone())))
            .collect()
    }

    /// User ids bound to a room through a live connection
    pub fn bound_user_ids(&self, room_id: RoomId) -> Vec<PrimaryKey> {
        let members = self
            .rooms
            .get(&room_id)
            .map(|m| m.clone())
            .unwrap_or_default();

        members
            .into_iter()
            .filter_map(|id| self.bindings.get(&id).map(|b| b.user_id))
            .collect()
    }

    pub fn sender(&self, id: ConnectionId) -> Option<OutboundSender> {
        self.connections.get(&id).map(|c| c.sender.clone())
    }
}

#[cfg(test)]
mod test {
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    fn registered(registry: &ConnectionRegistry) -> ConnectionId {
        let (sender, _receiver) = unbounded_channel();
        registry.register(sender)
    }

    #[test]
    fn test_bind_and_membership() {
        let registry = ConnectionRegistry::default();

        let first = registered(&registry);
        let second = registered(&registry);

        registry.bind(first, 1, 10);
        registry.bind(second, 1, 11);

        let members: Vec<_> = registry.members_of(1).into_iter().map(|(id, _)| id).collect();
        assert_eq!(members, vec![first, second]);
        assert_eq!(registry.bound_user_ids(1), vec![10, 11]);
        assert!(registry.members_of(2).is_empty());
    }

    #[test]
    fn test_rebinding_moves_rooms() {
        let registry = ConnectionRegistry::default();
        let connection = registered(&registry);

        assert_eq!(registry.bind(connection, 1, 10), None);

        let previous = registry.bind(connection, 2, 10);
        assert_eq!(
            previous,
            Some(Binding {
                user_id: 10,
                room_id: 1
            }),
            "rebinding should surface the previous binding"
        );

        assert!(
            registry.members_of(1).is_empty(),
            "the old room should no longer list the connection"
        );
        assert_eq!(registry.members_of(2).len(), 1);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::default();
        let connection = registered(&registry);

        registry.bind(connection, 1, 10);

        assert!(registry.unregister(connection).is_some());
        assert!(registry.unregister(connection).is_none());
        assert!(registry.members_of(1).is_empty());
        assert!(registry.binding(connection).is_none());
    }
}
