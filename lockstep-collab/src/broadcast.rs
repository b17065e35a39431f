use std::sync::Arc;

use log::warn;

use crate::{ConnectionId, ConnectionRegistry, RoomId, ServerEvent};

/// Fans server-authored events out to the connections bound to a room
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: &Arc<ConnectionRegistry>) -> Self {
        Self {
            registry: registry.clone(),
        }
    }

    /// Serializes `event` once and writes it to every live connection bound
    /// to the room, except `exclude` if given. A connection that went away
    /// between the membership lookup and the write is skipped; delivery to
    /// the rest continues.
    pub fn broadcast(&self, room_id: RoomId, event: &ServerEvent, exclude: Option<ConnectionId>) {
        let frame = serialize(event);

        for (id, sender) in self.registry.members_of(room_id) {
            if Some(id) == exclude {
                continue;
            }

            if sender.send(frame.clone()).is_err() {
                warn!("Dropped frame for connection {id}: channel is closed");
            }
        }
    }

    /// Writes an event to a single connection
    pub fn send_to(&self, connection_id: ConnectionId, event: &ServerEvent) {
        let Some(sender) = self.registry.sender(connection_id) else {
            return;
        };

        if sender.send(serialize(event)).is_err() {
            warn!("Dropped frame for connection {connection_id}: channel is closed");
        }
    }
}

fn serialize(event: &ServerEvent) -> String {
    serde_json::to_string(event).expect("event serializes")
}

#[cfg(test)]
mod test {
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    #[test]
    fn test_broadcast_excludes_sender() {
        let registry = Arc::new(ConnectionRegistry::default());
        let broadcaster = Broadcaster::new(&registry);

        let (first_tx, mut first_rx) = unbounded_channel();
        let (second_tx, mut second_rx) = unbounded_channel();

        let first = registry.register(first_tx);
        let second = registry.register(second_tx);

        registry.bind(first, 1, 10);
        registry.bind(second, 1, 11);

        broadcaster.broadcast(1, &ServerEvent::UserLeft { user_id: 10 }, Some(first));

        assert!(
            first_rx.try_recv().is_err(),
            "the excluded connection should receive nothing"
        );
        assert!(second_rx.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_survives_closed_connections() {
        let registry = Arc::new(ConnectionRegistry::default());
        let broadcaster = Broadcaster::new(&registry);

        let (first_tx, first_rx) = unbounded_channel();
        let (second_tx, mut second_rx) = unbounded_channel();

        let first = registry.register(first_tx);
        let second = registry.register(second_tx);

        registry.bind(first, 1, 10);
        registry.bind(second, 1, 11);

        // The first connection's receiving half goes away mid-delivery
        drop(first_rx);

        broadcaster.broadcast(1, &ServerEvent::UserLeft { user_id: 12 }, None);

        assert!(
            second_rx.try_recv().is_ok(),
            "delivery should continue past a closed connection"
        );
    }
}
