mod broadcast;
mod db;
mod events;
mod protocol;
mod registry;
mod rooms;
mod serialized;
mod util;

pub use broadcast::*;
pub use db::*;
pub use events::*;
pub use protocol::*;
pub use registry::*;
pub use rooms::*;
pub use serialized::*;
pub use util::*;

use std::future::Future;
use std::result::Result;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::warn;
use thiserror::Error;
use tokio::time::timeout;

/// How long a persistence call may run before the operation is reported as
/// failed to the initiating connection
const DB_TIMEOUT: Duration = Duration::from_secs(5);

/// The lockstep coordinator, owning every room's live state. One instance
/// exists per process: created at startup, dropped at shutdown. Connections
/// never touch room state directly; everything goes through
/// [Coordinator::handle_message].
pub struct Coordinator<Db> {
    context: CoordinatorContext<Db>,

    pub rooms: RoomManager<Db>,
}

/// A type passed to the coordinator's components, to access shared state,
/// the persistence collaborator, and the broadcast dispatcher.
pub struct CoordinatorContext<Db> {
    pub db: Arc<Db>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Broadcaster,

    pub rooms: Arc<DashMap<RoomId, Arc<RoomSession<Db>>>>,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Malformed message: {0}")]
    Validation(String),
    #[error("{resource} not found")]
    NotFound { resource: &'static str },
    #[error("Room is not active")]
    RoomNotActive,
    #[error("Join a room before sending this message")]
    NotJoined,
    #[error("Persistence failed, try again later")]
    Persistence(#[source] DatabaseError),
    #[error("Persistence timed out, try again later")]
    PersistenceTimeout,
}

impl From<DatabaseError> for CoordinatorError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound { resource, .. } => Self::NotFound { resource },
            err => Self::Persistence(err),
        }
    }
}

impl<Db> Coordinator<Db>
where
    Db: Database,
{
    pub fn new(db: Db) -> Self {
        let registry = Arc::new(ConnectionRegistry::default());

        let context = CoordinatorContext {
            db: Arc::new(db),
            broadcaster: Broadcaster::new(&registry),
            registry,

            rooms: Default::default(),
        };

        let rooms = RoomManager::new(&context);

        Self { context, rooms }
    }

    /// Registers a newly opened gateway connection and returns its id
    pub fn register_connection(&self, sender: OutboundSender) -> ConnectionId {
        self.context.registry.register(sender)
    }

    /// Handles one raw inbound frame. Errors are reported to the sending
    /// connection only; they never tear the connection down and never leak
    /// into other rooms.
    pub async fn handle_message(&self, connection_id: ConnectionId, raw: &str) {
        if let Err(err) = self.dispatch(connection_id, raw).await {
            warn!("Rejected message from connection {connection_id}: {err}");

            self.context.broadcaster.send_to(
                connection_id,
                &ServerEvent::Error {
                    message: err.to_string(),
                },
            );
        }
    }

    /// Transport-level close. Runs the same cleanup as an explicit leave and
    /// is safe to call for connections that never joined a room.
    pub async fn handle_disconnect(&self, connection_id: ConnectionId) {
        self.leave_current_room(connection_id).await;
        self.context.registry.unregister(connection_id);
    }

    async fn dispatch(
        &self,
        connection_id: ConnectionId,
        raw: &str,
    ) -> Result<(), CoordinatorError> {
        // Join and leave manage room bindings themselves
        let command = match ClientCommand::decode(raw)? {
            ClientCommand::JoinRoom(payload) => {
                return self.join_room(connection_id, payload).await;
            }
            ClientCommand::LeaveRoom {} => {
                self.leave_current_room(connection_id).await;
                return Ok(());
            }
            command => command,
        };

        // Everything else requires a bound connection and routes to its room
        let binding = self
            .context
            .registry
            .binding(connection_id)
            .ok_or(CoordinatorError::NotJoined)?;

        let room = self.rooms.room_by_id(binding.room_id)?;

        match command {
            ClientCommand::ChatMessage(payload) => room.send_chat(binding, payload.content).await,
            ClientCommand::VideoSync(payload) => {
                room.sync_playback(connection_id, payload).await;
                Ok(())
            }
            ClientCommand::VideoShare(payload) => room.share_video(binding, payload).await,
            ClientCommand::VideoSelect(payload) => {
                room.select_video(payload).await;
                Ok(())
            }
            ClientCommand::VideoDelete(payload) => room.delete_video(payload).await,
            ClientCommand::UserProgress(payload) => {
                room.report_progress(connection_id, binding, payload).await;
                Ok(())
            }
            ClientCommand::ControlRequest {} => room.request_control(binding).await,
            ClientCommand::ControlGrant(payload) => {
                room.grant_control(payload.user_id).await;
                Ok(())
            }
            ClientCommand::ControlDeny(payload) => {
                room.deny_control(payload.user_id).await;
                Ok(())
            }
            ClientCommand::UpdateHostOnlyControl(payload) => {
                room.set_host_only_control(payload.host_only_control).await
            }
            ClientCommand::JoinRoom(_) | ClientCommand::LeaveRoom {} => {
                unreachable!("handled before binding lookup")
            }
        }
    }

    async fn join_room(
        &self,
        connection_id: ConnectionId,
        payload: JoinRoom,
    ) -> Result<(), CoordinatorError> {
        // An unknown room is rejected before any state changes
        let session = self.rooms.room_by_id(payload.room_id)?;

        // Binding to a new room implies leaving the previous one
        if let Some(binding) = self.context.registry.binding(connection_id) {
            if binding.room_id != payload.room_id {
                self.leave_current_room(connection_id).await;
            }
        }

        session.join(connection_id, &payload.username).await
    }

    async fn leave_current_room(&self, connection_id: ConnectionId) {
        let Some(binding) = self.context.registry.binding(connection_id) else {
            return;
        };

        match self.rooms.room_by_id(binding.room_id) {
            Ok(room) => room.leave(connection_id).await,
            Err(_) => {
                self.context.registry.unbind(connection_id);
            }
        }
    }
}

impl<Db> CoordinatorContext<Db>
where
    Db: Database,
{
    /// Runs a persistence call under the bounded timeout
    pub(crate) async fn db_call<T>(
        &self,
        operation: impl Future<Output = db::Result<T>>,
    ) -> Result<T, CoordinatorError> {
        match timeout(DB_TIMEOUT, operation).await {
            Ok(result) => result.map_err(CoordinatorError::from),
            Err(_) => Err(CoordinatorError::PersistenceTimeout),
        }
    }
}

impl<Db> Clone for CoordinatorContext<Db>
where
    Db: Database,
{
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            registry: self.registry.clone(),
            broadcaster: self.broadcaster.clone(),
            rooms: self.rooms.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::Value;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    use super::*;

    struct TestClient {
        id: ConnectionId,
        receiver: UnboundedReceiver<String>,
    }

    impl TestClient {
        fn connect(coordinator: &Coordinator<MemoryDatabase>) -> Self {
            let (sender, receiver) = unbounded_channel();

            Self {
                id: coordinator.register_connection(sender),
                receiver,
            }
        }

        /// Drains everything received so far
        fn events(&mut self) -> Vec<Value> {
            let mut events = Vec::new();

            while let Ok(frame) = self.receiver.try_recv() {
                events.push(serde_json::from_str(&frame).expect("frames are valid json"));
            }

            events
        }

        fn event_types(&mut self) -> Vec<String> {
            self.events()
                .iter()
                .map(|e| e["type"].as_str().unwrap().to_string())
                .collect()
        }
    }

    async fn setup() -> (Coordinator<MemoryDatabase>, RoomId) {
        let coordinator = Coordinator::new(MemoryDatabase::default());

        let room = coordinator
            .rooms
            .create_room(NewRoom {
                name: "movie night".to_string(),
                secret: None,
            })
            .await
            .expect("room is created");

        (coordinator, room.id())
    }

    async fn join(
        coordinator: &Coordinator<MemoryDatabase>,
        client: &TestClient,
        room_id: RoomId,
        username: &str,
    ) {
        let frame = format!(
            r#"{{"type":"join_room","data":{{"roomId":{room_id},"username":"{username}"}}}}"#
        );

        coordinator.handle_message(client.id, &frame).await;
    }

    const HASH: &str = "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c";

    async fn share(coordinator: &Coordinator<MemoryDatabase>, client: &TestClient, name: &str) {
        let frame = format!(
            r#"{{"type":"video_share","data":{{"name":"{name}","magnetUri":"magnet:?xt=urn:btih:{HASH}","infoHash":"{HASH}","size":276134947}}}}"#
        );

        coordinator.handle_message(client.id, &frame).await;
    }

    #[tokio::test]
    async fn test_join_sends_snapshot() {
        let (coordinator, room_id) = setup().await;
        let mut client = TestClient::connect(&coordinator);

        join(&coordinator, &client, room_id, "ada").await;

        let events = client.events();
        assert_eq!(events[0]["type"], "room_state");
        assert_eq!(events[0]["data"]["room"]["id"], room_id);
        assert_eq!(events[0]["data"]["users"][0]["username"], "ada");
        assert_eq!(
            events[0]["data"]["users"][0]["isHost"], true,
            "the first joiner becomes host"
        );
    }

    #[tokio::test]
    async fn test_join_unknown_room_is_rejected() {
        let (coordinator, _) = setup().await;
        let mut client = TestClient::connect(&coordinator);

        join(&coordinator, &client, 999, "ada").await;

        assert_eq!(client.event_types(), vec!["error"]);
        assert!(
            coordinator.context.db.users_by_room(999).await.unwrap().is_empty(),
            "a rejected join must not create state"
        );
    }

    #[tokio::test]
    async fn test_commands_require_a_room() {
        let (coordinator, _) = setup().await;
        let mut client = TestClient::connect(&coordinator);

        coordinator
            .handle_message(client.id, r#"{"type":"chat_message","data":{"content":"hi"}}"#)
            .await;

        let events = client.events();
        assert_eq!(events[0]["type"], "error");
        assert!(events[0]["data"]["message"]
            .as_str()
            .unwrap()
            .contains("Join a room"));
    }

    #[tokio::test]
    async fn test_replay_completeness() {
        let (coordinator, room_id) = setup().await;

        let mut first = TestClient::connect(&coordinator);
        join(&coordinator, &first, room_id, "ada").await;

        share(&coordinator, &first, "big buck bunny").await;

        let video_id = first
            .events()
            .iter()
            .find(|e| e["type"] == "new_video")
            .expect("the share is broadcast")["data"]["video"]["id"]
            .as_i64()
            .unwrap();

        let select = format!(
            r#"{{"type":"video_select","data":{{"videoId":{video_id},"magnetUri":"magnet:?xt=urn:btih:{HASH}"}}}}"#
        );
        coordinator.handle_message(first.id, &select).await;

        coordinator
            .handle_message(
                first.id,
                r#"{"type":"video_sync","data":{"action":"pause","currentTime":30.5}}"#,
            )
            .await;

        let mut late = TestClient::connect(&coordinator);
        join(&coordinator, &late, room_id, "grace").await;

        let events = late.events();
        let types: Vec<_> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();

        assert_eq!(
            types,
            vec!["room_state", "video_selected", "video_sync"],
            "a late joiner converges from the snapshot sequence alone"
        );
        assert_eq!(events[1]["data"]["videoId"], video_id);
        assert_eq!(events[2]["data"]["action"], "pause");
        assert_eq!(events[2]["data"]["currentTime"], 30.5);
    }

    #[tokio::test]
    async fn test_share_dedup() {
        let (coordinator, room_id) = setup().await;

        let mut first = TestClient::connect(&coordinator);
        let mut second = TestClient::connect(&coordinator);

        join(&coordinator, &first, room_id, "ada").await;
        join(&coordinator, &second, room_id, "grace").await;
        first.events();
        second.events();

        // Both viewers announce the same content
        share(&coordinator, &first, "big buck bunny").await;
        share(&coordinator, &second, "big buck bunny (copy)").await;

        let first_broadcasts = first.event_types();
        let second_broadcasts = second.event_types();

        assert_eq!(
            first_broadcasts.iter().filter(|t| *t == "new_video").count(),
            1,
            "only the first share may broadcast"
        );
        assert_eq!(
            second_broadcasts.iter().filter(|t| *t == "new_video").count(),
            1
        );

        let videos = coordinator.context.db.videos_by_room(room_id).await.unwrap();
        assert_eq!(videos.len(), 1, "identical content stays a single record");
        assert_eq!(videos[0].name, "big buck bunny");
    }

    #[tokio::test]
    async fn test_rejoin_is_idempotent() {
        let (coordinator, room_id) = setup().await;
        let mut client = TestClient::connect(&coordinator);

        join(&coordinator, &client, room_id, "ada").await;
        join(&coordinator, &client, room_id, "ada lovelace").await;

        let users = coordinator.context.db.users_by_room(room_id).await.unwrap();
        assert_eq!(users.len(), 1, "re-joining must not duplicate the user");
        assert_eq!(users[0].username, "ada lovelace", "the username updates");

        let snapshots = client
            .event_types()
            .iter()
            .filter(|t| *t == "room_state")
            .count();
        assert_eq!(snapshots, 2, "each join re-sends the snapshot");
    }

    #[tokio::test]
    async fn test_stale_users_are_reconciled() {
        let (coordinator, room_id) = setup().await;

        let first = TestClient::connect(&coordinator);
        join(&coordinator, &first, room_id, "ada").await;

        // Simulate losing the connection without any cleanup running, as if
        // the bookkeeping restarted underneath the room
        coordinator.context.registry.unregister(first.id);

        let second = TestClient::connect(&coordinator);
        join(&coordinator, &second, room_id, "grace").await;

        let users = coordinator.context.db.users_by_room(room_id).await.unwrap();
        assert_eq!(users.len(), 1, "the orphaned record is deleted on join");
        assert_eq!(users[0].username, "grace");
    }

    #[tokio::test]
    async fn test_switching_rooms_leaves_the_old_one() {
        let coordinator = Coordinator::new(MemoryDatabase::default());

        let first_room = coordinator
            .rooms
            .create_room(NewRoom {
                name: "first".to_string(),
                secret: None,
            })
            .await
            .unwrap()
            .id();

        let second_room = coordinator
            .rooms
            .create_room(NewRoom {
                name: "second".to_string(),
                secret: None,
            })
            .await
            .unwrap()
            .id();

        let mut observer = TestClient::connect(&coordinator);
        join(&coordinator, &observer, first_room, "ada").await;
        observer.events();

        let mover = TestClient::connect(&coordinator);
        join(&coordinator, &mover, first_room, "grace").await;
        join(&coordinator, &mover, second_room, "grace").await;

        assert!(
            coordinator
                .context
                .db
                .users_by_room(first_room)
                .await
                .unwrap()
                .iter()
                .all(|u| u.username != "grace"),
            "the old room forgets the mover"
        );

        let types = observer.event_types();
        assert!(types.contains(&"user_joined".to_string()));
        assert!(
            types.contains(&"user_left".to_string()),
            "the old room observes the implicit leave"
        );
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up_once() {
        let (coordinator, room_id) = setup().await;

        let mut observer = TestClient::connect(&coordinator);
        join(&coordinator, &observer, room_id, "ada").await;
        observer.events();

        let departing = TestClient::connect(&coordinator);
        join(&coordinator, &departing, room_id, "grace").await;

        coordinator.handle_disconnect(departing.id).await;
        // An abrupt close can race a duplicate teardown; it must be harmless
        coordinator.handle_disconnect(departing.id).await;

        let types = observer.event_types();
        assert_eq!(
            types.iter().filter(|t| *t == "user_left").count(),
            1,
            "cleanup fires exactly once"
        );

        let users = coordinator.context.db.users_by_room(room_id).await.unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn test_deleting_selected_video_clears_selection() {
        let (coordinator, room_id) = setup().await;

        let mut client = TestClient::connect(&coordinator);
        join(&coordinator, &client, room_id, "ada").await;
        share(&coordinator, &client, "big buck bunny").await;

        let video_id = client
            .events()
            .iter()
            .find(|e| e["type"] == "new_video")
            .unwrap()["data"]["video"]["id"]
            .as_i64()
            .unwrap();

        let select = format!(
            r#"{{"type":"video_select","data":{{"videoId":{video_id},"magnetUri":"magnet:?xt=urn:btih:{HASH}"}}}}"#
        );
        coordinator.handle_message(client.id, &select).await;

        let delete = format!(r#"{{"type":"video_delete","data":{{"videoId":{video_id}}}}}"#);
        coordinator.handle_message(client.id, &delete).await;

        assert!(client
            .event_types()
            .contains(&"video_deleted".to_string()));

        let mut late = TestClient::connect(&coordinator);
        join(&coordinator, &late, room_id, "grace").await;

        assert_eq!(
            late.event_types(),
            vec!["room_state"],
            "nothing selected is replayed after the deletion"
        );
    }

    #[tokio::test]
    async fn test_control_grant_scenario() {
        let (coordinator, room_id) = setup().await;

        let mut host = TestClient::connect(&coordinator);
        join(&coordinator, &host, room_id, "host").await;

        let mut viewer = TestClient::connect(&coordinator);
        join(&coordinator, &viewer, room_id, "ada").await;

        let viewer_id = coordinator
            .context
            .db
            .users_by_room(room_id)
            .await
            .unwrap()
            .iter()
            .find(|u| u.username == "ada")
            .unwrap()
            .id;

        host.events();
        viewer.events();

        coordinator
            .handle_message(
                host.id,
                r#"{"type":"update_host_only_control","data":{"hostOnlyControl":true}}"#,
            )
            .await;

        let toggles = host.events();
        assert_eq!(toggles[0]["type"], "host_only_control");
        assert_eq!(toggles[0]["data"]["hostOnlyControl"], true);

        coordinator
            .handle_message(viewer.id, r#"{"type":"control_request","data":{}}"#)
            .await;

        let requests = host.events();
        assert_eq!(requests[0]["type"], "control_update");
        assert_eq!(
            requests[0]["data"]["pendingControlRequests"][0]["userId"], viewer_id,
            "the host sees the incoming request"
        );
        viewer.events();

        let grant = format!(r#"{{"type":"control_grant","data":{{"userId":{viewer_id}}}}}"#);
        coordinator.handle_message(host.id, &grant).await;
        host.events();

        let grants = viewer.events();
        let update = grants
            .iter()
            .find(|e| e["type"] == "control_update")
            .expect("the resolution is broadcast");

        assert_eq!(update["data"]["allowedControlUserIds"][0], viewer_id);
        assert_eq!(
            update["data"]["pendingControlRequests"]
                .as_array()
                .unwrap()
                .len(),
            0,
            "granted users leave the pending set"
        );

        // The granted viewer drives playback; everyone else follows
        coordinator
            .handle_message(
                viewer.id,
                r#"{"type":"video_sync","data":{"action":"play","currentTime":12.5}}"#,
            )
            .await;

        let synced = host.events();
        assert_eq!(synced[0]["type"], "video_sync");
        assert_eq!(synced[0]["data"]["action"], "play");
        assert_eq!(synced[0]["data"]["currentTime"], 12.5);
        assert_eq!(synced[0]["data"]["roomId"], room_id);

        assert!(
            viewer.events().is_empty(),
            "the sender does not receive its own sync"
        );
    }

    #[tokio::test]
    async fn test_malformed_frames_only_bounce_an_error() {
        let (coordinator, room_id) = setup().await;

        let mut client = TestClient::connect(&coordinator);
        join(&coordinator, &client, room_id, "ada").await;

        let mut observer = TestClient::connect(&coordinator);
        join(&coordinator, &observer, room_id, "grace").await;
        client.events();
        observer.events();

        coordinator.handle_message(client.id, "not even json").await;
        coordinator
            .handle_message(client.id, r#"{"type":"time_travel","data":{}}"#)
            .await;

        assert_eq!(
            client.event_types(),
            vec!["error", "error"],
            "the sender hears about each rejection"
        );
        assert!(
            observer.events().is_empty(),
            "rejections never reach other connections"
        );
    }
}
