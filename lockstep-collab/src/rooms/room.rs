use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::{
    events::ServerEvent, Binding, ConnectionId, ControlState, CoordinatorContext,
    CoordinatorError, Database, MessageWithUser, NewMessage, NewUser, NewVideo, PlaybackMemory,
    PrimaryKey, RoomData, ToSerialized, UserProgress, VideoDelete, VideoSelect, VideoShare,
    VideoSync,
};

pub type RoomId = PrimaryKey;

/// A watch party room: its persisted record, the transient playback and
/// control state replayed to late joiners, and the operations connections
/// perform through the coordinator.
pub struct RoomSession<Db> {
    context: CoordinatorContext<Db>,
    data: Mutex<RoomData>,
    playback: Mutex<PlaybackMemory>,
    control: Mutex<ControlState>,
    /// Serializes mutating operations for this room, persistence awaits
    /// included. Unrelated rooms never contend on it.
    op_lock: AsyncMutex<()>,
}

impl<Db> RoomSession<Db>
where
    Db: Database,
{
    pub fn new(context: &CoordinatorContext<Db>, data: RoomData) -> Self {
        Self {
            context: context.clone(),
            data: data.into(),
            playback: Default::default(),
            control: Default::default(),
            op_lock: Default::default(),
        }
    }

    /// Adds the connection's user to the room and sends it the full
    /// snapshot. A connection re-joining its current room is treated as an
    /// idempotent refresh.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        username: &str,
    ) -> Result<(), CoordinatorError> {
        let _guard = self.op_lock.lock().await;

        if !self.data().active {
            return Err(CoordinatorError::RoomNotActive);
        }

        let room_id = self.id();
        let registry = &self.context.registry;

        if let Some(binding) = registry.binding(connection_id) {
            if binding.room_id == room_id {
                let user = self
                    .context
                    .db_call(self.context.db.update_username(binding.user_id, username))
                    .await?;

                self.send_snapshot(connection_id).await?;

                info!("User {} re-joined room {}", user.username, self.data().name);
                return Ok(());
            }
        }

        self.reconcile_stale_users().await?;

        // The first viewer into an empty room becomes its host
        let is_host = registry.bound_user_ids(room_id).is_empty();

        let user = self
            .context
            .db_call(self.context.db.create_user(NewUser {
                username: username.to_string(),
                room_id,
                is_host,
            }))
            .await?;

        registry.bind(connection_id, room_id, user.id);

        self.context.broadcaster.broadcast(
            room_id,
            &ServerEvent::UserJoined {
                user: user.to_serialized(),
            },
            Some(connection_id),
        );

        self.send_snapshot(connection_id).await?;

        info!("User {} joined room {}", user.username, self.data().name);
        Ok(())
    }

    /// Removes the connection's user from the room. A no-op for connections
    /// that never bound, so the explicit-leave and transport-close paths can
    /// both call it safely.
    pub async fn leave(&self, connection_id: ConnectionId) {
        let _guard = self.op_lock.lock().await;

        let Some(binding) = self.context.registry.unbind(connection_id) else {
            return;
        };

        if let Err(err) = self
            .context
            .db_call(self.context.db.delete_user(binding.user_id))
            .await
        {
            // The stale row is reconciled on the next join
            warn!("Could not delete user {} on leave: {err}", binding.user_id);
        }

        self.context.broadcaster.broadcast(
            binding.room_id,
            &ServerEvent::UserLeft {
                user_id: binding.user_id,
            },
            None,
        );

        info!("User {} left room {}", binding.user_id, self.data().name);
    }

    /// Persists a chat message and broadcasts it with its author attached
    pub async fn send_chat(
        &self,
        binding: Binding,
        content: String,
    ) -> Result<(), CoordinatorError> {
        let _guard = self.op_lock.lock().await;

        let message = self
            .context
            .db_call(self.context.db.create_message(NewMessage {
                content,
                user_id: binding.user_id,
                room_id: self.id(),
            }))
            .await?;

        let user = self
            .context
            .db_call(self.context.db.user_by_id(binding.user_id))
            .await?;

        self.context.broadcaster.broadcast(
            self.id(),
            &ServerEvent::NewMessage(MessageWithUser {
                message: message.to_serialized(),
                user: user.to_serialized(),
            }),
            None,
        );

        Ok(())
    }

    /// Registers a shared video. Sharing content the room already knows
    /// resolves to the existing record, without a second broadcast.
    pub async fn share_video(
        &self,
        binding: Binding,
        payload: VideoShare,
    ) -> Result<(), CoordinatorError> {
        let _guard = self.op_lock.lock().await;
        let room_id = self.id();

        let existing = self
            .context
            .db_call(
                self.context
                    .db
                    .video_by_info_hash(room_id, &payload.info_hash),
            )
            .await;

        match existing {
            Ok(video) => {
                debug!(
                    "Content {} is already video {} in room {room_id}",
                    payload.info_hash, video.id
                );
                Ok(())
            }
            Err(CoordinatorError::NotFound { .. }) => {
                let video = self
                    .context
                    .db_call(self.context.db.create_video(NewVideo {
                        name: payload.name,
                        magnet_uri: payload.magnet_uri,
                        info_hash: payload.info_hash,
                        size: payload.size,
                        room_id,
                        uploader_id: binding.user_id,
                    }))
                    .await?;

                // The uploader is included so every client converges on the
                // same authoritative ordering
                self.context.broadcaster.broadcast(
                    room_id,
                    &ServerEvent::NewVideo {
                        video: video.to_serialized(),
                    },
                    None,
                );

                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Deletes a video belonging to this room, clearing the selection if the
    /// video was selected
    pub async fn delete_video(&self, payload: VideoDelete) -> Result<(), CoordinatorError> {
        let _guard = self.op_lock.lock().await;
        let room_id = self.id();

        let video = self
            .context
            .db_call(self.context.db.video_by_id(payload.video_id))
            .await?;

        if video.room_id != room_id {
            return Err(CoordinatorError::NotFound { resource: "video" });
        }

        self.context
            .db_call(self.context.db.delete_video(video.id))
            .await?;

        self.context.broadcaster.broadcast(
            room_id,
            &ServerEvent::VideoDeleted { video_id: video.id },
            None,
        );

        if self.playback.lock().clear_selection_of(video.id) {
            debug!("Cleared the selection of room {room_id}");
        }

        Ok(())
    }

    /// Sets the room's selection and announces it to everyone, sender
    /// included
    pub async fn select_video(&self, payload: VideoSelect) {
        let _guard = self.op_lock.lock().await;

        self.playback
            .lock()
            .select(payload.video_id, &payload.magnet_uri);

        self.context.broadcaster.broadcast(
            self.id(),
            &ServerEvent::VideoSelected {
                video_id: payload.video_id,
                magnet_uri: payload.magnet_uri,
            },
            None,
        );
    }

    /// Records a playback action and relays it to every other connection
    pub async fn sync_playback(&self, connection_id: ConnectionId, payload: VideoSync) {
        let _guard = self.op_lock.lock().await;
        let room_id = self.id();

        self.playback
            .lock()
            .sync(payload.action, payload.current_time);

        self.context.broadcaster.broadcast(
            room_id,
            &ServerEvent::VideoSync {
                action: payload.action,
                current_time: payload.current_time,
                room_id,
            },
            Some(connection_id),
        );
    }

    /// Relays a viewer's progress report. Informational only; nothing is
    /// kept.
    pub async fn report_progress(
        &self,
        connection_id: ConnectionId,
        binding: Binding,
        payload: UserProgress,
    ) {
        let _guard = self.op_lock.lock().await;

        self.context.broadcaster.broadcast(
            self.id(),
            &ServerEvent::UserProgress {
                user_id: binding.user_id,
                current_time: payload.current_time,
                is_playing: payload.is_playing,
            },
            Some(connection_id),
        );
    }

    /// Files a control request for the sender and shows the updated pending
    /// set to the room
    pub async fn request_control(&self, binding: Binding) -> Result<(), CoordinatorError> {
        let _guard = self.op_lock.lock().await;

        let user = self
            .context
            .db_call(self.context.db.user_by_id(binding.user_id))
            .await?;

        let event = {
            let mut control = self.control.lock();
            control.request(user.id, &user.username);
            control_update(&control)
        };

        self.context.broadcaster.broadcast(self.id(), &event, None);
        Ok(())
    }

    pub async fn grant_control(&self, user_id: PrimaryKey) {
        let _guard = self.op_lock.lock().await;

        let event = {
            let mut control = self.control.lock();
            control.grant(user_id);
            control_update(&control)
        };

        self.context.broadcaster.broadcast(self.id(), &event, None);
    }

    pub async fn deny_control(&self, user_id: PrimaryKey) {
        let _guard = self.op_lock.lock().await;

        let event = {
            let mut control = self.control.lock();
            control.deny(user_id);
            control_update(&control)
        };

        self.context.broadcaster.broadcast(self.id(), &event, None);
    }

    /// Toggles host-only control. The flag is persisted on the room record;
    /// existing grants survive mode switches.
    pub async fn set_host_only_control(
        &self,
        host_only_control: bool,
    ) -> Result<(), CoordinatorError> {
        let _guard = self.op_lock.lock().await;
        let room_id = self.id();

        let updated = self
            .context
            .db_call(
                self.context
                    .db
                    .set_room_host_only_control(room_id, host_only_control),
            )
            .await?;

        *self.data.lock() = updated;

        self.context.broadcaster.broadcast(
            room_id,
            &ServerEvent::HostOnlyControl {
                room_id,
                host_only_control,
            },
            None,
        );

        Ok(())
    }

    /// Sends the full room snapshot to one connection, then replays the
    /// current selection and playback state so it can converge without
    /// waiting for the next live event.
    async fn send_snapshot(&self, connection_id: ConnectionId) -> Result<(), CoordinatorError> {
        let room_id = self.id();
        let context = &self.context;

        let users = context.db_call(context.db.users_by_room(room_id)).await?;
        let messages = context.db_call(context.db.messages_by_room(room_id)).await?;
        let videos = context.db_call(context.db.videos_by_room(room_id)).await?;

        context.broadcaster.send_to(
            connection_id,
            &ServerEvent::RoomState {
                room: self.data().to_serialized(),
                users: users.to_serialized(),
                messages: messages.to_serialized(),
                videos: videos.to_serialized(),
            },
        );

        for event in self.playback.lock().replay(room_id) {
            context.broadcaster.send_to(connection_id, &event);
        }

        Ok(())
    }

    /// Deletes persisted users of this room that no live connection is bound
    /// to. Runs before every fresh join as the defense against records
    /// orphaned by abrupt socket drops.
    async fn reconcile_stale_users(&self) -> Result<(), CoordinatorError> {
        let room_id = self.id();

        let persisted = self
            .context
            .db_call(self.context.db.users_by_room(room_id))
            .await?;

        let live = self.context.registry.bound_user_ids(room_id);

        for user in persisted.into_iter().filter(|u| !live.contains(&u.id)) {
            info!(
                "Reconciling stale user {} in room {room_id}",
                user.username
            );

            self.context
                .db_call(self.context.db.delete_user(user.id))
                .await?;
        }

        Ok(())
    }

    pub fn data(&self) -> RoomData {
        self.data.lock().clone()
    }

    pub fn id(&self) -> RoomId {
        self.data().id
    }
}

/// The arbitration broadcast shown after any request, grant, or deny
fn control_update(control: &ControlState) -> ServerEvent {
    ServerEvent::ControlUpdate {
        allowed_control_user_ids: control.allowed_ids(),
        pending_control_requests: control.pending_requests(),
    }
}
