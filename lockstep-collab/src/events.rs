use serde::Serialize;

use crate::{
    Message, MessageWithUser, PendingControlRequest, PlaybackAction, PrimaryKey, Room, RoomId,
    User, Video,
};

/// Everything the coordinator may push to a client. Serializes to the wire
/// envelope `{type, data}`.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// The full snapshot sent to a connection that joined a room
    RoomState {
        room: Room,
        users: Vec<User>,
        messages: Vec<Message>,
        videos: Vec<Video>,
    },
    UserJoined {
        user: User,
    },
    UserLeft {
        user_id: PrimaryKey,
    },
    NewMessage(MessageWithUser),
    NewVideo {
        video: Video,
    },
    VideoDeleted {
        video_id: PrimaryKey,
    },
    /// The room's selection changed. Sent to the whole room, sender included,
    /// so every client reloads from the same authoritative event.
    VideoSelected {
        video_id: PrimaryKey,
        magnet_uri: String,
    },
    /// A playback action to follow. Sent to everyone but the sender, whose
    /// player already reflects it.
    VideoSync {
        action: PlaybackAction,
        current_time: f64,
        room_id: RoomId,
    },
    /// Informational per-viewer progress, not part of playback state
    UserProgress {
        user_id: PrimaryKey,
        current_time: f64,
        is_playing: bool,
    },
    HostOnlyControl {
        room_id: RoomId,
        host_only_control: bool,
    },
    ControlUpdate {
        allowed_control_user_ids: Vec<PrimaryKey>,
        pending_control_requests: Vec<PendingControlRequest>,
    },
    Error {
        message: String,
    },
}
