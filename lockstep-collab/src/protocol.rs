//! The closed set of messages a client may send over the gateway.
//!
//! Raw frames are JSON envelopes `{type, data}` and decode into exactly one
//! [ClientCommand] or are rejected. Rejection never affects the connection or
//! any other room.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{CoordinatorError, PrimaryKey};

/// A playback action that drives follower playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackAction {
    Play,
    Pause,
    Seek,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    JoinRoom(JoinRoom),
    LeaveRoom {},
    ChatMessage(ChatMessage),
    VideoSync(VideoSync),
    VideoShare(VideoShare),
    VideoSelect(VideoSelect),
    VideoDelete(VideoDelete),
    UserProgress(UserProgress),
    ControlRequest {},
    ControlGrant(ControlGrant),
    ControlDeny(ControlDeny),
    UpdateHostOnlyControl(UpdateHostOnlyControl),
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room_id: PrimaryKey,
    #[validate(length(min = 1, max = 32))]
    pub username: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VideoSync {
    pub action: PlaybackAction,
    /// Position in seconds at the time of the action. JSON cannot encode
    /// non-finite numbers, so a lower bound is the whole check.
    #[validate(range(min = 0.0))]
    pub current_time: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VideoShare {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 8, max = 2048))]
    pub magnet_uri: String,
    pub info_hash: String,
    #[validate(range(min = 1))]
    pub size: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VideoSelect {
    pub video_id: PrimaryKey,
    #[validate(length(min = 8, max = 2048))]
    pub magnet_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDelete {
    pub video_id: PrimaryKey,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    #[validate(range(min = 0.0))]
    pub current_time: f64,
    pub is_playing: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlGrant {
    pub user_id: PrimaryKey,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlDeny {
    pub user_id: PrimaryKey,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHostOnlyControl {
    pub host_only_control: bool,
}

impl ClientCommand {
    /// Decodes and validates a raw text frame
    pub fn decode(raw: &str) -> Result<Self, CoordinatorError> {
        let command: Self = serde_json::from_str(raw)
            .map_err(|e| CoordinatorError::Validation(e.to_string()))?;

        command.validate()?;
        Ok(command)
    }

    fn validate(&self) -> Result<(), CoordinatorError> {
        match self {
            Self::JoinRoom(payload) => check(payload),
            Self::ChatMessage(payload) => check(payload),
            Self::VideoSync(payload) => check(payload),
            Self::VideoShare(payload) => {
                check(payload)?;
                check_magnet_uri(&payload.magnet_uri)?;
                check_info_hash(&payload.info_hash)
            }
            Self::VideoSelect(payload) => {
                check(payload)?;
                check_magnet_uri(&payload.magnet_uri)
            }
            Self::UserProgress(payload) => check(payload),
            Self::LeaveRoom {}
            | Self::VideoDelete(_)
            | Self::ControlRequest {}
            | Self::ControlGrant(_)
            | Self::ControlDeny(_)
            | Self::UpdateHostOnlyControl(_) => Ok(()),
        }
    }
}

fn check(payload: &impl Validate) -> Result<(), CoordinatorError> {
    payload
        .validate()
        .map_err(|e| CoordinatorError::Validation(e.to_string()))
}

/// Info hashes are the 40 hex chars of a v1 content hash
fn check_info_hash(info_hash: &str) -> Result<(), CoordinatorError> {
    let well_formed = info_hash.len() == 40 && info_hash.chars().all(|c| c.is_ascii_hexdigit());

    if well_formed {
        Ok(())
    } else {
        Err(CoordinatorError::Validation(
            "infoHash must be 40 hex characters".to_string(),
        ))
    }
}

fn check_magnet_uri(magnet_uri: &str) -> Result<(), CoordinatorError> {
    if magnet_uri.starts_with("magnet:") {
        Ok(())
    } else {
        Err(CoordinatorError::Validation(
            "magnetUri must use the magnet scheme".to_string(),
        ))
    }
}
