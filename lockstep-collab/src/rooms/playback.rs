use crate::{PlaybackAction, PrimaryKey, RoomId, ServerEvent};

/// The room's currently chosen video
#[derive(Debug, Clone)]
pub struct Selection {
    pub video_id: PrimaryKey,
    pub magnet_uri: String,
}

/// The last playback action observed for a room
#[derive(Debug, Clone, Copy)]
pub struct PlaybackState {
    pub action: PlaybackAction,
    pub current_time: f64,
}

/// Per-room playback memory. Overwritten by every select and sync, and
/// replayed verbatim to connections that join afterwards. Intentionally not
/// persisted; clients re-announce after a coordinator restart.
#[derive(Debug, Default)]
pub struct PlaybackMemory {
    selection: Option<Selection>,
    state: Option<PlaybackState>,
}

impl PlaybackMemory {
    /// Overwrites the selection unconditionally
    pub fn select(&mut self, video_id: PrimaryKey, magnet_uri: &str) {
        self.selection = Some(Selection {
            video_id,
            magnet_uri: magnet_uri.to_string(),
        });
    }

    /// Records the latest playback action
    pub fn sync(&mut self, action: PlaybackAction, current_time: f64) {
        self.state = Some(PlaybackState {
            action,
            current_time,
        });
    }

    /// Clears the selection if it points at the given video.
    /// Returns whether it did.
    pub fn clear_selection_of(&mut self, video_id: PrimaryKey) -> bool {
        let selected = self
            .selection
            .as_ref()
            .is_some_and(|s| s.video_id == video_id);

        if selected {
            self.selection = None;
        }

        selected
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// The synthetic events a late joiner needs to converge, identical in
    /// shape to the live broadcasts and in the order they must be sent.
    pub fn replay(&self, room_id: RoomId) -> Vec<ServerEvent> {
        let mut events = Vec::new();

        if let Some(selection) = &self.selection {
            events.push(ServerEvent::VideoSelected {
                video_id: selection.video_id,
                magnet_uri: selection.magnet_uri.clone(),
            });
        }

        if let Some(state) = self.state {
            events.push(ServerEvent::VideoSync {
                action: state.action,
                current_time: state.current_time,
                room_id,
            });
        }

        events
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_replay_order() {
        let mut memory = PlaybackMemory::default();

        assert!(memory.replay(1).is_empty(), "nothing to replay initially");

        memory.select(5, "magnet:?xt=urn:btih:abc");
        memory.sync(PlaybackAction::Pause, 30.0);

        let replayed = memory.replay(1);
        assert_eq!(replayed.len(), 2);

        assert!(
            matches!(replayed[0], ServerEvent::VideoSelected { video_id: 5, .. }),
            "selection replays first"
        );
        assert!(
            matches!(
                replayed[1],
                ServerEvent::VideoSync {
                    action: PlaybackAction::Pause,
                    ..
                }
            ),
            "playback state replays after the selection"
        );
    }

    #[test]
    fn test_overwrites() {
        let mut memory = PlaybackMemory::default();

        memory.select(1, "magnet:?xt=urn:btih:abc");
        memory.select(2, "magnet:?xt=urn:btih:def");
        memory.sync(PlaybackAction::Play, 1.0);
        memory.sync(PlaybackAction::Seek, 95.5);

        let replayed = memory.replay(1);
        assert!(matches!(
            replayed[0],
            ServerEvent::VideoSelected { video_id: 2, .. }
        ));
        assert!(matches!(
            replayed[1],
            ServerEvent::VideoSync {
                action: PlaybackAction::Seek,
                ..
            }
        ));
    }

    #[test]
    fn test_clearing_selection() {
        let mut memory = PlaybackMemory::default();
        memory.select(5, "magnet:?xt=urn:btih:abc");

        assert!(!memory.clear_selection_of(6), "other videos do not clear");
        assert!(memory.selection().is_some());

        assert!(memory.clear_selection_of(5));
        assert!(memory.selection().is_none());
        assert!(
            !memory.clear_selection_of(5),
            "clearing twice is a harmless no-op"
        );
    }
}
