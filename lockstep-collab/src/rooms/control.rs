use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::{PendingControlRequest, PrimaryKey};

/// Who may drive shared playback in a room besides the host.
///
/// The coordinator only maintains and broadcasts this state; whether a sync
/// from an unlisted user is honored is a client display concern.
#[derive(Debug, Default)]
pub struct ControlState {
    allowed: HashSet<PrimaryKey>,
    pending: HashMap<PrimaryKey, PendingEntry>,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    username: String,
    requested_at: DateTime<Utc>,
}

impl ControlState {
    /// Adds or refreshes a pending control request
    pub fn request(&mut self, user_id: PrimaryKey, username: &str) {
        self.pending.insert(
            user_id,
            PendingEntry {
                username: username.to_string(),
                requested_at: Utc::now(),
            },
        );
    }

    /// Grants control: the user moves from the pending set to the allowed
    /// set. Grants stay until explicitly revoked, across mode toggles.
    pub fn grant(&mut self, user_id: PrimaryKey) {
        self.pending.remove(&user_id);
        self.allowed.insert(user_id);
    }

    /// Denies control: the user only leaves the pending set
    pub fn deny(&mut self, user_id: PrimaryKey) {
        self.pending.remove(&user_id);
    }

    /// The granted user ids, sorted for stable wire output
    pub fn allowed_ids(&self) -> Vec<PrimaryKey> {
        let mut ids: Vec<_> = self.allowed.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The outstanding requests, oldest first
    pub fn pending_requests(&self) -> Vec<PendingControlRequest> {
        let mut requests: Vec<_> = self
            .pending
            .iter()
            .map(|(user_id, entry)| PendingControlRequest {
                user_id: *user_id,
                username: entry.username.clone(),
                requested_at: entry.requested_at,
            })
            .collect();

        requests.sort_by_key(|r| (r.requested_at, r.user_id));
        requests
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pending_ids(state: &ControlState) -> Vec<PrimaryKey> {
        state.pending_requests().iter().map(|r| r.user_id).collect()
    }

    #[test]
    fn test_grant_moves_user_out_of_pending() {
        let mut state = ControlState::default();

        state.request(7, "ada");
        state.grant(7);

        assert_eq!(state.allowed_ids(), vec![7]);
        assert!(pending_ids(&state).is_empty());
    }

    #[test]
    fn test_deny_only_clears_pending() {
        let mut state = ControlState::default();

        state.request(7, "ada");
        state.deny(7);

        assert!(state.allowed_ids().is_empty());
        assert!(pending_ids(&state).is_empty());
    }

    #[test]
    fn test_request_refreshes_in_place() {
        let mut state = ControlState::default();

        state.request(7, "ada");
        state.request(7, "ada the second");

        let requests = state.pending_requests();
        assert_eq!(requests.len(), 1, "a refresh should not duplicate");
        assert_eq!(requests[0].username, "ada the second");
    }

    #[test]
    fn test_sets_stay_disjoint() {
        let mut state = ControlState::default();

        // An arbitrary interleaving of requests and resolutions
        state.request(1, "a");
        state.request(2, "b");
        state.grant(1);
        state.request(3, "c");
        state.deny(2);
        state.request(1, "a");
        state.grant(1);
        state.grant(3);

        for user_id in state.allowed_ids() {
            assert!(
                !pending_ids(&state).contains(&user_id),
                "user {user_id} appears in both sets"
            );
        }

        assert_eq!(state.allowed_ids(), vec![1, 3]);
        assert!(pending_ids(&state).is_empty());
    }
}
