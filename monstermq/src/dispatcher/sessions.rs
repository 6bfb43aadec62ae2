// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Registry of known client sessions: who is online where, and whose
//! session survives a disconnect.

use std::collections::HashMap;

use crate::types::{ClientId, SessionGid};

#[derive(Debug, Clone, Copy)]
struct ClientState {
    gid: Option<SessionGid>,
    persistent: bool,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    clients: HashMap<ClientId, ClientState>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&mut self, client_id: &str, gid: SessionGid, persistent: bool) {
        self.clients.insert(
            client_id.to_string(),
            ClientState {
                gid: Some(gid),
                persistent,
            },
        );
    }

    /// Mark `client_id` offline, but only when `gid` is still its
    /// current session. Returns false for stale disconnects after a
    /// takeover.
    pub fn set_offline(&mut self, client_id: &str, gid: SessionGid) -> bool {
        match self.clients.get_mut(client_id) {
            Some(state) if state.gid == Some(gid) => {
                state.gid = None;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn online(&self, client_id: &str) -> Option<SessionGid> {
        self.clients.get(client_id).and_then(|state| state.gid)
    }

    #[must_use]
    pub fn is_persistent(&self, client_id: &str) -> bool {
        self.clients
            .get(client_id)
            .is_some_and(|state| state.persistent)
    }

    pub fn remove(&mut self, client_id: &str) {
        self.clients.remove(client_id);
    }

    #[must_use]
    pub fn online_count(&self) -> usize {
        self.clients
            .values()
            .filter(|state| state.gid.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_takeover_keeps_new_session_online() {
        let mut registry = SessionRegistry::new();
        let old = SessionGid::new(0, 1);
        let new = SessionGid::new(0, 2);

        registry.set_online("c1", old, true);
        registry.set_online("c1", new, true);

        // The stale disconnect of the taken-over session is ignored.
        assert!(!registry.set_offline("c1", old));
        assert_eq!(registry.online("c1"), Some(new));

        assert!(registry.set_offline("c1", new));
        assert_eq!(registry.online("c1"), None);
        assert!(registry.is_persistent("c1"));
    }
}
