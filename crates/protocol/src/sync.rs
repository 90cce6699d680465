// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::content_block::ContentBlock;
use crate::messages::AgentHistoryRecord;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `sync` has no payload; `sync.state` (server→) is the authoritative
/// snapshot a client applies wholesale on reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub sessions: Vec<Session>,
    pub subscriptions: Vec<String>,
    pub supervisor_history: Vec<AgentHistoryRecord>,
    pub supervisor_is_executing: bool,
    pub executing_states: HashMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_streaming_blocks: Option<Vec<ContentBlock>>,
}

impl SyncState {
    pub fn empty() -> Self {
        Self {
            sessions: Vec::new(),
            subscriptions: Vec::new(),
            supervisor_history: Vec::new(),
            supervisor_is_executing: false,
            executing_states: HashMap::new(),
            current_streaming_blocks: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sync_state_has_no_sessions() {
        let state = SyncState::empty();
        assert!(state.sessions.is_empty());
        assert!(!state.supervisor_is_executing);
    }

    #[test]
    fn executing_states_round_trip_by_session_id() {
        let mut state = SyncState::empty();
        state.executing_states.insert("s1".to_owned(), true);
        let json = serde_json::to_string(&state).unwrap();
        let decoded: SyncState = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.executing_states.get("s1"), Some(&true));
    }
}
