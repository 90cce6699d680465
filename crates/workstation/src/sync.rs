// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builds the `sync.state` snapshot a device applies wholesale on connect
//! or reconnect. Reads straight off [`crate::session::registry::SessionRegistry`],
//! the supervisor's [`crate::session::agent::AgentSnapshot`], and
//! [`crate::device::DeviceRegistry`] — no separate cache, since all three
//! are already cheap to read concurrently.

use std::collections::{HashMap, HashSet};

use tiflis_protocol::SyncState;

use crate::device::DeviceRegistry;
use crate::session::registry::SessionRegistry;
use crate::session::supervisor::{Supervisor, SUPERVISOR_SESSION_ID};

pub async fn build(registry: &SessionRegistry, supervisor: &Supervisor, devices: &DeviceRegistry, device_id: &str) -> SyncState {
    let sessions = registry.list().await;
    let live_ids: HashSet<String> = sessions.iter().map(|s| s.session_id.clone()).collect();
    let subscriptions = devices.subscriptions_for(device_id, &live_ids).await;

    let supervisor_snapshot = supervisor.handle.snapshot().await;

    let mut executing_states = HashMap::new();
    executing_states.insert(SUPERVISOR_SESSION_ID.to_owned(), supervisor_snapshot.is_executing);
    for session_id in &live_ids {
        if let Some(handle) = registry.get(session_id).await {
            if let Some(agent) = handle.as_agent() {
                executing_states.insert(session_id.clone(), agent.is_executing());
            }
        }
    }

    SyncState {
        sessions,
        subscriptions,
        supervisor_history: supervisor_snapshot.history,
        supervisor_is_executing: supervisor_snapshot.is_executing,
        executing_states,
        current_streaming_blocks: supervisor_snapshot.current_streaming_blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::agent::AgentConfig;
    use crate::bus::SessionBus;
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_workstation_syncs_to_idle_supervisor() {
        let registry = SessionRegistry::new();
        let devices = DeviceRegistry::new();
        let bus = Arc::new(SessionBus::new());
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        let supervisor = Supervisor::spawn(AgentConfig { agent_command: vec!["true".into()], cwd: "/tmp".into(), stt: None, tts: None, audio: None }, bus, tx);

        let state = build(&registry, &supervisor, &devices, "d1").await;
        assert!(state.sessions.is_empty());
        assert!(!state.supervisor_is_executing);
        assert_eq!(state.executing_states.get(SUPERVISOR_SESSION_ID), Some(&false));
    }
}
