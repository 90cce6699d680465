// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor session: a distinguished, always-present agent session
//! that fans in commands from every member session and exposes one
//! combined conversation (`SessionType::Supervisor`).
//!
//! Reuses [`crate::session::agent`]'s actor verbatim — a supervisor differs
//! from a plain agent session only in that [`SessionRegistry`] creates
//! exactly one of them per workstation at startup and tracks its
//! `members` list, which is advisory bookkeeping surfaced on the `Session`
//! record rather than behavior the actor itself needs to know about.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use super::agent::{self, AgentConfig, AgentHandle};
use crate::bus::SessionBus;

pub const SUPERVISOR_SESSION_ID: &str = "supervisor";

pub struct Supervisor {
    pub handle: AgentHandle,
    members: RwLock<Vec<String>>,
}

impl Supervisor {
    pub fn spawn(config: AgentConfig, bus: Arc<SessionBus>, outbound: mpsc::Sender<tiflis_protocol::Envelope>) -> Self {
        let handle = agent::spawn(SUPERVISOR_SESSION_ID.to_owned(), config, bus, outbound);
        Self { handle, members: RwLock::new(Vec::new()) }
    }

    pub async fn add_member(&self, session_id: String) {
        let mut members = self.members.write().await;
        if !members.contains(&session_id) {
            members.push(session_id);
        }
    }

    pub async fn remove_member(&self, session_id: &str) {
        self.members.write().await.retain(|m| m != session_id);
    }

    pub async fn members(&self) -> Vec<String> {
        self.members.read().await.clone()
    }
}
