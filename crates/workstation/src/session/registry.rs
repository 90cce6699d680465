// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session table. A plain `RwLock<HashMap<..>>`, not an actor itself:
//! actors own their own mutable state, the registry only owns which actors
//! exist and their shared metadata — the same actors-own-state principle
//! applied one level up, to the set of sessions rather than any one
//! session's internals.

use std::collections::HashMap;
use std::sync::Arc;

use tiflis_protocol::{Session, SessionStatus};
use tokio::sync::RwLock;

use super::agent::AgentHandle;
use super::terminal::TerminalHandle;

pub enum SessionKind {
    Terminal(TerminalHandle),
    Agent(AgentHandle),
}

pub struct SessionHandle {
    pub kind: SessionKind,
    meta: RwLock<Session>,
}

impl SessionHandle {
    pub fn new(kind: SessionKind, meta: Session) -> Arc<Self> {
        Arc::new(Self { kind, meta: RwLock::new(meta) })
    }

    pub async fn meta(&self) -> Session {
        self.meta.read().await.clone()
    }

    pub async fn set_status(&self, status: SessionStatus) {
        self.meta.write().await.status = status;
    }

    pub fn as_terminal(&self) -> Option<&TerminalHandle> {
        match &self.kind {
            SessionKind::Terminal(h) => Some(h),
            SessionKind::Agent(_) => None,
        }
    }

    pub fn as_agent(&self) -> Option<&AgentHandle> {
        match &self.kind {
            SessionKind::Agent(h) => Some(h),
            SessionKind::Terminal(_) => None,
        }
    }

    pub async fn terminate(&self) {
        match &self.kind {
            SessionKind::Terminal(h) => h.terminate().await,
            SessionKind::Agent(h) => h.terminate().await,
        }
    }
}

/// The live session table. Keyed by `session_id`; the supervisor session
/// lives in here under [`super::supervisor::SUPERVISOR_SESSION_ID`] like any
/// other entry.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session_id: String, handle: Arc<SessionHandle>) {
        self.sessions.write().await.insert(session_id, handle);
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn session_ids(&self) -> std::collections::HashSet<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// `Session` records for every live session, in insertion-unordered
    /// iteration order — callers that need a stable order (e.g. `sync`)
    /// sort by `created_at`.
    pub async fn list(&self) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        let mut out = Vec::with_capacity(sessions.len());
        for handle in sessions.values() {
            out.push(handle.meta().await);
        }
        out.sort_by_key(|s| s.created_at);
        out
    }
}
