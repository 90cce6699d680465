// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// A unit of work running on a workstation: a bare PTY, a coding agent, or a
/// supervisor fan-in session. Shared fields live on [`Session`] directly;
/// variant-specific fields live on [`SessionType`], a tagged-enum layering
/// rather than a flat struct with optional fields for every kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(flatten)]
    pub session_type: SessionType,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<String>,
    pub working_dir: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "session_type", rename_all = "snake_case")]
pub enum SessionType {
    Terminal,
    Agent {
        agent: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    Supervisor {
        #[serde(default)]
        members: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Idle,
    Busy,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        session_type: SessionType,
        working_dir: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            session_type,
            status: SessionStatus::Active,
            workspace: None,
            project: None,
            worktree: None,
            working_dir: working_dir.into(),
            created_at,
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self.session_type, SessionType::Agent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_session_round_trips_with_tag() {
        let session = Session::new(
            "s1",
            SessionType::Agent { agent: "claude".to_owned(), model: None },
            "/work/repo",
            1000,
        );
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"session_type\":\"agent\""));
        let decoded: Session = serde_json::from_str(&json).unwrap();
        assert!(decoded.is_agent());
    }

    #[test]
    fn terminal_session_has_no_agent_fields() {
        let session = Session::new("s2", SessionType::Terminal, "/work", 0);
        assert!(!session.is_agent());
        assert_eq!(session.status, SessionStatus::Active);
    }
}
