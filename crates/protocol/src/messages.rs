// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete payload types for the message catalog. Each struct here is the
//! `payload` of an [`crate::Envelope`] whose `type` is the
//! constant documented on the struct. Grouped by concern: control, then
//! tunnel-only, then session management, then agent/terminal data
//! messages, then audio.

use crate::content_block::ContentBlock;
use crate::session::{Session, SessionType};
use serde::{Deserialize, Serialize};

// ---- Control -----------------------------------------------------------

/// `ping` / `pong`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ping {
    pub timestamp: u64,
}

/// `heartbeat` (client→server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub id: String,
    pub timestamp: u64,
}

/// `heartbeat.ack` (server→client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub id: String,
    pub timestamp: u64,
    pub workstation_uptime_ms: u64,
}

/// `auth` (client→server, first message on an inbound socket)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    pub auth_key: String,
    pub device_id: String,
}

/// `auth.success`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSuccess {
    pub device_id: String,
    pub workstation_name: String,
    pub workstation_version: String,
    pub protocol_version: String,
    pub workspaces_root: String,
    #[serde(default)]
    pub restored_subscriptions: Vec<String>,
}

/// `auth.error`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthError {
    pub code: String,
    pub message: String,
}

/// `response` — correlated reply to any request with an `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(flatten)]
    pub body: serde_json::Value,
}

// ---- Tunnel-only --------------------------------------------------------

/// `workstation.register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkstationRegister {
    pub api_key: String,
    pub name: String,
    pub auth_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_tunnel_id: Option<String>,
}

/// `workstation.registered`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkstationRegistered {
    pub tunnel_id: String,
    pub public_url: String,
    pub restored: bool,
}

/// `connect` — client→tunnel request to bind to a `tunnel_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connect {
    pub tunnel_id: String,
    pub auth_key: String,
    pub device_id: String,
}

/// `connected`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connected {
    pub tunnel_id: String,
}

/// `connection.workstation_online` / `connection.workstation_offline`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStateChange {
    pub tunnel_id: String,
}

// ---- Session management -------------------------------------------------

/// `supervisor.list_sessions` has no payload; `supervisor.create_session`:
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSession {
    #[serde(rename = "type")]
    pub session_type: CreateSessionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateSessionType {
    Terminal,
    Agent,
}

/// `supervisor.terminate_session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminateSession {
    pub session_id: String,
}

/// `session.created` (server→)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreated {
    #[serde(flatten)]
    pub session: Session,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_config: Option<TerminalConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    pub buffer_size: usize,
}

/// `session.terminated` (server→)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTerminated {
    pub session_id: String,
}

// ---- Agent & supervisor --------------------------------------------------

/// `supervisor.command` / `session.execute`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Execute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub tts_enabled: bool,
}

/// `supervisor.cancel` / `session.cancel`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cancel {}

/// `supervisor.clear_context`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearContext {}

/// `supervisor.context_cleared` (server→)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextCleared {}

/// `supervisor.output` / `session.output` (server→)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub content_type: String,
    pub content_blocks: Vec<ContentBlock>,
    pub is_complete: bool,
}

/// `supervisor.user_message` (server→, fan-out to every device)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: String,
    pub from_device_id: String,
}

/// `supervisor.transcription` / `session.transcription` (server→)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub message_id: String,
}

/// `supervisor.voice_output` / `session.voice_output` (server→)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceOutput {
    pub audio: String,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

// ---- Terminal ------------------------------------------------------------

/// `session.input`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInput {
    pub data: String,
}

/// `session.resize`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionResize {
    pub cols: u16,
    pub rows: u16,
}

/// `session.resized` (server→)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResized {
    pub success: bool,
    pub cols: u16,
    pub rows: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `session.subscribe`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSubscribe {
    pub session_id: String,
}

/// `session.subscribed` (server→) — the type-aware snapshot varies by
/// session kind; `kind` mirrors [`SessionType`]'s tag so clients can match
/// without a second round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "session_type", rename_all = "snake_case")]
pub enum SessionSubscribed {
    Terminal { is_master: bool, cols: u16, rows: u16 },
    Agent {
        history: Vec<crate::messages::AgentHistoryRecord>,
        is_executing: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_streaming_blocks: Option<Vec<ContentBlock>>,
    },
}

/// `session.unsubscribe`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUnsubscribe {
    pub session_id: String,
}

/// `session.unsubscribed` (server→)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUnsubscribed {
    pub session_id: String,
}

/// `session.replay`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionReplay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_sequence: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// `session.replay.data` (server→)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReplayData {
    pub records: Vec<OutputRecord>,
    pub first_sequence: u64,
    pub last_sequence: u64,
    pub current_sequence: u64,
    pub has_more: bool,
}

/// `session.pty_output` (server→) — a single live PTY output chunk, added as
/// its own catalog entry alongside `session.replay.data` rather than
/// overloading `session.output`'s `content_blocks` shape, which has no block
/// kind that fits a raw byte chunk (see DESIGN.md's open question
/// resolutions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtyOutput {
    #[serde(flatten)]
    pub record: OutputRecord,
}

/// One buffered PTY output record, addressable by `sequence` for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    pub sequence: u64,
    pub timestamp: u64,
    pub content: String,
}

/// One turn in an agent/supervisor session's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHistoryRecord {
    pub role: HistoryRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_blocks: Option<Vec<ContentBlock>>,
    pub sequence: u64,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    User,
    Assistant,
}

// ---- Audio ----------------------------------------------------------------

/// `audio.request`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioRequest {
    pub message_id: String,
    pub audio_type: String,
}

/// `audio.response` (server→)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AudioResponse {
    Found { audio: String },
    NotFound { error: String },
}

impl CreateSession {
    pub fn to_session_type(&self, agent: Option<String>) -> SessionType {
        match self.session_type {
            CreateSessionType::Terminal => SessionType::Terminal,
            CreateSessionType::Agent => SessionType::Agent { agent: agent.unwrap_or_default(), model: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_defaults_tts_to_false() {
        let execute: Execute = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert!(!execute.tts_enabled);
        assert_eq!(execute.text.as_deref(), Some("hi"));
    }

    #[test]
    fn session_resized_not_master_has_reason() {
        let resized = SessionResized { success: false, cols: 80, rows: 24, reason: Some("not_master".into()) };
        let json = serde_json::to_string(&resized).unwrap();
        assert!(json.contains("not_master"));
    }

    #[test]
    fn audio_response_is_untagged_either_shape() {
        let found: AudioResponse = serde_json::from_str(r#"{"audio":"abc"}"#).unwrap();
        assert!(matches!(found, AudioResponse::Found { .. }));
        let missing: AudioResponse = serde_json::from_str(r#"{"error":"not found"}"#).unwrap();
        assert!(matches!(missing, AudioResponse::NotFound { .. }));
    }

    #[test]
    fn subscribed_snapshot_tags_by_session_type() {
        let snap = SessionSubscribed::Terminal { is_master: true, cols: 80, rows: 24 };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"session_type\":\"terminal\""));
    }
}
