// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Envelope dispatch: the single point where an inbound frame's `type` is
//! matched against the message catalog and turned into session actor
//! commands / registry mutations / outbound replies: a match-on-`type` loop
//! generalized from a single session to the full catalog.

use std::sync::Arc;

use tiflis_protocol::messages::{
    Auth, AuthError, AuthSuccess, Cancel, ClearContext, CreateSession, Execute, SessionInput, SessionReplay, SessionResize, SessionResized, SessionSubscribe,
    SessionSubscribed, SessionUnsubscribe, SessionUnsubscribed, TerminateSession,
};
use tiflis_protocol::{epoch_ms, ErrorCode, Envelope, Session, SessionType};

use super::state::WorkstationState;
use crate::auth::validate_auth_key;
use crate::error::error_envelope;
use crate::session::agent::{self, AgentCommand, AgentConfig};
use crate::session::registry::{SessionHandle, SessionKind};
use crate::session::supervisor::SUPERVISOR_SESSION_ID;
use crate::session::terminal;

/// Handle one inbound envelope. `device_id` is the id the tunnel stamped on
/// the frame; it's `None` only for frames that somehow arrive without
/// tunnel stamping, which are rejected as `INVALID_PAYLOAD`.
pub async fn dispatch(state: &Arc<WorkstationState>, envelope: Envelope) {
    let Some(device_id) = envelope.device_id.clone() else {
        let _ = state.outbound.send(error_envelope(ErrorCode::InvalidPayload, "frame missing device_id", envelope.id.as_deref())).await;
        return;
    };

    if envelope.kind != "auth" && !state.devices.is_authenticated(&device_id).await {
        let reply = error_envelope(ErrorCode::InvalidAuthKey, "device is not authenticated", envelope.id.as_deref()).with_device(device_id);
        let _ = state.outbound.send(reply).await;
        return;
    }

    match envelope.kind.as_str() {
        "auth" => handle_auth(state, envelope, device_id).await,
        "heartbeat" => handle_heartbeat(state, envelope, device_id).await,
        "sync" => handle_sync(state, envelope, device_id).await,
        "supervisor.list_sessions" => handle_list_sessions(state, envelope, device_id).await,
        "supervisor.create_session" => handle_create_session(state, envelope, device_id).await,
        "supervisor.terminate_session" => handle_terminate_session(state, envelope, device_id).await,
        "session.subscribe" => handle_subscribe(state, envelope, device_id).await,
        "session.unsubscribe" => handle_unsubscribe(state, envelope, device_id).await,
        "session.input" => handle_input(state, envelope, device_id).await,
        "session.resize" => handle_resize(state, envelope, device_id).await,
        "session.replay" => handle_replay(state, envelope, device_id).await,
        "supervisor.command" | "session.execute" => handle_execute(state, envelope, device_id).await,
        "supervisor.cancel" | "session.cancel" => handle_cancel(state, envelope, device_id).await,
        "supervisor.clear_context" => handle_clear_context(state, envelope, device_id).await,
        "audio.request" => handle_audio_request(state, envelope, device_id).await,
        other => {
            let reply = error_envelope(ErrorCode::InvalidPayload, format!("unknown message type `{other}`"), envelope.id.as_deref()).with_device(device_id);
            let _ = state.outbound.send(reply).await;
        }
    }
}

/// The session a catalog entry with a bare `session.*` type addresses:
/// `envelope.session_id`, or the supervisor for `supervisor.*` types.
fn target_session_id(envelope: &Envelope) -> String {
    envelope.session_id.clone().unwrap_or_else(|| SUPERVISOR_SESSION_ID.to_owned())
}

async fn handle_auth(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let Ok(auth) = envelope.payload_as::<Auth>() else {
        let _ = state.outbound.send(error_envelope(ErrorCode::InvalidPayload, "malformed auth", envelope.id.as_deref()).with_device(device_id)).await;
        return;
    };

    if !validate_auth_key(&auth.auth_key, &state.config.workstation_auth_key) {
        let err = AuthError { code: ErrorCode::InvalidAuthKey.as_str().to_owned(), message: "invalid auth_key".to_owned() };
        let env = Envelope::new("auth.error").with_payload(&err).unwrap_or_else(|_| Envelope::new("auth.error")).with_device(device_id);
        let _ = state.outbound.send(env).await;
        return;
    }

    state.devices.authenticate(&auth.device_id, epoch_ms()).await;
    let live = state.registry.session_ids().await;
    let restored = state.devices.subscriptions_for(&auth.device_id, &live).await;

    let success = AuthSuccess {
        device_id: auth.device_id.clone(),
        workstation_name: state.config.workstation_name.clone(),
        workstation_version: env!("CARGO_PKG_VERSION").to_owned(),
        protocol_version: tiflis_protocol::PROTOCOL_VERSION.to_owned(),
        workspaces_root: state.config.workspaces_root.clone(),
        restored_subscriptions: restored,
    };
    if let Ok(env) = Envelope::new("auth.success").with_payload(&success) {
        let _ = state.outbound.send(env.with_device(auth.device_id)).await;
    }
}

async fn handle_heartbeat(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let Ok(heartbeat) = envelope.payload_as() else { return };
    let ack = crate::heartbeat::build_ack(&heartbeat, state.uptime_ms());
    let _ = state.outbound.send(ack.with_device(device_id)).await;
}

async fn handle_sync(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let snapshot = crate::sync::build(&state.registry, &state.supervisor, &state.devices, &device_id).await;
    if let Ok(env) = Envelope::new("sync.state").with_payload(&snapshot) {
        let mut env = env.with_device(device_id);
        if let Some(id) = envelope.id {
            env = env.with_id(id);
        }
        let _ = state.outbound.send(env).await;
    }
}

async fn handle_list_sessions(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let sessions = state.registry.list().await;
    let body = serde_json::json!({ "sessions": sessions });
    let mut env = Envelope::new("response").with_device(device_id);
    if let Some(id) = envelope.id {
        env = env.with_id(id);
    }
    env.payload = Some(body);
    let _ = state.outbound.send(env).await;
}

async fn handle_create_session(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let Ok(create) = envelope.payload_as::<CreateSession>() else {
        let _ = state.outbound.send(error_envelope(ErrorCode::InvalidPayload, "malformed supervisor.create_session", envelope.id.as_deref()).with_device(device_id)).await;
        return;
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    let working_dir = resolve_working_dir(&state.config.workspaces_root, &create.workspace, &create.project, &create.worktree);

    let (kind, session_type, terminal_config) = match create.session_type {
        tiflis_protocol::messages::CreateSessionType::Terminal => {
            let handle = match terminal::spawn(session_id.clone(), default_shell_command(), 80, 24, state.config.default_buffer_size, Arc::clone(&state.bus), state.outbound.clone()) {
                Ok(h) => h,
                Err(err) => {
                    let _ = state.outbound.send(error_envelope(ErrorCode::Internal, format!("failed to start terminal: {err}"), envelope.id.as_deref()).with_device(device_id)).await;
                    return;
                }
            };
            (SessionKind::Terminal(handle), SessionType::Terminal, Some(tiflis_protocol::messages::TerminalConfig { buffer_size: state.config.default_buffer_size }))
        }
        tiflis_protocol::messages::CreateSessionType::Agent => {
            let agent_name = create.workspace.clone().unwrap_or_default();
            let command = state.agent_command(&agent_name);
            let config = AgentConfig { agent_command: command, cwd: working_dir.clone(), stt: state.stt.clone(), tts: state.tts.clone(), audio: Some(Arc::clone(&state.audio)) };
            let handle = agent::spawn(session_id.clone(), config, Arc::clone(&state.bus), state.outbound.clone());
            (SessionKind::Agent(handle), SessionType::Agent { agent: agent_name, model: None }, None)
        }
    };

    let meta = Session::new(session_id.clone(), session_type, working_dir, epoch_ms());
    state.registry.insert(session_id.clone(), SessionHandle::new(kind, meta.clone())).await;
    state.supervisor.add_member(session_id).await;

    let created = tiflis_protocol::messages::SessionCreated { session: meta, terminal_config };
    if let Ok(env) = Envelope::new("session.created").with_payload(&created) {
        let _ = state.outbound.send(env).await; // broadcast: every device should learn of the new session
    }
}

fn default_shell_command() -> Vec<String> {
    vec![std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_owned())]
}

fn resolve_working_dir(root: &str, workspace: &Option<String>, project: &Option<String>, worktree: &Option<String>) -> String {
    let mut path = std::path::PathBuf::from(root);
    if let Some(workspace) = workspace {
        path.push(workspace);
    }
    if let Some(project) = project {
        path.push(project);
    }
    if let Some(worktree) = worktree {
        path.push(worktree);
    }
    path.to_string_lossy().into_owned()
}

async fn handle_terminate_session(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let Ok(req) = envelope.payload_as::<TerminateSession>() else { return };
    if let Some(handle) = state.registry.remove(&req.session_id).await {
        handle.terminate().await;
        state.supervisor.remove_member(&req.session_id).await;
        state.devices.remove_session_everywhere(&req.session_id).await;
    } else {
        let _ = state.outbound.send(error_envelope(ErrorCode::SessionNotFound, "no such session", envelope.id.as_deref()).with_device(device_id)).await;
    }
}

async fn handle_subscribe(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let Ok(req) = envelope.payload_as::<SessionSubscribe>() else { return };
    let request_id = envelope.id;

    // The supervisor isn't a member in `registry` — it lives on
    // `state.supervisor` for the lifetime of the process — so subscribing to
    // it is handled directly rather than through a registry lookup.
    if req.session_id == SUPERVISOR_SESSION_ID {
        state.devices.record_subscription(&device_id, &req.session_id).await;
        state.bus.subscribe(&req.session_id, &device_id).await;
        let snap = state.supervisor.handle.snapshot().await;
        let snapshot = SessionSubscribed::Agent { history: snap.history, is_executing: snap.is_executing, current_streaming_blocks: snap.current_streaming_blocks };
        if let Ok(env) = Envelope::new("session.subscribed").with_session(req.session_id).with_payload(&snapshot) {
            let mut env = env.with_device(device_id);
            if let Some(id) = request_id {
                env = env.with_id(id);
            }
            let _ = state.outbound.send(env).await;
        }
        return;
    }

    let Some(handle) = state.registry.get(&req.session_id).await else {
        let _ = state.outbound.send(error_envelope(ErrorCode::SessionNotFound, "no such session", request_id.as_deref()).with_device(device_id)).await;
        return;
    };

    state.devices.record_subscription(&device_id, &req.session_id).await;

    let snapshot = if let Some(terminal) = handle.as_terminal() {
        let is_master = state.bus.subscribe(&req.session_id, &device_id).await;
        let (cols, rows) = terminal.size();
        SessionSubscribed::Terminal { is_master, cols, rows }
    } else if let Some(agent) = handle.as_agent() {
        state.bus.subscribe(&req.session_id, &device_id).await;
        let snap = agent.snapshot().await;
        SessionSubscribed::Agent { history: snap.history, is_executing: snap.is_executing, current_streaming_blocks: snap.current_streaming_blocks }
    } else {
        return;
    };

    if let Ok(env) = Envelope::new("session.subscribed").with_session(req.session_id).with_payload(&snapshot) {
        let mut env = env.with_device(device_id);
        if let Some(id) = request_id {
            env = env.with_id(id);
        }
        let _ = state.outbound.send(env).await;
    }
}

async fn handle_unsubscribe(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let Ok(req) = envelope.payload_as::<SessionUnsubscribe>() else { return };
    let request_id = envelope.id;
    state.devices.remove_subscription(&device_id, &req.session_id).await;
    let promoted = state.bus.unsubscribe(&req.session_id, &device_id).await;

    let unsub = SessionUnsubscribed { session_id: req.session_id.clone() };
    if let Ok(env) = Envelope::new("session.unsubscribed").with_session(req.session_id.clone()).with_payload(&unsub) {
        let mut env = env.with_device(device_id);
        if let Some(id) = request_id.clone() {
            env = env.with_id(id);
        }
        let _ = state.outbound.send(env).await;
    }

    if let Some(new_master) = promoted {
        if let Some(handle) = state.registry.get(&req.session_id).await {
            if let Some(terminal) = handle.as_terminal() {
                let (cols, rows) = terminal.size();
                let resized = SessionResized { success: true, cols, rows, reason: None };
                if let Ok(env) = Envelope::new("session.resized").with_session(req.session_id).with_payload(&resized) {
                    let mut env = env.with_device(new_master);
                    if let Some(id) = request_id {
                        env = env.with_id(id);
                    }
                    let _ = state.outbound.send(env).await;
                }
            }
        }
    }
}

async fn handle_input(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let Ok(req) = envelope.payload_as::<SessionInput>() else { return };
    let session_id = target_session_id(&envelope);
    if let Some(handle) = state.registry.get(&session_id).await {
        if let Some(terminal) = handle.as_terminal() {
            terminal.input(req.data.into_bytes()).await;
        }
    } else {
        let _ = state.outbound.send(error_envelope(ErrorCode::SessionNotFound, "no such session", envelope.id.as_deref()).with_device(device_id)).await;
    }
}

async fn handle_resize(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let Ok(req) = envelope.payload_as::<SessionResize>() else { return };
    let session_id = target_session_id(&envelope);
    let request_id = envelope.id;

    let Some(handle) = state.registry.get(&session_id).await else {
        let _ = state.outbound.send(error_envelope(ErrorCode::SessionNotFound, "no such session", request_id.as_deref()).with_device(device_id)).await;
        return;
    };
    let Some(terminal) = handle.as_terminal() else { return };

    if !state.bus.is_master(&session_id, &device_id).await {
        let (cols, rows) = terminal.size();
        let resized = SessionResized { success: false, cols, rows, reason: Some("not_master".to_owned()) };
        if let Ok(env) = Envelope::new("session.resized").with_session(session_id).with_payload(&resized) {
            let mut env = env.with_device(device_id);
            if let Some(id) = request_id {
                env = env.with_id(id);
            }
            let _ = state.outbound.send(env).await;
        }
        return;
    }

    match terminal.resize(req.cols, req.rows).await {
        Ok((cols, rows)) => {
            let resized = SessionResized { success: true, cols, rows, reason: None };
            // Broadcast: every subscriber (master included) learns the new size.
            if let Ok(env) = Envelope::new("session.resized").with_session(session_id).with_payload(&resized) {
                let mut env = env;
                if let Some(id) = request_id {
                    env = env.with_id(id);
                }
                let _ = state.outbound.send(env).await;
            }
        }
        Err(err) => {
            let _ = state.outbound.send(error_envelope(ErrorCode::Internal, format!("resize failed: {err}"), request_id.as_deref()).with_device(device_id)).await;
        }
    }
}

async fn handle_replay(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let Ok(req) = envelope.payload_as::<SessionReplay>() else { return };
    let session_id = target_session_id(&envelope);
    let request_id = envelope.id;

    let Some(handle) = state.registry.get(&session_id).await else {
        let _ = state.outbound.send(error_envelope(ErrorCode::SessionNotFound, "no such session", request_id.as_deref()).with_device(device_id)).await;
        return;
    };
    let Some(terminal) = handle.as_terminal() else { return };

    match terminal.replay(req.since_sequence, req.since_timestamp, req.limit).await {
        Ok(data) => {
            if let Ok(env) = Envelope::new("session.replay.data").with_session(session_id).with_payload(&data) {
                let mut env = env.with_device(device_id);
                if let Some(id) = request_id {
                    env = env.with_id(id);
                }
                let _ = state.outbound.send(env).await;
            }
        }
        Err(err) => {
            let _ = state.outbound.send(error_envelope(ErrorCode::Internal, format!("replay failed: {err}"), request_id.as_deref()).with_device(device_id)).await;
        }
    }
}

async fn handle_execute(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let Ok(req) = envelope.payload_as::<Execute>() else {
        let _ = state.outbound.send(error_envelope(ErrorCode::InvalidPayload, "malformed execute", envelope.id.as_deref()).with_device(device_id)).await;
        return;
    };
    let session_id = target_session_id(&envelope);

    let agent_handle = if session_id == SUPERVISOR_SESSION_ID {
        Some(state.supervisor.handle.clone())
    } else {
        state.registry.get(&session_id).await.and_then(|h| h.as_agent().cloned())
    };

    let Some(agent_handle) = agent_handle else {
        let _ = state.outbound.send(error_envelope(ErrorCode::SessionNotFound, "no such agent session", envelope.id.as_deref()).with_device(device_id)).await;
        return;
    };

    if agent_handle.is_executing() {
        let _ = state.outbound.send(error_envelope(ErrorCode::SessionBusy, "session is already executing", envelope.id.as_deref()).with_device(device_id)).await;
        return;
    }

    agent_handle
        .execute(AgentCommand::Execute {
            text: req.text,
            audio: req.audio,
            audio_format: req.audio_format,
            language: req.language,
            tts_enabled: req.tts_enabled,
            from_device_id: device_id.clone(),
        })
        .await;

    if let Some(id) = envelope.id {
        let body = serde_json::json!({ "accepted": true });
        let mut env = Envelope::new("response").with_id(id).with_device(device_id);
        env.payload = Some(body);
        let _ = state.outbound.send(env).await;
    }
}

async fn handle_cancel(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let _: Cancel = envelope.payload_as().unwrap_or(Cancel {});
    let session_id = target_session_id(&envelope);

    let agent_handle = if session_id == SUPERVISOR_SESSION_ID {
        Some(state.supervisor.handle.clone())
    } else {
        state.registry.get(&session_id).await.and_then(|h| h.as_agent().cloned())
    };

    // Cancelling a session that isn't executing is a no-op acknowledged with
    // `cancelled:false`, not an error.
    let was_executing = agent_handle.as_ref().is_some_and(|h| h.is_executing());
    if was_executing {
        if let Some(agent_handle) = agent_handle {
            agent_handle.execute(AgentCommand::Cancel).await;
        }
    }

    if let Some(id) = envelope.id {
        let body = serde_json::json!({ "cancelled": was_executing });
        let mut env = Envelope::new("response").with_id(id).with_device(device_id);
        env.payload = Some(body);
        let _ = state.outbound.send(env).await;
    }
}

async fn handle_clear_context(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let _: ClearContext = envelope.payload_as().unwrap_or(ClearContext {});
    state.supervisor.handle.execute(AgentCommand::ClearContext).await;
    let _ = device_id;
    let _ = envelope;
}

async fn handle_audio_request(state: &Arc<WorkstationState>, envelope: Envelope, device_id: String) {
    let Ok(req) = envelope.payload_as::<tiflis_protocol::messages::AudioRequest>() else { return };
    let response = match state.audio.get(&req.message_id, epoch_ms()).await {
        Some(audio_base64) => tiflis_protocol::messages::AudioResponse::Found { audio: audio_base64 },
        None => tiflis_protocol::messages::AudioResponse::NotFound { error: "audio not found or expired".to_owned() },
    };
    if let Ok(env) = Envelope::new("audio.response").with_payload(&response) {
        let mut env = env.with_device(device_id);
        if let Some(id) = envelope.id {
            env = env.with_id(id);
        }
        let _ = state.outbound.send(env).await;
    }
}
