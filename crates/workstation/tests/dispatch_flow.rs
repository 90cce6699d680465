// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end coverage of `transport::dispatch::dispatch`: one workstation
//! process's worth of state, driven entirely through inbound envelopes the
//! way the tunnel connection would feed them in, asserting on what comes
//! back out `state.outbound`: spawn real state, drive real protocol
//! messages, assert on real replies, exercised in-process against
//! `dispatch` directly rather than over a live socket, since the
//! workstation no longer listens on one.

use std::time::Duration;

use clap::Parser;
use serial_test::serial;
use tokio::sync::mpsc;
use tokio::time::timeout;

use tiflis_protocol::messages::{
    Auth, AuthError, AuthSuccess, CreateSession, CreateSessionType, SessionInput, SessionResize, SessionResized, SessionSubscribe, SessionSubscribed,
    SessionUnsubscribe,
};
use tiflis_protocol::{Envelope, ErrorCode};
use tiflis_workstation::config::WorkstationConfig;
use tiflis_workstation::error::ErrorBody;
use tiflis_workstation::transport::dispatch::dispatch;
use tiflis_workstation::transport::state::WorkstationState;

const AUTH_KEY: &str = "test-auth-key";

fn config() -> WorkstationConfig {
    WorkstationConfig::parse_from(["tiflis-workstation", "--tunnel-url", "wss://example.invalid/ws", "--tunnel-api-key", "k", "--workstation-auth-key", AUTH_KEY])
}

fn config_with_root(root: &std::path::Path) -> WorkstationConfig {
    WorkstationConfig::parse_from([
        "tiflis-workstation",
        "--tunnel-url",
        "wss://example.invalid/ws",
        "--tunnel-api-key",
        "k",
        "--workstation-auth-key",
        AUTH_KEY,
        "--workspaces-root",
        &root.to_string_lossy(),
    ])
}

async fn harness() -> (std::sync::Arc<WorkstationState>, mpsc::Receiver<Envelope>) {
    let (tx, rx) = mpsc::channel(64);
    let state = WorkstationState::new(config(), tx).unwrap();
    (state, rx)
}

async fn next(rx: &mut mpsc::Receiver<Envelope>) -> Envelope {
    timeout(Duration::from_secs(5), rx.recv()).await.expect("timed out waiting for outbound envelope").expect("outbound channel closed")
}

async fn authenticate(state: &std::sync::Arc<WorkstationState>, rx: &mut mpsc::Receiver<Envelope>, device_id: &str) {
    let auth = Envelope::new("auth").with_payload(&Auth { auth_key: AUTH_KEY.to_owned(), device_id: device_id.to_owned() }).unwrap().with_device(device_id.to_owned());
    dispatch(state, auth).await;
    let reply = next(rx).await;
    assert_eq!(reply.kind, "auth.success");
}

#[tokio::test]
async fn auth_rejects_wrong_key_and_accepts_right_one() {
    let (state, mut rx) = harness().await;

    let bad = Envelope::new("auth").with_payload(&Auth { auth_key: "wrong".to_owned(), device_id: "D1".to_owned() }).unwrap().with_device("D1".to_owned());
    dispatch(&state, bad).await;
    let reply = next(&mut rx).await;
    assert_eq!(reply.kind, "auth.error");
    let body: AuthError = reply.payload_as().unwrap();
    assert_eq!(body.code, ErrorCode::InvalidAuthKey.as_str());

    let good = Envelope::new("auth").with_payload(&Auth { auth_key: AUTH_KEY.to_owned(), device_id: "D1".to_owned() }).unwrap().with_device("D1".to_owned());
    dispatch(&state, good).await;
    let reply = next(&mut rx).await;
    assert_eq!(reply.kind, "auth.success");
    let body: AuthSuccess = reply.payload_as().unwrap();
    assert_eq!(body.device_id, "D1");
}

#[tokio::test]
async fn unauthenticated_device_is_rejected_before_reaching_a_handler() {
    let (state, mut rx) = harness().await;

    let input = Envelope::new("session.input").with_session("s1").with_payload(&SessionInput { data: "ls\n".to_owned() }).unwrap().with_device("D1".to_owned());
    dispatch(&state, input).await;
    let reply = next(&mut rx).await;
    assert_eq!(reply.kind, "error");
    let body: ErrorBody = reply.payload_as().unwrap();
    assert_eq!(body.code, ErrorCode::InvalidAuthKey.as_str());
}

#[tokio::test]
async fn frame_without_device_id_is_rejected_as_invalid_payload() {
    let (state, mut rx) = harness().await;

    dispatch(&state, Envelope::new("heartbeat")).await;
    let reply = next(&mut rx).await;
    assert_eq!(reply.kind, "error");
    let body: ErrorBody = reply.payload_as().unwrap();
    assert_eq!(body.code, ErrorCode::InvalidPayload.as_str());
}

#[tokio::test]
async fn subscribe_to_unknown_session_returns_session_not_found() {
    let (state, mut rx) = harness().await;
    authenticate(&state, &mut rx, "D1").await;

    let subscribe = Envelope::new("session.subscribe").with_payload(&SessionSubscribe { session_id: "nope".to_owned() }).unwrap().with_device("D1".to_owned());
    dispatch(&state, subscribe).await;
    let reply = next(&mut rx).await;
    assert_eq!(reply.kind, "error");
    let body: ErrorBody = reply.payload_as().unwrap();
    assert_eq!(body.code, ErrorCode::SessionNotFound.as_str());
}

#[tokio::test]
async fn subscribe_to_supervisor_returns_an_agent_snapshot() {
    let (state, mut rx) = harness().await;
    authenticate(&state, &mut rx, "D1").await;

    let subscribe = Envelope::new("session.subscribe").with_payload(&SessionSubscribe { session_id: "supervisor".to_owned() }).unwrap().with_device("D1".to_owned());
    dispatch(&state, subscribe).await;
    let reply = next(&mut rx).await;
    assert_eq!(reply.kind, "session.subscribed");
    let body: SessionSubscribed = reply.payload_as().unwrap();
    match body {
        SessionSubscribed::Agent { history, is_executing, current_streaming_blocks } => {
            assert!(history.is_empty());
            assert!(!is_executing);
            assert!(current_streaming_blocks.is_none());
        }
        other => panic!("expected an agent snapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn terminal_subscribers_elect_fifo_master_and_only_master_may_resize() {
    let (state, mut rx) = harness().await;
    authenticate(&state, &mut rx, "D1").await;
    authenticate(&state, &mut rx, "D2").await;

    let create = Envelope::new("supervisor.create_session")
        .with_payload(&CreateSession { session_type: CreateSessionType::Terminal, workspace: None, project: None, worktree: None })
        .unwrap()
        .with_device("D1".to_owned());
    dispatch(&state, create).await;
    let created = next(&mut rx).await;
    assert_eq!(created.kind, "session.created");
    let session_id = created.payload.as_ref().and_then(|p| p.get("session")).and_then(|s| s.get("session_id")).and_then(|v| v.as_str()).unwrap().to_owned();

    let subscribe_d1 = Envelope::new("session.subscribe").with_payload(&SessionSubscribe { session_id: session_id.clone() }).unwrap().with_device("D1".to_owned());
    dispatch(&state, subscribe_d1).await;
    let reply = next(&mut rx).await;
    match reply.payload_as::<SessionSubscribed>().unwrap() {
        SessionSubscribed::Terminal { is_master, .. } => assert!(is_master),
        other => panic!("expected a terminal snapshot, got {other:?}"),
    }

    let subscribe_d2 = Envelope::new("session.subscribe").with_payload(&SessionSubscribe { session_id: session_id.clone() }).unwrap().with_device("D2".to_owned());
    dispatch(&state, subscribe_d2).await;
    let reply = next(&mut rx).await;
    match reply.payload_as::<SessionSubscribed>().unwrap() {
        SessionSubscribed::Terminal { is_master, .. } => assert!(!is_master),
        other => panic!("expected a terminal snapshot, got {other:?}"),
    }

    // D2 is not master: a resize request is acknowledged but rejected.
    let resize_d2 = Envelope::new("session.resize").with_session(session_id.clone()).with_payload(&SessionResize { cols: 100, rows: 40 }).unwrap().with_device("D2".to_owned());
    dispatch(&state, resize_d2).await;
    let reply = next(&mut rx).await;
    assert_eq!(reply.kind, "session.resized");
    let body: SessionResized = reply.payload_as().unwrap();
    assert!(!body.success);
    assert_eq!(body.reason.as_deref(), Some("not_master"));

    // D1 is master: the clamp law floors undersized dimensions, and the
    // result broadcasts with no device stamped.
    let resize_d1 = Envelope::new("session.resize").with_session(session_id.clone()).with_payload(&SessionResize { cols: 10, rows: 5 }).unwrap().with_device("D1".to_owned());
    dispatch(&state, resize_d1).await;
    let reply = next(&mut rx).await;
    assert_eq!(reply.kind, "session.resized");
    assert!(reply.device_id.is_none());
    let body: SessionResized = reply.payload_as().unwrap();
    assert!(body.success);
    assert_eq!((body.cols, body.rows), (40, 24));

    // D1 leaves: D2 is promoted and told its new terminal size.
    let unsubscribe_d1 = Envelope::new("session.unsubscribe").with_payload(&SessionUnsubscribe { session_id: session_id.clone() }).unwrap().with_device("D1".to_owned());
    dispatch(&state, unsubscribe_d1).await;
    let ack = next(&mut rx).await;
    assert_eq!(ack.kind, "session.unsubscribed");
    let promoted = next(&mut rx).await;
    assert_eq!(promoted.kind, "session.resized");
    assert_eq!(promoted.device_id.as_deref(), Some("D2"));
}

#[tokio::test]
#[serial]
async fn execute_rejects_a_second_call_while_one_is_already_running() {
    let workspaces_root = tempfile::tempdir().unwrap();
    std::fs::create_dir(workspaces_root.path().join("dispatchflowslow")).unwrap();

    std::env::set_var("AGENT_ALIAS_DISPATCHFLOWSLOW", "sleep 2");
    let (tx, mut rx) = mpsc::channel(64);
    let state = WorkstationState::new(config_with_root(workspaces_root.path()), tx).unwrap();
    std::env::remove_var("AGENT_ALIAS_DISPATCHFLOWSLOW");

    authenticate(&state, &mut rx, "D1").await;

    let create = Envelope::new("supervisor.create_session")
        .with_payload(&CreateSession { session_type: CreateSessionType::Agent, workspace: Some("dispatchflowslow".to_owned()), project: None, worktree: None })
        .unwrap()
        .with_device("D1".to_owned());
    dispatch(&state, create).await;
    let created = next(&mut rx).await;
    assert_eq!(created.kind, "session.created");
    let session_id = created.payload.as_ref().and_then(|p| p.get("session")).and_then(|s| s.get("session_id")).and_then(|v| v.as_str()).unwrap().to_owned();

    let execute = tiflis_protocol::messages::Execute { text: Some("go slow".to_owned()), audio: None, audio_format: None, message_id: None, language: None, tts_enabled: false };
    let first = Envelope::new("session.execute").with_session(session_id.clone()).with_id("req-1").with_payload(&execute).unwrap().with_device("D1".to_owned());
    dispatch(&state, first).await;
    let accepted = next(&mut rx).await;
    assert_eq!(accepted.kind, "response");
    assert_eq!(accepted.payload.as_ref().and_then(|p| p.get("accepted")).and_then(|v| v.as_bool()), Some(true));

    // drain the user_message broadcast before the second attempt races it
    let user_message = next(&mut rx).await;
    assert_eq!(user_message.kind, "supervisor.user_message");

    let second = Envelope::new("session.execute").with_session(session_id).with_id("req-2").with_payload(&execute).unwrap().with_device("D1".to_owned());
    dispatch(&state, second).await;
    let reply = next(&mut rx).await;
    assert_eq!(reply.kind, "error");
    let body: ErrorBody = reply.payload_as().unwrap();
    assert_eq!(body.code, ErrorCode::SessionBusy.as_str());
}
