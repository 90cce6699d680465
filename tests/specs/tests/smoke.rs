// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke test: a real `tiflis-tunnel` and a real
//! `tiflis-workstation` process, with a plain WebSocket client standing in
//! for a roaming device, driving one terminal session from creation
//! through live PTY output (spec §8's "create a session, type into it, see
//! the output" scenario).

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::MaybeTlsStream;

use tiflis_protocol::messages::{Connect, CreateSession, CreateSessionType, SessionInput};
use tiflis_protocol::Envelope;
use tiflis_specs::{TunnelProcess, WorkstationProcess};

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsTx = SplitSink<WsStream, WsMessage>;
type WsRx = SplitStream<WsStream>;

const TIMEOUT: Duration = Duration::from_secs(15);
const REGISTRATION_KEY: &str = "registration-key-at-least-32-chars-long";
const AUTH_KEY: &str = "workstation-auth-key";

async fn ws_connect(url: &str) -> anyhow::Result<(WsTx, WsRx)> {
    let (stream, _) = tokio_tungstenite::connect_async(url).await?;
    Ok(stream.split())
}

async fn ws_send(tx: &mut WsTx, envelope: &Envelope) -> anyhow::Result<()> {
    tx.send(WsMessage::Text(serde_json::to_string(envelope)?.into())).await?;
    Ok(())
}

async fn ws_recv(rx: &mut WsRx) -> anyhow::Result<Envelope> {
    let msg = tokio::time::timeout(TIMEOUT, rx.next()).await?.ok_or_else(|| anyhow::anyhow!("ws stream ended"))??;
    match msg {
        WsMessage::Text(text) => Ok(serde_json::from_str(&text)?),
        other => anyhow::bail!("expected a text frame, got {other:?}"),
    }
}

/// Receive envelopes until `predicate` matches one, or `TIMEOUT` passes.
/// Frames that don't match (e.g. an earlier `session.created` broadcast)
/// are simply skipped.
async fn ws_recv_until(rx: &mut WsRx, predicate: impl Fn(&Envelope) -> bool) -> anyhow::Result<Envelope> {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("deadline passed waiting for a matching envelope");
        }
        let env = ws_recv(rx).await?;
        if predicate(&env) {
            return Ok(env);
        }
    }
}

#[tokio::test]
async fn terminal_session_round_trips_through_tunnel_and_workstation() -> anyhow::Result<()> {
    let tunnel = TunnelProcess::start(REGISTRATION_KEY)?;
    tunnel.wait_healthy(TIMEOUT).await?;

    let workspaces_root = tempfile::tempdir()?;
    let workstation = WorkstationProcess::start(&tunnel.ws_url(), REGISTRATION_KEY, AUTH_KEY, workspaces_root.path())?;
    let tunnel_id = workstation.wait_for_tunnel_id(TIMEOUT).await?;

    let (mut tx, mut rx) = ws_connect(&tunnel.ws_url()).await?;

    let connect = Connect { tunnel_id, auth_key: AUTH_KEY.to_owned(), device_id: "D1".to_owned() };
    ws_send(&mut tx, &Envelope::new("connect").with_payload(&connect)?).await?;
    let connected = ws_recv(&mut rx).await?;
    assert_eq!(connected.kind, "connected");

    // `connect` itself synthesizes an `auth` frame upstream (spec §4.4),
    // so the workstation authenticates this device_id without the client
    // sending one explicitly.
    let auth_reply = ws_recv_until(&mut rx, |e| e.kind == "auth.success" || e.kind == "auth.error").await?;
    assert_eq!(auth_reply.kind, "auth.success");

    let create = CreateSession { session_type: CreateSessionType::Terminal, workspace: None, project: None, worktree: None };
    ws_send(&mut tx, &Envelope::new("supervisor.create_session").with_payload(&create)?).await?;
    let created = ws_recv_until(&mut rx, |e| e.kind == "session.created").await?;
    let session_id = created.payload.as_ref().and_then(|p| p.get("session")).and_then(|s| s.get("session_id")).and_then(|v| v.as_str()).ok_or_else(|| anyhow::anyhow!("missing session_id"))?.to_owned();

    ws_send(&mut tx, &Envelope::new("session.subscribe").with_session(session_id.clone()).with_payload(&tiflis_protocol::messages::SessionSubscribe { session_id: session_id.clone() })?).await?;
    ws_recv_until(&mut rx, |e| e.kind == "session.subscribed").await?;

    let input = SessionInput { data: "echo smoke-marker\n".to_owned() };
    ws_send(&mut tx, &Envelope::new("session.input").with_session(session_id).with_payload(&input)?).await?;

    let output = ws_recv_until(&mut rx, |e| {
        e.kind == "session.pty_output" && e.payload.as_ref().and_then(|p| p.get("content")).and_then(|v| v.as_str()).is_some_and(|c| c.contains("smoke-marker"))
    })
    .await?;
    assert_eq!(output.kind, "session.pty_output");

    let _ = workstation.pid();
    Ok(())
}

#[tokio::test]
async fn connecting_with_the_wrong_auth_key_is_rejected_by_the_workstation() -> anyhow::Result<()> {
    let tunnel = TunnelProcess::start(REGISTRATION_KEY)?;
    tunnel.wait_healthy(TIMEOUT).await?;

    let workspaces_root = tempfile::tempdir()?;
    let workstation = WorkstationProcess::start(&tunnel.ws_url(), REGISTRATION_KEY, AUTH_KEY, workspaces_root.path())?;
    let tunnel_id = workstation.wait_for_tunnel_id(TIMEOUT).await?;

    let (mut tx, mut rx) = ws_connect(&tunnel.ws_url()).await?;
    let connect = Connect { tunnel_id, auth_key: "wrong-key".to_owned(), device_id: "D1".to_owned() };
    ws_send(&mut tx, &Envelope::new("connect").with_payload(&connect)?).await?;
    ws_recv(&mut rx).await?; // connected (the tunnel itself doesn't check auth_key)

    // The `auth` frame `connect` synthesized upstream carries the wrong key
    // straight to the workstation's own check.
    let reply = ws_recv_until(&mut rx, |e| e.kind == "auth.success" || e.kind == "auth.error").await?;
    assert_eq!(reply.kind, "auth.error");

    Ok(())
}
