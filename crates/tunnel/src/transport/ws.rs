// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single WebSocket endpoint serving both roles: the first envelope on the
//! socket determines whether it's a workstation (`workstation.register`) or
//! a client (`connect`). A split-socket/select loop dispatching on payload
//! `type` instead of a fixed per-session route, since one endpoint here
//! serves two very different kinds of peer.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use tiflis_protocol::messages::{Auth, Connect, Connected, Ping, WorkstationRegister, WorkstationRegistered};
use tiflis_protocol::{Envelope, ErrorCode};

use crate::heartbeat::HeartbeatTracker;
use crate::state::{ClientTransport, TunnelState};

const SOCKET_BUFFER: usize = 64;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Constant-time comparison, used for the registration api key and
/// workstation-issued auth keys.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

pub async fn ws_handler(State(state): State<Arc<TunnelState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_envelope(tx: &mut WsSink, envelope: &Envelope) -> Result<(), ()> {
    match serde_json::to_string(envelope) {
        Ok(text) => tx.send(Message::Text(text.into())).await.map_err(|_| ()),
        Err(_) => Err(()),
    }
}

async fn send_error(tx: &mut WsSink, code: ErrorCode, message: &str, id: Option<String>) {
    let mut env = Envelope::new("error").with_payload(&code.to_error_body(message)).unwrap_or_else(|_| Envelope::new("error"));
    if let Some(id) = id {
        env = env.with_id(id);
    }
    let _ = send_envelope(tx, &env).await;
}

fn pong_envelope() -> Envelope {
    Envelope::new("pong").with_payload(&Ping { timestamp: tiflis_protocol::epoch_ms() }).unwrap_or_else(|_| Envelope::new("pong"))
}

async fn handle_socket(socket: WebSocket, state: Arc<TunnelState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut heartbeat = HeartbeatTracker::new();

    let first = loop {
        tokio::select! {
            biased;

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => break Some(text),
                Some(Ok(Message::Close(_))) | None => break None,
                Some(Ok(_)) => continue,
                Some(Err(_)) => break None,
            },

            _ = tokio::time::sleep(heartbeat.time_until_stale()) => {
                if heartbeat.is_stale() {
                    break None;
                }
            }
        }
    };

    let Some(first) = first else { return };

    let Ok(envelope) = serde_json::from_str::<Envelope>(&first) else {
        send_error(&mut ws_tx, ErrorCode::InvalidPayload, "malformed envelope", None).await;
        return;
    };
    heartbeat.touch();

    match envelope.kind.as_str() {
        "workstation.register" => handle_workstation(envelope, ws_tx, ws_rx, state, heartbeat).await,
        "connect" => handle_client(envelope, ws_tx, ws_rx, state, heartbeat).await,
        other => {
            warn!(kind = %other, "first frame on socket was neither workstation.register nor connect");
            send_error(&mut ws_tx, ErrorCode::InvalidPayload, "first message must be workstation.register or connect", envelope.id).await;
        }
    }
}

/// Drives a registered workstation's socket until it closes or goes stale.
async fn handle_workstation(envelope: Envelope, mut ws_tx: WsSink, mut ws_rx: WsStream, state: Arc<TunnelState>, mut heartbeat: HeartbeatTracker) {
    let register: WorkstationRegister = match envelope.payload_as() {
        Ok(r) => r,
        Err(_) => {
            send_error(&mut ws_tx, ErrorCode::InvalidPayload, "invalid workstation.register payload", envelope.id).await;
            return;
        }
    };

    if !constant_time_eq(&register.api_key, &state.config.registration_api_key) {
        send_error(&mut ws_tx, ErrorCode::InvalidApiKey, "invalid api key", envelope.id).await;
        return;
    }

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(SOCKET_BUFFER);
    let (tunnel_id, restored) = state.register_workstation(register.previous_tunnel_id.as_deref(), &register.name, outbound_tx).await;
    info!(%tunnel_id, restored, "workstation registered");

    let registered = WorkstationRegistered { tunnel_id: tunnel_id.clone(), public_url: state.config.public_url(), restored };
    let reply = Envelope::new("workstation.registered").with_payload(&registered).unwrap_or_else(|_| Envelope::new("workstation.registered"));
    if send_envelope(&mut ws_tx, &reply).await.is_err() {
        state.unregister_workstation(&tunnel_id).await;
        return;
    }

    loop {
        tokio::select! {
            biased;

            _ = tokio::time::sleep(heartbeat.time_until_stale()) => {
                if heartbeat.is_stale() {
                    warn!(%tunnel_id, "workstation connection stale, closing");
                    break;
                }
            }

            outbound = outbound_rx.recv() => match outbound {
                Some(env) => if send_envelope(&mut ws_tx, &env).await.is_err() { break },
                None => break,
            },

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    heartbeat.touch();
                    let Ok(env) = serde_json::from_str::<Envelope>(&text) else { continue };
                    if env.kind == "ping" {
                        if send_envelope(&mut ws_tx, &pong_envelope()).await.is_err() { break }
                    } else {
                        state.fanout_to_clients(&tunnel_id, env).await;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    state.unregister_workstation(&tunnel_id).await;
}

/// Drives a bound client's socket until it closes, goes stale, or trips its
/// rate limit.
async fn handle_client(envelope: Envelope, mut ws_tx: WsSink, mut ws_rx: WsStream, state: Arc<TunnelState>, mut heartbeat: HeartbeatTracker) {
    let connect: Connect = match envelope.payload_as() {
        Ok(c) => c,
        Err(_) => {
            send_error(&mut ws_tx, ErrorCode::InvalidPayload, "invalid connect payload", envelope.id).await;
            return;
        }
    };

    if !state.tunnel_exists(&connect.tunnel_id).await {
        send_error(&mut ws_tx, ErrorCode::TunnelNotFound, "unknown tunnel_id", envelope.id).await;
        return;
    }

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(SOCKET_BUFFER);
    let Some(client_id) = state.bind_client(&connect.tunnel_id, connect.device_id.clone(), ClientTransport::Socket(outbound_tx)).await else {
        send_error(&mut ws_tx, ErrorCode::TunnelNotFound, "tunnel disappeared during connect", envelope.id).await;
        return;
    };

    let connected = Connected { tunnel_id: connect.tunnel_id.clone() };
    let reply = Envelope::new("connected").with_payload(&connected).unwrap_or_else(|_| Envelope::new("connected"));
    if send_envelope(&mut ws_tx, &reply).await.is_err() {
        state.unbind_client(&connect.tunnel_id, client_id).await;
        return;
    }

    // Synthesize the `auth` frame the long-poll adapter's `/connect` also
    // forwards upstream, so both transports authenticate the same way
    // against the workstation's own device registry.
    let auth = Auth { auth_key: connect.auth_key.clone(), device_id: connect.device_id.clone() };
    if let Ok(env) = Envelope::new("auth").with_payload(&auth) {
        state.forward_to_workstation(&connect.tunnel_id, env, &connect.device_id).await;
    }

    loop {
        tokio::select! {
            biased;

            _ = tokio::time::sleep(heartbeat.time_until_stale()) => {
                if heartbeat.is_stale() {
                    warn!(tunnel_id = %connect.tunnel_id, device_id = %connect.device_id, "client connection stale, closing");
                    break;
                }
            }

            outbound = outbound_rx.recv() => match outbound {
                Some(env) => if send_envelope(&mut ws_tx, &env).await.is_err() { break },
                None => break,
            },

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    heartbeat.touch();
                    let Ok(env) = serde_json::from_str::<Envelope>(&text) else { continue };

                    if env.kind == "ping" {
                        if send_envelope(&mut ws_tx, &pong_envelope()).await.is_err() { break }
                        continue;
                    }

                    if !state.check_rate_limit(&connect.tunnel_id, client_id).await {
                        warn!(tunnel_id = %connect.tunnel_id, device_id = %connect.device_id, "client exceeded rate limit, closing");
                        break;
                    }

                    if !state.forward_to_workstation(&connect.tunnel_id, env, &connect.device_id).await {
                        send_error(&mut ws_tx, ErrorCode::WorkstationOffline, "workstation is not connected", None).await;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    state.unbind_client(&connect.tunnel_id, client_id).await;
}
