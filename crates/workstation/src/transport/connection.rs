// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound WebSocket connection to the tunnel: the workstation is always
//! the one dialing out, never listening. The connect-register-loop shape
//! and split-socket select loop generalize "upstream bridges to a pod" to
//! "the single outbound link to the tunnel relay"; the transport-level
//! ping/pong pair is the same shape used elsewhere in this tree, except
//! here the workstation is the *nominated pinger*, the inverse of the
//! tunnel's role on the client-facing sockets of that same link.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use tiflis_protocol::messages::{Ping, WorkstationRegister, WorkstationRegistered};
use tiflis_protocol::{epoch_ms, Envelope};

use super::dispatch;
use super::state::WorkstationState;

/// Transport-level ping cadence.
const PING_INTERVAL: Duration = Duration::from_secs(20);
/// No `pong` within this long after a `ping` ⇒ link considered dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(5);

const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Dial the tunnel, register, and serve forever, reconnecting with
/// exponential backoff on every disconnect. Never returns.
pub async fn run(state: Arc<WorkstationState>, mut outbound_rx: mpsc::Receiver<Envelope>) {
    let mut backoff = RECONNECT_MIN;
    let mut previous_tunnel_id: Option<String> = None;

    loop {
        match connect_and_serve(&state, &mut outbound_rx, previous_tunnel_id.clone()).await {
            Ok(tunnel_id) => {
                previous_tunnel_id = Some(tunnel_id);
                backoff = RECONNECT_MIN;
            }
            Err(e) => {
                warn!(err = %e, "tunnel connection failed, retrying");
            }
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(RECONNECT_MAX);
    }
}

/// One connection lifetime: dial, register, then pump frames until the
/// socket closes or goes stale. Returns the `tunnel_id` to reclaim on the
/// next attempt.
async fn connect_and_serve(state: &Arc<WorkstationState>, outbound_rx: &mut mpsc::Receiver<Envelope>, previous_tunnel_id: Option<String>) -> anyhow::Result<String> {
    let (socket, _) = tokio_tungstenite::connect_async(&state.config.tunnel_url).await?;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let register = WorkstationRegister {
        api_key: state.config.tunnel_api_key.clone(),
        name: state.config.workstation_name.clone(),
        auth_key: state.config.workstation_auth_key.clone(),
        previous_tunnel_id,
    };
    let register_env = Envelope::new("workstation.register").with_payload(&register)?;
    ws_tx.send(Message::Text(serde_json::to_string(&register_env)?.into())).await?;

    let reply = ws_rx.next().await.ok_or_else(|| anyhow::anyhow!("tunnel closed socket before registering"))??;
    let Message::Text(text) = reply else {
        anyhow::bail!("expected text frame for workstation.registered");
    };
    let reply_env: Envelope = serde_json::from_str(&text)?;
    if reply_env.kind != "workstation.registered" {
        anyhow::bail!("expected workstation.registered, got `{}`", reply_env.kind);
    }
    let registered: WorkstationRegistered = reply_env.payload_as()?;
    info!(tunnel_id = %registered.tunnel_id, restored = registered.restored, public_url = %registered.public_url, "registered with tunnel");

    let mut last_pong = tokio::time::Instant::now();
    let mut awaiting_pong = false;
    let mut ping_tick = tokio::time::interval(PING_INTERVAL);
    ping_tick.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            biased;

            _ = ping_tick.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    anyhow::bail!("no pong within {:?}, link considered dead", PONG_TIMEOUT);
                }
                let ping = Ping { timestamp: epoch_ms() };
                let env = Envelope::new("ping").with_payload(&ping)?;
                ws_tx.send(Message::Text(serde_json::to_string(&env)?.into())).await?;
                awaiting_pong = true;
            }

            outbound = outbound_rx.recv() => {
                let Some(env) = outbound else { anyhow::bail!("outbound channel closed") };
                ws_tx.send(Message::Text(serde_json::to_string(&env)?.into())).await?;
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(env) = serde_json::from_str::<Envelope>(&text) else { continue };
                        if env.kind == "pong" {
                            last_pong = tokio::time::Instant::now();
                            awaiting_pong = false;
                        } else {
                            dispatch::dispatch(state, env).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => anyhow::bail!("tunnel closed the connection"),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => anyhow::bail!("tunnel socket error: {e}"),
                }
            }
        }
    }
}
