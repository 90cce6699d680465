// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP long-poll adapter: five endpoints standing in for a WebSocket for
//! clients that can't hold one open. One handler per request,
//! `Json`/`Query` extractors in, a typed error response out, backed by the
//! device queue operations in [`crate::longpoll`].

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use tiflis_protocol::messages::Auth;
use tiflis_protocol::{Envelope, ErrorCode};

use crate::error::{to_http_response, ErrorResponse};
use crate::state::TunnelState;

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub tunnel_id: String,
    pub auth_key: String,
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub connected: bool,
}

/// `POST /connect`. Binds a long-poll virtual client and forwards a
/// synthesized `auth` frame upstream, mirroring what the WebSocket `connect`
/// path does for live clients.
pub async fn connect(State(state): State<Arc<TunnelState>>, Json(req): Json<ConnectRequest>) -> Result<Json<ConnectResponse>, ApiError> {
    if !state.tunnel_exists(&req.tunnel_id).await {
        return Err(to_http_response(ErrorCode::TunnelNotFound, "unknown tunnel_id"));
    }

    if state.bind_longpoll_client(&req.tunnel_id, req.device_id.clone()).await.is_none() {
        return Err(to_http_response(ErrorCode::TunnelNotFound, "tunnel disappeared during connect"));
    }

    let auth = Auth { auth_key: req.auth_key, device_id: req.device_id.clone() };
    if let Ok(env) = Envelope::new("auth").with_payload(&auth) {
        state.forward_to_workstation(&req.tunnel_id, env, &req.device_id).await;
    }

    Ok(Json(ConnectResponse { connected: true }))
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub device_id: String,
    pub message: Envelope,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub accepted: bool,
}

/// `POST /command`. Forwards one client→workstation envelope for a device
/// already bound via `/connect`.
pub async fn command(State(state): State<Arc<TunnelState>>, Json(req): Json<CommandRequest>) -> Result<Json<CommandResponse>, ApiError> {
    let Some((tunnel_id, _client_id, queue)) = state.longpoll.lookup(&req.device_id).await else {
        return Err(to_http_response(ErrorCode::TunnelNotFound, "device is not connected"));
    };
    queue.touch().await;

    if !state.is_workstation_online(&tunnel_id).await {
        return Err(to_http_response(ErrorCode::WorkstationOffline, "workstation is not connected"));
    }

    let accepted = state.forward_to_workstation(&tunnel_id, req.message, &req.device_id).await;
    Ok(Json(CommandResponse { accepted }))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub device_id: String,
    #[serde(default)]
    pub since: u64,
    #[serde(default)]
    pub ack: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Envelope>,
    pub current_sequence: u64,
}

/// `GET /messages`. Polls for envelopes queued since `since`, optionally
/// acknowledging (trimming) everything up to `ack` first.
pub async fn messages(State(state): State<Arc<TunnelState>>, Query(q): Query<MessagesQuery>) -> Result<Json<MessagesResponse>, ApiError> {
    let Some((_tunnel_id, _client_id, queue)) = state.longpoll.lookup(&q.device_id).await else {
        return Err(to_http_response(ErrorCode::TunnelNotFound, "device is not connected"));
    };
    queue.touch().await;

    if let Some(ack) = q.ack {
        queue.ack(ack).await;
    }

    let (batch, current_sequence) = queue.since(q.since).await;
    let messages = batch.into_iter().map(|m| m.envelope).collect();
    Ok(Json(MessagesResponse { messages, current_sequence }))
}

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub connected: bool,
    pub workstation_online: bool,
}

/// `GET /state`. Reports whether `device_id` is currently bound and whether
/// its tunnel's workstation socket is live.
pub async fn connection_state(State(state): State<Arc<TunnelState>>, Query(q): Query<StateQuery>) -> Json<StateResponse> {
    match state.longpoll.lookup(&q.device_id).await {
        Some((tunnel_id, _client_id, queue)) => {
            queue.touch().await;
            let workstation_online = state.is_workstation_online(&tunnel_id).await;
            Json(StateResponse { connected: true, workstation_online })
        }
        None => Json(StateResponse { connected: false, workstation_online: false }),
    }
}

#[derive(Debug, Deserialize)]
pub struct DisconnectRequest {
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub disconnected: bool,
}

/// `POST /disconnect`. Unbinds the device's forwarder slot and drops its
/// queue.
pub async fn disconnect(State(state): State<Arc<TunnelState>>, Json(req): Json<DisconnectRequest>) -> Json<DisconnectResponse> {
    match state.longpoll.disconnect(&req.device_id).await {
        Some((tunnel_id, client_id)) => {
            state.unbind_client(&tunnel_id, client_id).await;
            Json(DisconnectResponse { disconnected: true })
        }
        None => Json(DisconnectResponse { disconnected: false }),
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
