// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router assembly for the tunnel relay: one WebSocket endpoint and the
//! long-poll HTTP adapter, both driven off the same [`TunnelState`] via a
//! single `Router::new()` chain with a shared `with_state`.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::TunnelState;

pub fn build_router(state: Arc<TunnelState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/connect", post(http::connect))
        .route("/command", post(http::command))
        .route("/messages", get(http::messages))
        .route("/state", get(http::connection_state))
        .route("/disconnect", post(http::disconnect))
        .route("/health", get(http::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
