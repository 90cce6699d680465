// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tiflis tunnel: the relay between roaming clients and a workstation that
//! dials out from behind NAT. Holds no session state of its own beyond
//! identity and forwarder tables; every byte of payload is opaque to it.

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod identity;
pub mod longpoll;
pub mod persist;
pub mod ratelimit;
pub mod state;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::TunnelConfig;
use crate::identity::IdentityRegistry;
use crate::state::TunnelState;
use crate::transport::build_router;

/// Run the tunnel relay until shutdown.
pub async fn run(config: TunnelConfig) -> anyhow::Result<()> {
    config.validate()?;

    let addr = config.bind_addr();
    let shutdown = CancellationToken::new();

    let identity = IdentityRegistry::load(config.storage_path.clone());
    let state = TunnelState::new(config, identity);

    let gc_state = Arc::clone(&state);
    let gc_shutdown = shutdown.clone();
    tokio::spawn(async move { gc_state.longpoll.run_gc(gc_state.clone(), gc_shutdown).await });

    info!(%addr, "tiflis-tunnel listening");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
