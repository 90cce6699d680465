// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod audio;
pub mod auth;
pub mod bus;
pub mod collab;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod heartbeat;
pub mod pty;
pub mod ring;
pub mod session;
pub mod sync;
pub mod transport;

use std::sync::Arc;
use std::sync::Once;

use tokio::sync::mpsc;
use tracing::info;

use crate::config::WorkstationConfig;
use crate::transport::state::WorkstationState;

/// Outbound channel capacity between session actors / dispatch and the
/// tunnel socket writer.
const OUTBOUND_BUFFER: usize = 256;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider `reqwest`/`rustls` need before the first
/// TLS connection. Safe to call more than once — only the first call takes
/// effect.
fn ensure_crypto_provider() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Run the workstation agent until the process is killed: construct shared
/// state, then dial the tunnel forever with reconnect.
pub async fn run(config: WorkstationConfig) -> anyhow::Result<()> {
    config.validate()?;
    ensure_crypto_provider();

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let state = WorkstationState::new(config, outbound_tx)?;

    info!(tunnel_url = %state.config.tunnel_url, "starting workstation agent");
    transport::connection::run(state, outbound_rx).await;
    Ok(())
}
