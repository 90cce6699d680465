// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the tiflis tunnel relay.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "tiflis-tunnel", about = "Tiflis tunnel relay")]
pub struct TunnelConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "TUNNEL_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 7900, env = "TUNNEL_PORT")]
    pub port: u16,

    /// Static secret workstations must present in `workstation.register.api_key`.
    /// Must be at least 32 characters.
    #[arg(long, env = "TUNNEL_REGISTRATION_API_KEY")]
    pub registration_api_key: String,

    /// Path to the durable tunnel identity store (JSON map).
    #[arg(
        long,
        default_value = "tiflis-tunnel-identities.json",
        env = "TUNNEL_STORAGE_PATH"
    )]
    pub storage_path: PathBuf,

    /// Advertised public WebSocket URL base (echoed back in `workstation.registered`).
    #[arg(long, env = "TUNNEL_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Per-client token bucket capacity (frames).
    #[arg(long, default_value_t = 64, env = "TUNNEL_RATE_LIMIT_BURST")]
    pub rate_limit_burst: u32,

    /// Per-client token bucket refill rate (frames/sec).
    #[arg(long, default_value_t = 32, env = "TUNNEL_RATE_LIMIT_PER_SEC")]
    pub rate_limit_per_sec: u32,
}

impl TunnelConfig {
    /// Validate invariants not expressible through clap alone.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.registration_api_key.len() < 32 {
            anyhow::bail!("TUNNEL_REGISTRATION_API_KEY must be at least 32 characters");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn public_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("ws://{}/ws", self.bind_addr()))
    }
}

/// How long a device may be idle before its long-poll virtual client is GC'd.
pub const LONGPOLL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// How often the long-poll GC sweep runs.
pub const LONGPOLL_GC_INTERVAL: Duration = Duration::from_secs(30);
