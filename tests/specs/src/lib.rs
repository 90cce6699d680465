// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests: spawns the real
//! `tiflis-tunnel` and `tiflis-workstation` binaries as subprocesses and
//! drives a scenario through them the way a roaming client actually would,
//! over a real TCP WebSocket: spawn a real binary, poll until healthy,
//! expose its endpoints, covering the tunnel+workstation pair and the
//! envelope protocol they speak.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

/// Resolve the path to a compiled workspace binary.
fn workspace_binary(name: &str) -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join(name)
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `tiflis-tunnel` process, killed when dropped.
pub struct TunnelProcess {
    _child: Child,
    port: u16,
    _identity_dir: tempfile::TempDir,
}

impl TunnelProcess {
    /// Spawn the tunnel relay on a free loopback port with the given
    /// registration api key (must be at least 32 characters, spec §6).
    pub fn start(registration_api_key: &str) -> anyhow::Result<Self> {
        let binary = workspace_binary("tiflis-tunnel");
        anyhow::ensure!(binary.exists(), "tiflis-tunnel binary not found at {}", binary.display());

        let port = free_port()?;
        let identity_dir = tempfile::tempdir()?;

        let child = Command::new(&binary)
            .args([
                "--host",
                "127.0.0.1",
                "--port",
                &port.to_string(),
                "--registration-api-key",
                registration_api_key,
                "--storage-path",
                &identity_dir.path().join("identities.json").to_string_lossy(),
            ])
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        Ok(Self { _child: child, port, _identity_dir: identity_dir })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    fn health_url(&self) -> String {
        format!("http://127.0.0.1:{}/health", self.port)
    }

    /// Poll `/health` until it responds, or the deadline passes.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("tunnel did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = reqwest::get(self.health_url()).await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// A running `tiflis-workstation` process, killed when dropped. Its
/// `tunnel_id` isn't exposed over any transport (the workstation listens on
/// nothing, spec §4.2) so it's recovered from the structured log line the
/// process emits once it registers.
pub struct WorkstationProcess {
    child: Child,
    tunnel_id_rx: std::sync::Mutex<Option<oneshot::Receiver<String>>>,
}

impl WorkstationProcess {
    pub fn start(tunnel_ws_url: &str, tunnel_api_key: &str, workstation_auth_key: &str, workspaces_root: &Path) -> anyhow::Result<Self> {
        let binary = workspace_binary("tiflis-workstation");
        anyhow::ensure!(binary.exists(), "tiflis-workstation binary not found at {}", binary.display());

        let mut child = Command::new(&binary)
            .args([
                "--tunnel-url",
                tunnel_ws_url,
                "--tunnel-api-key",
                tunnel_api_key,
                "--workstation-auth-key",
                workstation_auth_key,
                "--workspaces-root",
                &workspaces_root.to_string_lossy(),
                "--log-format",
                "json",
                "--log-level",
                "info",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut tx = Some(tx);
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else { continue };
                let Some(tunnel_id) = value.get("fields").and_then(|f| f.get("tunnel_id")).and_then(|v| v.as_str()) else { continue };
                if let Some(tx) = tx.take() {
                    let _ = tx.send(tunnel_id.to_owned());
                }
            }
        });

        Ok(Self { child, tunnel_id_rx: std::sync::Mutex::new(Some(rx)) })
    }

    /// Wait for the `tunnel_id` the workstation was assigned on
    /// registration, parsed from its own log output. Can only be called
    /// once per process.
    pub async fn wait_for_tunnel_id(&self, timeout: Duration) -> anyhow::Result<String> {
        let rx = self.tunnel_id_rx.lock().unwrap().take().ok_or_else(|| anyhow::anyhow!("tunnel_id already consumed"))?;
        let tunnel_id = tokio::time::timeout(timeout, rx).await.map_err(|_| anyhow::anyhow!("workstation never logged a tunnel_id within {timeout:?}"))??;
        Ok(tunnel_id)
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}
