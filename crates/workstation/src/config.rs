// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workstation process configuration. `clap::Parser` with `env = "..."` on
//! every field; the alias map
//! (`AGENT_ALIAS_<NAME>=<command>`) doesn't fit clap's derive model and is
//! parsed separately from `std::env::vars()`.

use std::collections::HashMap;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "tiflis-workstation", version, about = "Remote workstation access agent")]
pub struct WorkstationConfig {
    /// Base tunnel endpoint to dial, e.g. wss://tunnel.example.com/ws.
    #[arg(long, env = "TUNNEL_URL")]
    pub tunnel_url: String,

    /// Shared secret presented on `workstation.register`.
    #[arg(long, env = "TUNNEL_API_KEY")]
    pub tunnel_api_key: String,

    /// Secret devices must present on `auth` to control this workstation.
    #[arg(long, env = "WORKSTATION_AUTH_KEY")]
    pub workstation_auth_key: String,

    /// Human-readable name advertised on registration.
    #[arg(long, env = "WORKSTATION_NAME", default_value = "workstation")]
    pub workstation_name: String,

    /// Root directory new sessions are rooted under.
    #[arg(long, env = "WORKSPACES_ROOT", default_value = "/workspace")]
    pub workspaces_root: String,

    /// Comma-separated list of agent names offered to clients, in addition
    /// to any discovered via `AGENT_ALIAS_*`.
    #[arg(long, env = "AVAILABLE_AGENTS", value_delimiter = ',', default_value = "")]
    pub available_agents: Vec<String>,

    /// Default PTY ring buffer size; 1000+ keeps full-screen TUI repaints
    /// from scrolling history out of the replay window.
    #[arg(long, env = "DEFAULT_BUFFER_SIZE", default_value_t = 1000)]
    pub default_buffer_size: usize,

    /// Optional speech-to-text collaborator endpoint.
    #[arg(long, env = "STT_ENDPOINT")]
    pub stt_endpoint: Option<String>,
    #[arg(long, env = "STT_API_KEY")]
    pub stt_api_key: Option<String>,

    /// Optional text-to-speech collaborator endpoint.
    #[arg(long, env = "TTS_ENDPOINT")]
    pub tts_endpoint: Option<String>,
    #[arg(long, env = "TTS_API_KEY")]
    pub tts_api_key: Option<String>,

    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl WorkstationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workstation_auth_key.is_empty() {
            anyhow::bail!("WORKSTATION_AUTH_KEY must not be empty");
        }
        if self.tunnel_api_key.is_empty() {
            anyhow::bail!("TUNNEL_API_KEY must not be empty");
        }
        if self.default_buffer_size == 0 {
            anyhow::bail!("DEFAULT_BUFFER_SIZE must be at least 1");
        }
        Ok(())
    }

    /// Agent command aliases, read from any `AGENT_ALIAS_<NAME>=<command>`
    /// environment variable. The command is split on whitespace; quoting is
    /// not supported.
    pub fn agent_aliases() -> HashMap<String, Vec<String>> {
        let mut aliases = HashMap::new();
        for (key, value) in std::env::vars() {
            if let Some(name) = key.strip_prefix("AGENT_ALIAS_") {
                let command: Vec<String> = value.split_whitespace().map(str::to_owned).collect();
                if !command.is_empty() {
                    aliases.insert(name.to_lowercase(), command);
                }
            }
        }
        aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> WorkstationConfig {
        WorkstationConfig {
            tunnel_url: "wss://t".into(),
            tunnel_api_key: "k".into(),
            workstation_auth_key: "secret".into(),
            workstation_name: "ws".into(),
            workspaces_root: "/workspace".into(),
            available_agents: vec![],
            default_buffer_size: 1000,
            stt_endpoint: None,
            stt_api_key: None,
            tts_endpoint: None,
            tts_api_key: None,
            log_format: LogFormat::Pretty,
            log_level: "info".into(),
        }
    }

    #[test]
    fn rejects_empty_auth_key() {
        let mut config = base_config();
        config.workstation_auth_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_config() {
        assert!(base_config().validate().is_ok());
    }
}
