// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide shared state: the session registry, subscriber bus, device
//! registry, supervisor, audio store, and outbound channel to the tunnel.
//! One instance lives for the life of the process; every dispatch handler
//! borrows it, split into the smaller per-concern types this domain needs
//! instead of one flat struct with a giant lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::audio::AudioStore;
use crate::bus::SessionBus;
use crate::collab::stt::SttClient;
use crate::collab::tts::TtsClient;
use crate::config::WorkstationConfig;
use crate::device::DeviceRegistry;
use crate::session::agent::AgentConfig;
use crate::session::registry::SessionRegistry;
use crate::session::supervisor::Supervisor;

/// Default audio store bounds: at most 256 outstanding clips, each expiring
/// after 10 minutes — generous enough to cover a client re-requesting a clip
/// after a brief disconnect.
const AUDIO_STORE_CAPACITY: usize = 256;
const AUDIO_STORE_MAX_AGE_MS: u64 = 10 * 60 * 1000;

pub struct WorkstationState {
    pub config: WorkstationConfig,
    pub registry: SessionRegistry,
    pub bus: Arc<SessionBus>,
    pub devices: DeviceRegistry,
    pub supervisor: Supervisor,
    pub audio: Arc<AudioStore>,
    pub outbound: mpsc::Sender<tiflis_protocol::Envelope>,
    pub stt: Option<Arc<SttClient>>,
    pub tts: Option<Arc<TtsClient>>,
    agent_aliases: HashMap<String, Vec<String>>,
    started_at: Instant,
}

impl WorkstationState {
    pub fn new(config: WorkstationConfig, outbound: mpsc::Sender<tiflis_protocol::Envelope>) -> anyhow::Result<Arc<Self>> {
        let stt = match (&config.stt_endpoint, &config.stt_api_key) {
            (Some(endpoint), key) => Some(Arc::new(SttClient::new(endpoint.clone(), key.clone())?)),
            (None, _) => None,
        };
        let tts = match (&config.tts_endpoint, &config.tts_api_key) {
            (Some(endpoint), key) => Some(Arc::new(TtsClient::new(endpoint.clone(), key.clone())?)),
            (None, _) => None,
        };
        let agent_aliases = WorkstationConfig::agent_aliases();
        let bus = Arc::new(SessionBus::new());
        let audio = Arc::new(AudioStore::new(AUDIO_STORE_CAPACITY, AUDIO_STORE_MAX_AGE_MS));

        let supervisor_config = AgentConfig {
            agent_command: agent_aliases.values().next().cloned().unwrap_or_else(|| vec!["true".to_owned()]),
            cwd: config.workspaces_root.clone(),
            stt: stt.clone(),
            tts: tts.clone(),
            audio: Some(Arc::clone(&audio)),
        };
        let supervisor = Supervisor::spawn(supervisor_config, Arc::clone(&bus), outbound.clone());

        Ok(Arc::new(Self {
            config,
            registry: SessionRegistry::new(),
            bus,
            devices: DeviceRegistry::new(),
            supervisor,
            audio,
            outbound,
            stt,
            tts,
            agent_aliases,
            started_at: Instant::now(),
        }))
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Resolve an agent name to its command line, via `AGENT_ALIAS_<NAME>`
    /// first, falling back to treating the name itself as a bare executable.
    pub fn agent_command(&self, agent_name: &str) -> Vec<String> {
        self.agent_aliases.get(agent_name).cloned().unwrap_or_else(|| vec![agent_name.to_owned()])
    }
}
