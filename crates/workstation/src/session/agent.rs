// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent session actor. Drives a [`crate::driver::AgentProcess`],
//! accumulates its transcript, and publishes a cheap [`AgentSnapshot`] after
//! every mutation so `sync`/`session.subscribed` readers don't round-trip
//! through the actor mailbox: a cached-last-state pattern paired with the
//! already-kept `driver::AgentProcess` JSONL runner.
//!
//! Supervisor sessions (a distinguished agent session that fans in commands
//! from every member session) reuse this actor unchanged;
//! [`crate::session::supervisor`] only adds membership bookkeeping around it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tiflis_protocol::content_block::ContentBlockKind;
use tiflis_protocol::messages::{AgentHistoryRecord, ContextCleared, HistoryRole, Output, SessionTerminated, UserMessage};
use tiflis_protocol::{epoch_ms, ContentBlock, Envelope};
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::bus::SessionBus;
use crate::collab::stt::SttClient;
use crate::collab::tts::{summarize_for_speech, TtsClient};
use crate::driver::{AgentEvent, AgentProcess};

/// Cheap, clonable read model a subscribing device (or `sync`) can fetch
/// without going through the actor's mailbox.
#[derive(Debug, Clone, Default)]
pub struct AgentSnapshot {
    pub history: Vec<AgentHistoryRecord>,
    pub is_executing: bool,
    pub current_streaming_blocks: Option<Vec<ContentBlock>>,
}

pub enum AgentCommand {
    Execute {
        text: Option<String>,
        audio: Option<String>,
        audio_format: Option<String>,
        language: Option<String>,
        tts_enabled: bool,
        from_device_id: String,
    },
    Cancel,
    ClearContext,
    Terminate,
}

#[derive(Clone)]
pub struct AgentHandle {
    pub cmd_tx: mpsc::Sender<AgentCommand>,
    pub snapshot: Arc<RwLock<AgentSnapshot>>,
    pub executing: Arc<AtomicBool>,
}

impl AgentHandle {
    pub async fn snapshot(&self) -> AgentSnapshot {
        self.snapshot.read().await.clone()
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Relaxed)
    }

    pub async fn execute(&self, cmd: AgentCommand) {
        let _ = self.cmd_tx.send(cmd).await;
    }

    pub async fn terminate(&self) {
        let _ = self.cmd_tx.send(AgentCommand::Terminate).await;
    }
}

pub struct AgentConfig {
    pub agent_command: Vec<String>,
    pub cwd: String,
    pub stt: Option<Arc<SttClient>>,
    pub tts: Option<Arc<TtsClient>>,
    pub audio: Option<Arc<crate::audio::AudioStore>>,
}

pub fn spawn(session_id: String, config: AgentConfig, bus: Arc<SessionBus>, outbound: mpsc::Sender<Envelope>) -> AgentHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let snapshot = Arc::new(RwLock::new(AgentSnapshot::default()));
    let executing = Arc::new(AtomicBool::new(false));

    tokio::spawn(run_actor(session_id, config, cmd_rx, bus, outbound, Arc::clone(&snapshot), Arc::clone(&executing)));

    AgentHandle { cmd_tx, snapshot, executing }
}

async fn run_actor(
    session_id: String,
    config: AgentConfig,
    mut cmd_rx: mpsc::Receiver<AgentCommand>,
    bus: Arc<SessionBus>,
    outbound: mpsc::Sender<Envelope>,
    snapshot: Arc<RwLock<AgentSnapshot>>,
    executing: Arc<AtomicBool>,
) {
    let mut cancel_tx: Option<oneshot::Sender<()>> = None;

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            AgentCommand::Execute { text, audio, audio_format, language, tts_enabled, from_device_id } => {
                if executing.load(Ordering::Relaxed) {
                    continue; // one execution in flight per session
                }

                let prompt = match resolve_prompt(&config, text, audio, audio_format, language).await {
                    Ok(p) => p,
                    Err(err) => {
                        emit_error(&outbound, &session_id, &err.to_string()).await;
                        continue;
                    }
                };

                {
                    let mut snap = snapshot.write().await;
                    let seq = snap.history.len() as u64;
                    snap.history.push(AgentHistoryRecord { role: HistoryRole::User, content: prompt.clone(), content_blocks: None, sequence: seq, created_at: epoch_ms() });
                    snap.is_executing = true;
                }
                executing.store(true, Ordering::Relaxed);

                let user_msg = UserMessage { content: prompt.clone(), from_device_id };
                if let Ok(env) = Envelope::new("supervisor.user_message").with_session(session_id.clone()).with_payload(&user_msg) {
                    let _ = outbound.send(env).await;
                }

                match AgentProcess::spawn(&config.agent_command, std::path::Path::new(&config.cwd), &prompt, &[]).await {
                    Ok(mut process) => {
                        let (events_tx, events_rx) = mpsc::channel::<AgentEvent>(128);
                        let (cancel, cancel_rx) = oneshot::channel();
                        cancel_tx = Some(cancel);
                        let cancelled = Arc::new(AtomicBool::new(false));
                        let cancelled_for_select = Arc::clone(&cancelled);

                        tokio::spawn(async move {
                            tokio::select! {
                                _ = process.run(events_tx) => {}
                                _ = cancel_rx => {
                                    cancelled_for_select.store(true, Ordering::Relaxed);
                                    process.cancel().await;
                                }
                            }
                        });

                        let session_id_for_drain = session_id.clone();
                        let outbound_for_drain = outbound.clone();
                        let bus_for_drain = Arc::clone(&bus);
                        let snapshot_for_drain = Arc::clone(&snapshot);
                        let executing_for_drain = Arc::clone(&executing);
                        let tts_for_drain = config.tts.clone();
                        let audio_for_drain = config.audio.clone();

                        tokio::spawn(async move {
                            drive_to_completion(
                                &session_id_for_drain,
                                events_rx,
                                &outbound_for_drain,
                                &bus_for_drain,
                                &snapshot_for_drain,
                                tts_for_drain.as_deref(),
                                audio_for_drain.as_deref(),
                                tts_enabled,
                                &cancelled,
                            )
                            .await;
                            executing_for_drain.store(false, Ordering::Relaxed);
                        });
                    }
                    Err(err) => {
                        emit_error(&outbound, &session_id, &format!("failed to start agent: {err}")).await;
                        executing.store(false, Ordering::Relaxed);
                        snapshot.write().await.is_executing = false;
                    }
                }
            }
            AgentCommand::Cancel => {
                if let Some(tx) = cancel_tx.take() {
                    let _ = tx.send(());
                }
            }
            AgentCommand::ClearContext => {
                snapshot.write().await.history.clear();
                if let Ok(env) = Envelope::new("supervisor.context_cleared").with_session(session_id.clone()).with_payload(&ContextCleared {}) {
                    let _ = outbound.send(env).await;
                }
            }
            AgentCommand::Terminate => break,
        }
    }

    bus.remove_session(&session_id).await;
    let terminated = SessionTerminated { session_id: session_id.clone() };
    if let Ok(env) = Envelope::new("session.terminated").with_session(session_id).with_payload(&terminated) {
        let _ = outbound.send(env).await;
    }
}

async fn resolve_prompt(
    config: &AgentConfig,
    text: Option<String>,
    audio: Option<String>,
    audio_format: Option<String>,
    language: Option<String>,
) -> anyhow::Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    let (audio, stt) = match (audio, &config.stt) {
        (Some(audio), Some(stt)) => (audio, stt),
        (Some(_), None) => anyhow::bail!("voice input received but no STT collaborator is configured"),
        (None, _) => anyhow::bail!("execute requires either `text` or `audio`"),
    };
    stt.transcribe(&audio, audio_format.as_deref(), language.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!(e.0))
}

async fn emit_error(outbound: &mpsc::Sender<Envelope>, session_id: &str, message: &str) {
    let block = ContentBlock::new(uuid::Uuid::new_v4().to_string(), ContentBlockKind::Error { code: None, message: message.to_owned() });
    let output = Output { content_type: "error".to_owned(), content_blocks: vec![block], is_complete: true };
    if let Ok(env) = Envelope::new("supervisor.output").with_session(session_id.to_owned()).with_payload(&output) {
        let _ = outbound.send(env).await;
    }
}

/// Consume `events_rx` until the driver reports exit or a terminal content
/// block, folding streamed blocks into the shared snapshot as they arrive
/// and fanning them out live to subscribers. On completion, appends the
/// assistant turn to history and, if requested and a TTS collaborator is
/// configured, synthesizes speech for it.
async fn drive_to_completion(
    session_id: &str,
    mut events_rx: mpsc::Receiver<AgentEvent>,
    outbound: &mpsc::Sender<Envelope>,
    bus: &Arc<SessionBus>,
    snapshot: &Arc<RwLock<AgentSnapshot>>,
    tts: Option<&TtsClient>,
    audio: Option<&crate::audio::AudioStore>,
    tts_enabled: bool,
    cancelled: &Arc<AtomicBool>,
) {
    let mut streaming: Vec<ContentBlock> = Vec::new();

    while let Some(event) = events_rx.recv().await {
        match event {
            AgentEvent::Block(block) => {
                let is_terminal = matches!(block.kind, ContentBlockKind::Cancel { .. } | ContentBlockKind::Error { .. });
                streaming.push(block.clone());
                snapshot.write().await.current_streaming_blocks = Some(streaming.clone());

                if bus.has_subscribers(session_id).await {
                    let output = Output { content_type: "assistant".to_owned(), content_blocks: vec![block], is_complete: false };
                    if let Ok(env) = Envelope::new("supervisor.output").with_session(session_id.to_owned()).with_payload(&output) {
                        let _ = outbound.send(env).await;
                    }
                }
                if is_terminal {
                    break;
                }
            }
            AgentEvent::Exited(_) => break,
        }
    }

    // The subprocess was torn down via `AgentCommand::Cancel` rather than
    // emitting its own terminal block (e.g. it doesn't notice SIGTERM fast
    // enough, or the channel closed on process exit after cancel). Append
    // the cancel block ourselves so the client always sees one.
    if cancelled.load(Ordering::Relaxed) && !streaming.iter().any(|b| matches!(b.kind, ContentBlockKind::Cancel { .. })) {
        let block = ContentBlock::cancel(uuid::Uuid::new_v4().to_string());
        streaming.push(block.clone());
        snapshot.write().await.current_streaming_blocks = Some(streaming.clone());
        if bus.has_subscribers(session_id).await {
            let output = Output { content_type: "assistant".to_owned(), content_blocks: vec![block], is_complete: false };
            if let Ok(env) = Envelope::new("supervisor.output").with_session(session_id.to_owned()).with_payload(&output) {
                let _ = outbound.send(env).await;
            }
        }
    }

    let assistant_text: String = streaming
        .iter()
        .filter_map(|b| match &b.kind {
            ContentBlockKind::Text { text } => Some(text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    {
        let mut snap = snapshot.write().await;
        let seq = snap.history.len() as u64;
        snap.history.push(AgentHistoryRecord {
            role: HistoryRole::Assistant,
            content: assistant_text.clone(),
            content_blocks: Some(streaming.clone()),
            sequence: seq,
            created_at: epoch_ms(),
        });
        snap.is_executing = false;
        snap.current_streaming_blocks = None;
    }

    let final_output = Output { content_type: "assistant".to_owned(), content_blocks: streaming, is_complete: true };
    if let Ok(env) = Envelope::new("supervisor.output").with_session(session_id.to_owned()).with_payload(&final_output) {
        let _ = outbound.send(env).await;
    }

    if tts_enabled && !assistant_text.is_empty() {
        if let Some(tts) = tts {
            let summary = summarize_for_speech(&assistant_text, 3);
            match tts.synthesize(&summary).await {
                Ok(synth) => {
                    let message_id = uuid::Uuid::new_v4().to_string();
                    if let Some(audio) = audio {
                        audio.put(message_id.clone(), synth.audio_base64.clone(), epoch_ms()).await;
                    }
                    let voice = tiflis_protocol::messages::VoiceOutput { audio: synth.audio_base64, message_id, duration: synth.duration };
                    if let Ok(env) = Envelope::new("supervisor.voice_output").with_session(session_id.to_owned()).with_payload(&voice) {
                        let _ = outbound.send(env).await;
                    }
                }
                Err(err) => tracing::warn!(%err, "tts synthesis failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_defaults_to_idle() {
        let snap = AgentSnapshot::default();
        assert!(!snap.is_executing);
        assert!(snap.history.is_empty());
    }
}
