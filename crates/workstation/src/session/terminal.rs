// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal session actor: PTY owner, ring-backed replay. Master-client
//! arbitration and the resize clamp law live in the
//! dispatcher (via [`crate::bus::SessionBus`]) and here respectively; this
//! actor only ever sees a resize it has already been told to apply.
//! Built on `pty::{spawn,nbio,mod}` (kept nearly as-is) plus new FIFO
//! multi-subscriber logic a single-device design wouldn't need.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tiflis_protocol::messages::{PtyOutput, SessionReplayData, SessionTerminated};
use tiflis_protocol::{epoch_ms, Envelope};
use tokio::sync::{mpsc, oneshot};

use crate::bus::SessionBus;
use crate::pty::spawn::PtyResizeHandle;
use crate::pty::{clamp_size, NativePty};
use crate::ring::OutputRing;

pub enum TerminalCommand {
    Input(Bytes),
    Resize { cols: u16, rows: u16, reply: oneshot::Sender<(u16, u16)> },
    Replay { since_sequence: Option<u64>, since_timestamp: Option<u64>, limit: Option<usize>, reply: oneshot::Sender<SessionReplayData> },
    Terminate,
}

#[derive(Clone)]
pub struct TerminalHandle {
    pub cmd_tx: mpsc::Sender<TerminalCommand>,
    pub cols: Arc<AtomicU16>,
    pub rows: Arc<AtomicU16>,
}

impl TerminalHandle {
    pub fn size(&self) -> (u16, u16) {
        (self.cols.load(Ordering::Relaxed), self.rows.load(Ordering::Relaxed))
    }

    pub async fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<(u16, u16)> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx.send(TerminalCommand::Resize { cols, rows, reply: reply_tx }).await.map_err(|_| anyhow::anyhow!("terminal actor gone"))?;
        reply_rx.await.map_err(|_| anyhow::anyhow!("terminal actor dropped reply"))
    }

    pub async fn replay(&self, since_sequence: Option<u64>, since_timestamp: Option<u64>, limit: Option<usize>) -> anyhow::Result<SessionReplayData> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(TerminalCommand::Replay { since_sequence, since_timestamp, limit, reply: reply_tx })
            .await
            .map_err(|_| anyhow::anyhow!("terminal actor gone"))?;
        reply_rx.await.map_err(|_| anyhow::anyhow!("terminal actor dropped reply"))
    }

    pub async fn input(&self, data: Vec<u8>) {
        let _ = self.cmd_tx.send(TerminalCommand::Input(Bytes::from(data))).await;
    }

    pub async fn terminate(&self) {
        let _ = self.cmd_tx.send(TerminalCommand::Terminate).await;
    }
}

/// Default replay page size when a `session.replay` request omits `limit`.
const DEFAULT_REPLAY_LIMIT: usize = 100;

pub fn spawn(
    session_id: String,
    command: Vec<String>,
    cols: u16,
    rows: u16,
    buffer_size: usize,
    bus: Arc<SessionBus>,
    outbound: mpsc::Sender<Envelope>,
) -> anyhow::Result<TerminalHandle> {
    let (cols, rows) = clamp_size(cols, rows);
    let pty = NativePty::spawn(&command, cols, rows)?;
    let resize_handle = pty.resize_handle();
    let cols_shared = Arc::new(AtomicU16::new(cols));
    let rows_shared = Arc::new(AtomicU16::new(rows));

    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (pty_out_tx, pty_out_rx) = mpsc::channel::<Bytes>(256);
    let (pty_in_tx, pty_in_rx) = mpsc::channel::<Bytes>(256);

    tokio::spawn(run_pty(pty, pty_out_tx, pty_in_rx));
    tokio::spawn(run_actor(
        session_id,
        cmd_rx,
        pty_out_rx,
        pty_in_tx,
        buffer_size,
        bus,
        outbound,
        resize_handle,
        Arc::clone(&cols_shared),
        Arc::clone(&rows_shared),
    ));

    Ok(TerminalHandle { cmd_tx, cols: cols_shared, rows: rows_shared })
}

async fn run_pty(pty: NativePty, output_tx: mpsc::Sender<Bytes>, input_rx: mpsc::Receiver<Bytes>) {
    if let Err(err) = pty.run(output_tx, input_rx).await {
        tracing::warn!(%err, "pty exited with error");
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_actor(
    session_id: String,
    mut cmd_rx: mpsc::Receiver<TerminalCommand>,
    mut pty_out_rx: mpsc::Receiver<Bytes>,
    pty_in_tx: mpsc::Sender<Bytes>,
    buffer_size: usize,
    bus: Arc<SessionBus>,
    outbound: mpsc::Sender<Envelope>,
    resize_handle: PtyResizeHandle,
    cols: Arc<AtomicU16>,
    rows: Arc<AtomicU16>,
) {
    let mut ring = OutputRing::new(buffer_size);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TerminalCommand::Input(data)) => {
                        let _ = pty_in_tx.send(data).await;
                    }
                    Some(TerminalCommand::Resize { cols: c, rows: r, reply }) => {
                        let (c, r) = clamp_size(c, r);
                        if let Err(err) = resize_handle.resize(c, r) {
                            tracing::warn!(%err, "pty resize ioctl failed");
                        }
                        cols.store(c, Ordering::Relaxed);
                        rows.store(r, Ordering::Relaxed);
                        let _ = reply.send((c, r));
                    }
                    Some(TerminalCommand::Replay { since_sequence, since_timestamp, limit, reply }) => {
                        let data = ring.replay(since_sequence, since_timestamp, limit.unwrap_or(DEFAULT_REPLAY_LIMIT));
                        let _ = reply.send(data);
                    }
                    Some(TerminalCommand::Terminate) | None => break,
                }
            }
            chunk = pty_out_rx.recv() => {
                match chunk {
                    Some(bytes) => {
                        let content = String::from_utf8_lossy(&bytes).into_owned();
                        let record = ring.push(content, epoch_ms());
                        if bus.has_subscribers(&session_id).await {
                            let payload = PtyOutput { record: record.clone() };
                            if let Ok(env) = Envelope::new("session.pty_output").with_session(session_id.clone()).with_payload(&payload) {
                                let env = env.with_sequence(record.sequence);
                                let _ = outbound.send(env).await;
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    bus.remove_session(&session_id).await;
    let terminated = SessionTerminated { session_id: session_id.clone() };
    if let Ok(env) = Envelope::new("session.terminated").with_session(session_id).with_payload(&terminated) {
        let _ = outbound.send(env).await;
    }
}
