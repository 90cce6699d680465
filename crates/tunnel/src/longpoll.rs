// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP long-poll adapter state: a bounded per-device message queue and the
//! registry that maps `device_id` to its queue, tunnel, and
//! forwarder client slot. Queue eviction follows the same
//! eviction-on-overflow strategy as the workstation's PTY output ring,
//! generalized from a byte/record ring to an envelope ring with its own
//! housekeeping sequence (distinct from any per-session `sequence` carried
//! inside a forwarded envelope's payload). GC of idle virtual clients is a
//! prune-after-timeout sweep.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

use tiflis_protocol::{Envelope, ErrorCode};

use crate::config::{LONGPOLL_GC_INTERVAL, LONGPOLL_IDLE_TIMEOUT};
use crate::state::ClientId;

const QUEUE_CAPACITY: usize = 256;

/// One queued envelope, tagged with the queue's own monotonic sequence used
/// for `/messages?since=&ack=` pagination.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub sequence: u64,
    pub envelope: Envelope,
}

/// Bounded ring of envelopes awaiting a poll, plus last-poll bookkeeping for
/// idle GC.
pub struct LongPollQueue {
    messages: Mutex<VecDeque<QueuedMessage>>,
    next_sequence: AtomicU64,
    last_poll: Mutex<Instant>,
}

impl LongPollQueue {
    fn new() -> Self {
        Self { messages: Mutex::new(VecDeque::with_capacity(QUEUE_CAPACITY)), next_sequence: AtomicU64::new(1), last_poll: Mutex::new(Instant::now()) }
    }

    /// Enqueue an envelope, dropping the oldest and inserting a
    /// `QUEUE_OVERFLOW` error record when the ring is full.
    pub async fn push(&self, envelope: Envelope) {
        let mut messages = self.messages.lock().await;
        self.push_locked(&mut messages, envelope);
    }

    fn push_locked(&self, messages: &mut VecDeque<QueuedMessage>, envelope: Envelope) {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        messages.push_back(QueuedMessage { sequence, envelope });
        if messages.len() > QUEUE_CAPACITY {
            messages.pop_front();
            let overflow_seq = self.next_sequence.fetch_add(1, Ordering::Relaxed);
            let overflow_env = Envelope::new("error").with_payload(&ErrorCode::QueueOverflow.to_error_body("device queue overflowed, oldest message dropped")).unwrap_or_else(|_| Envelope::new("error"));
            messages.push_back(QueuedMessage { sequence: overflow_seq, envelope: overflow_env });
            while messages.len() > QUEUE_CAPACITY {
                messages.pop_front();
            }
        }
    }

    /// Messages strictly after `since`, plus the queue's current sequence.
    pub async fn since(&self, since: u64) -> (Vec<QueuedMessage>, u64) {
        let messages = self.messages.lock().await;
        let current = self.next_sequence.load(Ordering::Relaxed).saturating_sub(1);
        let batch = messages.iter().filter(|m| m.sequence > since).cloned().collect();
        (batch, current)
    }

    /// Trim everything up to and including `ack`.
    pub async fn ack(&self, ack: u64) {
        let mut messages = self.messages.lock().await;
        while messages.front().is_some_and(|m| m.sequence <= ack) {
            messages.pop_front();
        }
    }

    pub async fn touch(&self) {
        *self.last_poll.lock().await = Instant::now();
    }

    pub async fn idle_for(&self) -> Duration {
        self.last_poll.lock().await.elapsed()
    }
}

struct DeviceEntry {
    tunnel_id: String,
    client_id: ClientId,
    queue: Arc<LongPollQueue>,
}

/// Registry of active long-poll virtual clients, keyed by `device_id`.
#[derive(Default)]
pub struct LongPollRegistry {
    devices: RwLock<HashMap<String, DeviceEntry>>,
}

impl LongPollRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self, device_id: String, tunnel_id: String, client_id: ClientId) -> Arc<LongPollQueue> {
        let queue = Arc::new(LongPollQueue::new());
        self.devices.write().await.insert(device_id, DeviceEntry { tunnel_id, client_id, queue: Arc::clone(&queue) });
        queue
    }

    /// Build a fresh queue without registering it yet — used when the
    /// caller needs the queue object to hand to [`crate::state::TunnelState::bind_client`]
    /// (which allocates `client_id`) before it can register the device
    /// entry below.
    pub fn new_queue() -> Arc<LongPollQueue> {
        Arc::new(LongPollQueue::new())
    }

    pub async fn register(&self, device_id: String, tunnel_id: String, client_id: ClientId, queue: Arc<LongPollQueue>) {
        self.devices.write().await.insert(device_id, DeviceEntry { tunnel_id, client_id, queue });
    }

    pub async fn lookup(&self, device_id: &str) -> Option<(String, ClientId, Arc<LongPollQueue>)> {
        self.devices.read().await.get(device_id).map(|e| (e.tunnel_id.clone(), e.client_id, Arc::clone(&e.queue)))
    }

    pub async fn disconnect(&self, device_id: &str) -> Option<(String, ClientId)> {
        self.devices.write().await.remove(device_id).map(|e| (e.tunnel_id, e.client_id))
    }

    /// Periodically unbind devices that haven't polled in
    /// [`LONGPOLL_IDLE_TIMEOUT`].
    pub async fn run_gc(&self, state: Arc<crate::state::TunnelState>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(LONGPOLL_GC_INTERVAL) => {}
                _ = shutdown.cancelled() => return,
            }

            let stale: Vec<(String, String, ClientId)> = {
                let devices = self.devices.read().await;
                let mut stale = Vec::new();
                for (device_id, entry) in devices.iter() {
                    if entry.queue.idle_for().await > LONGPOLL_IDLE_TIMEOUT {
                        stale.push((device_id.clone(), entry.tunnel_id.clone(), entry.client_id));
                    }
                }
                stale
            };

            for (device_id, tunnel_id, client_id) in stale {
                info!(%device_id, %tunnel_id, "garbage-collecting idle long-poll client");
                self.devices.write().await.remove(&device_id);
                state.unbind_client(&tunnel_id, client_id).await;
            }
        }
    }
}
