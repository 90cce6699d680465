// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunnel forwarder: the `workstation_sock` / `client_socks[]` tables keyed
//! by `tunnel_id`, plus presence broadcast, built on per-client mpsc slots
//! fanning out to downstream clients. Here the "upstream" side is the
//! *inbound* workstation socket (the workstation dials the tunnel, not the
//! other way around) and "downstream" clients are either live sockets or
//! long-poll virtual clients, unified behind [`ClientTransport`] so fan-out
//! doesn't need to care which.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};

use tiflis_protocol::messages::ConnectionStateChange;
use tiflis_protocol::Envelope;

use crate::config::TunnelConfig;
use crate::identity::IdentityRegistry;
use crate::longpoll::{LongPollQueue, LongPollRegistry};
use crate::ratelimit::TokenBucket;

pub type ClientId = u64;

/// How a bound client receives its fanned-out envelopes.
pub enum ClientTransport {
    /// A live WebSocket connection; envelopes go out over its writer task.
    Socket(mpsc::Sender<Envelope>),
    /// A long-poll virtual client; envelopes accumulate in its queue.
    LongPoll(Arc<LongPollQueue>),
}

struct ClientSlot {
    device_id: String,
    transport: ClientTransport,
    bucket: Mutex<TokenBucket>,
}

#[derive(Default)]
struct TunnelEntry {
    name: String,
    workstation_tx: Option<mpsc::Sender<Envelope>>,
    clients: HashMap<ClientId, ClientSlot>,
}

/// Central tunnel state: identity registry, forwarder tables, rate limiter
/// config. One instance shared (`Arc`) across every connection handler.
pub struct TunnelState {
    pub config: TunnelConfig,
    pub identity: Arc<IdentityRegistry>,
    pub longpoll: LongPollRegistry,
    tunnels: RwLock<HashMap<String, TunnelEntry>>,
    next_client_id: AtomicU64,
}

impl TunnelState {
    pub fn new(config: TunnelConfig, identity: Arc<IdentityRegistry>) -> Arc<Self> {
        Arc::new(Self { config, identity, longpoll: LongPollRegistry::new(), tunnels: RwLock::new(HashMap::new()), next_client_id: AtomicU64::new(1) })
    }

    /// Registration: binds `tx` as the live workstation socket for the
    /// returned `tunnel_id` and broadcasts `connection.workstation_online`
    /// to every client already bound there.
    pub async fn register_workstation(&self, previous_tunnel_id: Option<&str>, name: &str, tx: mpsc::Sender<Envelope>) -> (String, bool) {
        let already_bound = match previous_tunnel_id {
            Some(prev) => self.tunnels.read().await.get(prev).is_some_and(|e| e.workstation_tx.is_some()),
            None => false,
        };
        let (tunnel_id, restored) = self.identity.register(previous_tunnel_id, name, already_bound).await;

        {
            let mut tunnels = self.tunnels.write().await;
            let entry = tunnels.entry(tunnel_id.clone()).or_default();
            entry.name = name.to_owned();
            entry.workstation_tx = Some(tx);
        }

        self.broadcast_presence(&tunnel_id, true).await;
        (tunnel_id, restored)
    }

    /// Called when a workstation socket closes. The identity stays
    /// reserved (available for reclaim) but is no longer live.
    pub async fn unregister_workstation(&self, tunnel_id: &str) {
        if let Some(entry) = self.tunnels.write().await.get_mut(tunnel_id) {
            entry.workstation_tx = None;
        }
        self.broadcast_presence(tunnel_id, false).await;
    }

    async fn broadcast_presence(&self, tunnel_id: &str, online: bool) {
        let kind = if online { "connection.workstation_online" } else { "connection.workstation_offline" };
        let change = ConnectionStateChange { tunnel_id: tunnel_id.to_owned() };
        if let Ok(env) = Envelope::new(kind).with_payload(&change) {
            self.fanout_to_clients(tunnel_id, env).await;
        }
    }

    pub async fn tunnel_exists(&self, tunnel_id: &str) -> bool {
        self.tunnels.read().await.contains_key(tunnel_id)
    }

    pub async fn is_workstation_online(&self, tunnel_id: &str) -> bool {
        self.tunnels.read().await.get(tunnel_id).is_some_and(|e| e.workstation_tx.is_some())
    }

    /// Bind a long-poll virtual client (`/connect`): allocates the queue,
    /// registers its forwarder slot, and records it in
    /// [`crate::longpoll::LongPollRegistry`] under the same `client_id`,
    /// all under one lock ordering so a lookup never races a half-bound
    /// device. Returns `None` if the tunnel doesn't exist.
    pub async fn bind_longpoll_client(&self, tunnel_id: &str, device_id: String) -> Option<Arc<crate::longpoll::LongPollQueue>> {
        let queue = crate::longpoll::LongPollRegistry::new_queue();
        let client_id = self.bind_client(tunnel_id, device_id.clone(), ClientTransport::LongPoll(Arc::clone(&queue))).await?;
        self.longpoll.register(device_id, tunnel_id.to_owned(), client_id, Arc::clone(&queue)).await;
        Some(queue)
    }

    /// Bind a new downstream client (live socket or long-poll virtual
    /// client) to `tunnel_id`. Returns `None` if the tunnel doesn't exist.
    pub async fn bind_client(&self, tunnel_id: &str, device_id: String, transport: ClientTransport) -> Option<ClientId> {
        let mut tunnels = self.tunnels.write().await;
        let entry = tunnels.get_mut(tunnel_id)?;
        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let bucket = TokenBucket::new(self.config.rate_limit_burst, self.config.rate_limit_per_sec);
        entry.clients.insert(client_id, ClientSlot { device_id, transport, bucket: Mutex::new(bucket) });
        Some(client_id)
    }

    pub async fn unbind_client(&self, tunnel_id: &str, client_id: ClientId) {
        if let Some(entry) = self.tunnels.write().await.get_mut(tunnel_id) {
            entry.clients.remove(&client_id);
        }
    }

    /// Consume one token from `client_id`'s bucket; `false` means the
    /// caller is over its rate limit and its connection should be closed.
    pub async fn check_rate_limit(&self, tunnel_id: &str, client_id: ClientId) -> bool {
        let tunnels = self.tunnels.read().await;
        match tunnels.get(tunnel_id).and_then(|e| e.clients.get(&client_id)) {
            Some(slot) => slot.bucket.lock().await.try_consume(),
            None => true,
        }
    }

    /// Forward a client→workstation frame, stamping `device_id` per the
    /// routing-key contract documented on [`tiflis_protocol::Envelope`].
    /// Returns `false` if no workstation is currently live for `tunnel_id`.
    pub async fn forward_to_workstation(&self, tunnel_id: &str, mut envelope: Envelope, device_id: &str) -> bool {
        envelope.device_id = Some(device_id.to_owned());
        let tx = self.tunnels.read().await.get(tunnel_id).and_then(|e| e.workstation_tx.clone());
        match tx {
            Some(tx) => tx.send(envelope).await.is_ok(),
            None => false,
        }
    }

    /// Blind fan-out of a workstation→client frame: no parsing beyond
    /// routing, delivered to every socket and long-poll queue bound to
    /// `tunnel_id`.
    pub async fn fanout_to_clients(&self, tunnel_id: &str, envelope: Envelope) {
        let tunnels = self.tunnels.read().await;
        let Some(entry) = tunnels.get(tunnel_id) else { return };
        for slot in entry.clients.values() {
            match &slot.transport {
                ClientTransport::Socket(tx) => {
                    let _ = tx.send(envelope.clone()).await;
                }
                ClientTransport::LongPoll(queue) => {
                    queue.push(envelope.clone()).await;
                }
            }
        }
    }

    pub async fn client_device_id(&self, tunnel_id: &str, client_id: ClientId) -> Option<String> {
        self.tunnels.read().await.get(tunnel_id).and_then(|e| e.clients.get(&client_id)).map(|s| s.device_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TunnelConfig {
        use clap::Parser;
        TunnelConfig::parse_from(["tiflis-tunnel", "--registration-api-key", &"k".repeat(32)])
    }

    fn state() -> (Arc<TunnelState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let identity = IdentityRegistry::load(dir.path().join("identities.json"));
        (TunnelState::new(config(), identity), dir)
    }

    #[tokio::test]
    async fn fresh_registration_then_reclaim_restores() {
        let (state, _dir) = state();
        let (tx, _rx) = mpsc::channel(8);
        let (tunnel_id, restored) = state.register_workstation(None, "WS", tx).await;
        assert!(!restored);

        state.unregister_workstation(&tunnel_id).await;
        let (tx2, _rx2) = mpsc::channel(8);
        let (reclaimed, restored2) = state.register_workstation(Some(&tunnel_id), "WS", tx2).await;
        assert_eq!(reclaimed, tunnel_id);
        assert!(restored2);
    }

    #[tokio::test]
    async fn fanout_reaches_bound_client_socket() {
        let (state, _dir) = state();
        let (ws_tx, _ws_rx) = mpsc::channel(8);
        let (tunnel_id, _) = state.register_workstation(None, "WS", ws_tx).await;

        let (client_tx, mut client_rx) = mpsc::channel(8);
        let client_id = state.bind_client(&tunnel_id, "D1".to_owned(), ClientTransport::Socket(client_tx)).await.unwrap();
        assert!(state.client_device_id(&tunnel_id, client_id).await.is_some());

        state.fanout_to_clients(&tunnel_id, Envelope::new("session.output")).await;
        let received = client_rx.recv().await.unwrap();
        assert_eq!(received.kind, "session.output");
    }

    #[tokio::test]
    async fn forward_to_workstation_fails_when_offline() {
        let (state, _dir) = state();
        assert!(!state.forward_to_workstation("unknown-tunnel", Envelope::new("auth"), "D1").await);
    }
}
