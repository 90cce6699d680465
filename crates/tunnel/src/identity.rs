// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunnel identity registry: durable `tunnel_id` allocation with
//! crash-survivable reclaim, a register/list/deregister actor backed by
//! [`crate::persist`].

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::persist::{self, IdentityMap, IdentityRecord};

/// Serializes every write to the identity store through a single actor-like
/// lock; reads are snapshotted against the same lock.
pub struct IdentityRegistry {
    entries: RwLock<IdentityMap>,
    path: PathBuf,
}

impl IdentityRegistry {
    /// Load the durable store from `path`, creating an empty one if absent.
    pub fn load(path: PathBuf) -> Arc<Self> {
        let entries = persist::load(&path);
        info!(count = entries.len(), path = %path.display(), "loaded tunnel identity store");
        Arc::new(Self { entries: RwLock::new(entries), path })
    }

    /// Reclaim-or-allocate registration. `already_bound` is whether
    /// `previous_tunnel_id` currently has a live socket bound to it
    /// — that's forwarder state, not identity state, so the caller (which
    /// holds the forwarder table) computes it and passes it in here.
    ///
    /// Returns `(tunnel_id, restored)`.
    pub async fn register(&self, previous_tunnel_id: Option<&str>, name: &str, already_bound: bool) -> (String, bool) {
        let mut entries = self.entries.write().await;

        if let Some(prev) = previous_tunnel_id {
            if !already_bound {
                if let Some(record) = entries.get_mut(prev) {
                    record.name = name.to_owned();
                    record.last_seen = tiflis_protocol::epoch_ms();
                    self.persist_locked(&entries);
                    return (prev.to_owned(), true);
                }
            }
        }

        let tunnel_id = uuid::Uuid::new_v4().to_string();
        entries.insert(tunnel_id.clone(), IdentityRecord { name: name.to_owned(), last_seen: tiflis_protocol::epoch_ms() });
        self.persist_locked(&entries);
        (tunnel_id, false)
    }

    /// Refresh `last_seen` for a live identity (called periodically while a
    /// workstation stays connected, so a tunnel restart sees a recent
    /// timestamp even if the workstation never re-registers).
    pub async fn touch(&self, tunnel_id: &str) {
        let mut entries = self.entries.write().await;
        if let Some(record) = entries.get_mut(tunnel_id) {
            record.last_seen = tiflis_protocol::epoch_ms();
            self.persist_locked(&entries);
        }
    }

    pub async fn exists(&self, tunnel_id: &str) -> bool {
        self.entries.read().await.contains_key(tunnel_id)
    }

    fn persist_locked(&self, entries: &IdentityMap) {
        if let Err(err) = persist::save(&self.path, entries) {
            tracing::warn!(%err, "failed to persist tunnel identity store");
        }
    }
}
