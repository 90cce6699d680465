// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device authentication state, subscriptions, and last-acked sequence:
//! a register/list registry generalized from pods to devices.

use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    pub authenticated: bool,
    pub subscriptions: HashSet<String>,
    pub last_acked_sequence: HashMap<String, u64>,
    pub connected_at: u64,
}

/// Tracks every device that has ever spoken on the workstation's single
/// tunnel connection. A device is "known" the moment its first frame
/// arrives (carrying `device_id`, stamped by the tunnel); it becomes
/// `authenticated` only after a successful `auth{auth_key, device_id}`.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, DeviceState>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn authenticate(&self, device_id: &str, now: u64) {
        let mut devices = self.devices.write().await;
        let entry = devices.entry(device_id.to_owned()).or_default();
        entry.authenticated = true;
        entry.connected_at = now;
    }

    /// Mark a device unauthenticated without dropping its known
    /// subscriptions — the tunnel owns the socket, so the workstation
    /// cannot forcibly disconnect a device that fails auth; it just stops
    /// acting on its frames until a new `auth` succeeds.
    pub async fn deauthenticate(&self, device_id: &str) {
        if let Some(entry) = self.devices.write().await.get_mut(device_id) {
            entry.authenticated = false;
        }
    }

    pub async fn is_authenticated(&self, device_id: &str) -> bool {
        self.devices.read().await.get(device_id).is_some_and(|d| d.authenticated)
    }

    pub async fn authenticated_device_ids(&self) -> Vec<String> {
        self.devices
            .read()
            .await
            .iter()
            .filter(|(_, d)| d.authenticated)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub async fn record_subscription(&self, device_id: &str, session_id: &str) {
        let mut devices = self.devices.write().await;
        devices.entry(device_id.to_owned()).or_default().subscriptions.insert(session_id.to_owned());
    }

    pub async fn remove_subscription(&self, device_id: &str, session_id: &str) {
        if let Some(entry) = self.devices.write().await.get_mut(device_id) {
            entry.subscriptions.remove(session_id);
        }
    }

    pub async fn remove_session_everywhere(&self, session_id: &str) {
        for entry in self.devices.write().await.values_mut() {
            entry.subscriptions.remove(session_id);
        }
    }

    /// Subscriptions for a device, intersected against `live_sessions` —
    /// used by `sync` to answer "still-living sessions only".
    pub async fn subscriptions_for(&self, device_id: &str, live_sessions: &HashSet<String>) -> Vec<String> {
        self.devices
            .read()
            .await
            .get(device_id)
            .map(|d| d.subscriptions.iter().filter(|s| live_sessions.contains(*s)).cloned().collect())
            .unwrap_or_default()
    }

    pub async fn note_ack(&self, device_id: &str, session_id: &str, sequence: u64) {
        let mut devices = self.devices.write().await;
        let entry = devices.entry(device_id.to_owned()).or_default();
        entry.last_acked_sequence.insert(session_id.to_owned(), sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unauthenticated_device_is_not_authenticated() {
        let registry = DeviceRegistry::new();
        assert!(!registry.is_authenticated("d1").await);
    }

    #[tokio::test]
    async fn authenticate_then_deauthenticate_keeps_subscriptions() {
        let registry = DeviceRegistry::new();
        registry.authenticate("d1", 1000).await;
        registry.record_subscription("d1", "s1").await;
        registry.deauthenticate("d1").await;
        assert!(!registry.is_authenticated("d1").await);
        let live = HashSet::from(["s1".to_owned()]);
        assert_eq!(registry.subscriptions_for("d1", &live).await, vec!["s1".to_owned()]);
    }

    #[tokio::test]
    async fn subscriptions_are_intersected_with_live_sessions() {
        let registry = DeviceRegistry::new();
        registry.authenticate("d1", 1000).await;
        registry.record_subscription("d1", "s1").await;
        registry.record_subscription("d1", "s2-terminated").await;
        let live = HashSet::from(["s1".to_owned()]);
        assert_eq!(registry.subscriptions_for("d1", &live).await, vec!["s1".to_owned()]);
    }
}
