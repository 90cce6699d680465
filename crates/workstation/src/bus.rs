// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription & broadcast bus: per-session (not single-global) subscriber
//! sets with FIFO master election.
//!
//! A session's output is only worth emitting when it has at least one
//! subscriber; `has_subscribers` is the gate every session actor checks
//! before producing a `session.output`/PTY chunk. The workstation has a
//! single outbound connection to the tunnel (the tunnel does the literal
//! per-client fan-out), so this bus tracks *identity and order* of
//! subscribers, not per-device delivery queues.

use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct SubscriberSet {
    /// Insertion order. The first entry is always the master for terminal
    /// sessions; promotion on departure is strictly FIFO.
    order: Vec<String>,
}

impl SubscriberSet {
    fn master(&self) -> Option<&str> {
        self.order.first().map(String::as_str)
    }
}

#[derive(Default)]
pub struct SessionBus {
    sets: RwLock<HashMap<String, SubscriberSet>>,
}

impl SessionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `device_id` to `session_id`'s subscriber set. Returns `true`
    /// if this device is (now) the master, i.e. it's the first subscriber.
    pub async fn subscribe(&self, session_id: &str, device_id: &str) -> bool {
        let mut sets = self.sets.write().await;
        let set = sets.entry(session_id.to_owned()).or_default();
        if !set.order.iter().any(|d| d == device_id) {
            set.order.push(device_id.to_owned());
        }
        set.master() == Some(device_id)
    }

    /// Detach `device_id`. Returns the newly-promoted master's device id if
    /// mastership changed as a result — the next device in insertion order.
    pub async fn unsubscribe(&self, session_id: &str, device_id: &str) -> Option<String> {
        let mut sets = self.sets.write().await;
        let Some(set) = sets.get_mut(session_id) else { return None };
        let was_master = set.master() == Some(device_id);
        set.order.retain(|d| d != device_id);
        if was_master {
            set.master().map(str::to_owned)
        } else {
            None
        }
    }

    pub async fn is_master(&self, session_id: &str, device_id: &str) -> bool {
        self.sets.read().await.get(session_id).and_then(SubscriberSet::master) == Some(device_id)
    }

    pub async fn master_of(&self, session_id: &str) -> Option<String> {
        self.sets.read().await.get(session_id).and_then(SubscriberSet::master).map(str::to_owned)
    }

    pub async fn has_subscribers(&self, session_id: &str) -> bool {
        self.sets.read().await.get(session_id).is_some_and(|s| !s.order.is_empty())
    }

    pub async fn subscriber_count(&self, session_id: &str) -> usize {
        self.sets.read().await.get(session_id).map(|s| s.order.len()).unwrap_or(0)
    }

    pub async fn remove_session(&self, session_id: &str) {
        self.sets.write().await.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_subscriber_becomes_master() {
        let bus = SessionBus::new();
        assert!(bus.subscribe("s1", "d1").await);
        assert!(!bus.subscribe("s1", "d2").await);
        assert!(bus.is_master("s1", "d1").await);
        assert!(!bus.is_master("s1", "d2").await);
    }

    #[tokio::test]
    async fn master_leaving_promotes_next_in_fifo_order() {
        let bus = SessionBus::new();
        bus.subscribe("s1", "d1").await;
        bus.subscribe("s1", "d2").await;
        bus.subscribe("s1", "d3").await;
        let promoted = bus.unsubscribe("s1", "d1").await;
        assert_eq!(promoted.as_deref(), Some("d2"));
        assert!(bus.is_master("s1", "d2").await);
    }

    #[tokio::test]
    async fn non_master_leaving_does_not_change_mastership() {
        let bus = SessionBus::new();
        bus.subscribe("s1", "d1").await;
        bus.subscribe("s1", "d2").await;
        let promoted = bus.unsubscribe("s1", "d2").await;
        assert_eq!(promoted, None);
        assert!(bus.is_master("s1", "d1").await);
    }

    #[tokio::test]
    async fn session_with_no_subscribers_has_none() {
        let bus = SessionBus::new();
        assert!(!bus.has_subscribers("s1").await);
    }
}
