// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `AudioStore`: append-only map keyed by `message_id`, holding base64 audio
//! bytes out-of-band from `sync`/history snapshots, which only ever carry
//! `has_audio: true`. Bounded by count and age so a long-running workstation
//! doesn't accumulate audio forever.

use std::collections::HashMap;
use tokio::sync::RwLock;

struct Entry {
    audio_base64: String,
    stored_at: u64,
}

pub struct AudioStore {
    entries: RwLock<HashMap<String, Entry>>,
    max_entries: usize,
    max_age_ms: u64,
}

impl AudioStore {
    pub fn new(max_entries: usize, max_age_ms: u64) -> Self {
        Self { entries: RwLock::new(HashMap::new()), max_entries, max_age_ms }
    }

    pub async fn put(&self, message_id: impl Into<String>, audio_base64: impl Into<String>, now: u64) {
        let mut entries = self.entries.write().await;
        entries.insert(message_id.into(), Entry { audio_base64: audio_base64.into(), stored_at: now });
        if entries.len() > self.max_entries {
            // Evict the oldest entry; a map has no FIFO order so scan once.
            if let Some(oldest) = entries.iter().min_by_key(|(_, e)| e.stored_at).map(|(k, _)| k.clone()) {
                entries.remove(&oldest);
            }
        }
    }

    /// Returns `None` if the clip was never stored or has aged out.
    pub async fn get(&self, message_id: &str, now: u64) -> Option<String> {
        let entries = self.entries.read().await;
        let entry = entries.get(message_id)?;
        if now.saturating_sub(entry.stored_at) > self.max_age_ms {
            return None;
        }
        Some(entry.audio_base64.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_retrieves_by_message_id() {
        let store = AudioStore::new(10, 60_000);
        store.put("m1", "YWJj", 1000).await;
        assert_eq!(store.get("m1", 1100).await.as_deref(), Some("YWJj"));
    }

    #[tokio::test]
    async fn missing_message_id_returns_none() {
        let store = AudioStore::new(10, 60_000);
        assert!(store.get("nope", 0).await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_treated_as_not_found() {
        let store = AudioStore::new(10, 1_000);
        store.put("m1", "YWJj", 0).await;
        assert!(store.get("m1", 5_000).await.is_none());
    }

    #[tokio::test]
    async fn oldest_entry_evicted_once_capacity_exceeded() {
        let store = AudioStore::new(2, 60_000);
        store.put("m1", "a", 1).await;
        store.put("m2", "b", 2).await;
        store.put("m3", "c", 3).await;
        assert!(store.get("m1", 10).await.is_none());
        assert!(store.get("m3", 10).await.is_some());
    }
}
