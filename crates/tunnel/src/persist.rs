// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key-value store of tunnel identities: `{tunnel_id, name,
//! last_seen}` tuples, using an atomic write-tmp-then-rename strategy.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A single durable tunnel identity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub name: String,
    pub last_seen: u64,
}

pub type IdentityMap = HashMap<String, IdentityRecord>;

/// Load the identity map from disk. A missing or unreadable file is treated
/// as an empty store (first run), not an error.
pub fn load(path: &Path) -> IdentityMap {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => IdentityMap::default(),
    }
}

/// Save the identity map atomically: write to a sibling `.tmp` file, then
/// rename over the real path so a crash mid-write never corrupts it.
pub fn save(path: &Path, identities: &IdentityMap) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(identities)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.json");
        assert!(load(&path).is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.json");
        let mut map = IdentityMap::new();
        map.insert("T1".to_owned(), IdentityRecord { name: "WS".to_owned(), last_seen: 42 });
        save(&path, &map).unwrap();
        let loaded = load(&path);
        assert_eq!(loaded.get("T1").unwrap().name, "WS");
        assert_eq!(loaded.get("T1").unwrap().last_seen, 42);
    }

    #[test]
    fn save_is_atomic_no_tmp_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.json");
        save(&path, &IdentityMap::new()).unwrap();
        assert!(!path.with_extension("tmp").exists());
        assert!(path.exists());
    }
}
