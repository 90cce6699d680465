// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// A workstation's durable identity on a tunnel, issued at first
/// registration and persisted (see `tiflis-tunnel::identity`) so reconnects
/// after a tunnel restart resolve to the same `tunnel_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelIdentity {
    pub tunnel_id: String,
    pub workstation_name: String,
}

/// A workstation as known to the tunnel: its identity plus liveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workstation {
    #[serde(flatten)]
    pub identity: TunnelIdentity,
    pub online: bool,
    pub last_seen: u64,
}

/// A connected client device (phone, browser, CLI) subscribed to one or more
/// sessions through a tunnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    pub connected_at: u64,
}

impl Workstation {
    pub fn new(identity: TunnelIdentity, now: u64) -> Self {
        Self { identity, online: true, last_seen: now }
    }

    pub fn mark_seen(&mut self, now: u64) {
        self.online = true;
        self.last_seen = now;
    }

    pub fn mark_offline(&mut self) {
        self.online = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workstation_tracks_liveness() {
        let mut ws = Workstation::new(
            TunnelIdentity { tunnel_id: "t1".into(), workstation_name: "mac-mini".into() },
            100,
        );
        assert!(ws.online);
        ws.mark_offline();
        assert!(!ws.online);
        ws.mark_seen(200);
        assert!(ws.online);
        assert_eq!(ws.last_seen, 200);
    }
}
