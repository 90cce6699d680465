// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application (end-to-end) heartbeat, distinct from the transport-level
//! ping/pong (both are necessary; this module only speaks for the
//! application layer). Devices send `heartbeat{id, timestamp}` every 10s;
//! the workstation replies `heartbeat.ack{id, timestamp,
//! workstation_uptime_ms}` immediately, carrying a correlation `id` and
//! uptime instead of a bare timestamp echo.

use tiflis_protocol::messages::{Heartbeat, HeartbeatAck};
use tiflis_protocol::{epoch_ms, Envelope};

pub fn build_ack(request: &Heartbeat, uptime_ms: u64) -> Envelope {
    let ack = HeartbeatAck { id: request.id.clone(), timestamp: request.timestamp, workstation_uptime_ms: uptime_ms };
    Envelope::new("heartbeat.ack")
        .with_payload(&ack)
        .unwrap_or_else(|_| Envelope::new("heartbeat.ack"))
        .with_timestamp(epoch_ms())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_echoes_request_id_and_timestamp() {
        let request = Heartbeat { id: "h1".into(), timestamp: 1000 };
        let env = build_ack(&request, 42);
        let ack: HeartbeatAck = env.payload_as().unwrap();
        assert_eq!(ack.id, "h1");
        assert_eq!(ack.timestamp, 1000);
        assert_eq!(ack.workstation_uptime_ms, 42);
    }
}
