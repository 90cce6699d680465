// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Self-describing wire record. Every message crossing a tunnel or
/// workstation connection is one of these.
///
/// `payload` is left as an untyped `Value` here and narrowed by the
/// receiving component against the [`crate::messages`] catalog for its
/// `type`. The tunnel never inspects `payload` at all — it routes on `type`
/// and the envelope's own routing keys, nothing deeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Identifies which device an envelope is addressed to or came from.
    /// On client→workstation frames the tunnel stamps this itself from
    /// which client socket the frame arrived on — a routing key, not a
    /// payload inspection. On workstation→client frames the workstation
    /// sets it to target a reply at one device even though every frame
    /// physically rides the same blind fan-out to the tunnel; frames with
    /// no particular addressee (broadcasts like `session.created`) leave it
    /// unset and every bound device receives them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), id: None, session_id: None, device_id: None, payload: None, sequence: None, timestamp: None }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Deserialize `payload` into a concrete type, failing with
    /// [`crate::ErrorCode::InvalidPayload`] semantics if absent or
    /// malformed. Callers convert the `serde_json::Error` into the wire
    /// error themselves so the protocol crate stays error-vocabulary-agnostic
    /// beyond `ErrorCode`.
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        let value = self.payload.clone().unwrap_or(Value::Null);
        serde_json::from_value(value)
    }
}

/// Current wire protocol version. Deployments on "1.0" predate fields added
/// since; this workstation advertises "1.10" but still accepts "1.0"
/// handshakes from older clients.
pub const PROTOCOL_VERSION: &str = "1.10";

/// Versions this implementation accepts on `auth`/`workstation.register`.
pub const COMPATIBLE_PROTOCOL_VERSIONS: &[&str] = &["1.0", "1.10"];

pub fn is_compatible_protocol_version(version: &str) -> bool {
    COMPATIBLE_PROTOCOL_VERSIONS.contains(&version)
}

/// Return current epoch millis, used to stamp `timestamp` fields.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
