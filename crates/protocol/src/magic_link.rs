// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload encoded into a `tiflis://connect?data=<base64url(JSON)>` bootstrap
/// URI. `url` is the base endpoint only; `tunnel_id` travels inside the JSON
/// rather than as a query parameter so it can't be tampered with by a proxy
/// that rewrites the query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicLinkPayload {
    pub tunnel_id: String,
    pub url: String,
    pub key: String,
}

#[derive(Debug)]
pub enum MagicLinkError {
    Base64,
    Json(serde_json::Error),
}

impl fmt::Display for MagicLinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base64 => f.write_str("invalid base64 data"),
            Self::Json(err) => write!(f, "invalid magic link json: {err}"),
        }
    }
}

impl From<serde_json::Error> for MagicLinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl MagicLinkPayload {
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(data: &str) -> Result<Self, MagicLinkError> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(data)
            .map_err(|_| MagicLinkError::Base64)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn round_trips_for_any_field_values(tunnel_id in ".{0,64}", url in ".{0,128}", key in ".{0,64}") {
            let payload = MagicLinkPayload { tunnel_id, url, key };
            let encoded = payload.encode();
            let decoded = MagicLinkPayload::decode(&encoded).expect("round-trip decode");
            prop_assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn round_trips_through_base64url() {
        let payload = MagicLinkPayload {
            tunnel_id: "t1".into(),
            url: "wss://relay.example/ws".into(),
            key: "secret".into(),
        };
        let encoded = payload.encode();
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        let decoded = MagicLinkPayload::decode(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn rejects_malformed_base64() {
        assert!(matches!(MagicLinkPayload::decode("not valid base64!!"), Err(MagicLinkError::Base64)));
    }
}
