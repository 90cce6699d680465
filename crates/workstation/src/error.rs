// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire error vocabulary. The workstation shares `ErrorCode` with the tunnel
//! (defined once in `tiflis-protocol` so the two runtimes never drift);
//! `anyhow` is used instead at the process/setup boundary (config
//! validation, socket and file IO).

pub use tiflis_protocol::{ErrorBody, ErrorCode};

use tiflis_protocol::Envelope;

/// Build an `error` envelope body, optionally correlated to a request `id`.
pub fn error_envelope(code: ErrorCode, message: impl Into<String>, id: Option<&str>) -> Envelope {
    let mut env = Envelope::new("error").with_payload(&code.to_error_body(message)).unwrap_or_else(|_| Envelope::new("error"));
    if let Some(id) = id {
        env = env.with_id(id.to_owned());
    }
    env
}
