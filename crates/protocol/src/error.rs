// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error codes shared across the tunnel and workstation wire protocols.
///
/// `http_status` is used by the tunnel's long-poll HTTP surface, `as_str` is
/// the wire-level `code` string carried in `error`/`response` envelopes and
/// `audio.response{error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidApiKey,
    RegistrationFailed,
    WorkstationOffline,
    TunnelNotFound,
    InvalidAuthKey,
    SessionNotFound,
    SessionBusy,
    InvalidPayload,
    Internal,
    QueueOverflow,
    BackpressureExceeded,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidApiKey => 401,
            Self::RegistrationFailed => 400,
            Self::WorkstationOffline => 503,
            Self::TunnelNotFound => 404,
            Self::InvalidAuthKey => 401,
            Self::SessionNotFound => 404,
            Self::SessionBusy => 409,
            Self::InvalidPayload => 400,
            Self::Internal => 500,
            Self::QueueOverflow => 507,
            Self::BackpressureExceeded => 503,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::RegistrationFailed => "REGISTRATION_FAILED",
            Self::WorkstationOffline => "WORKSTATION_OFFLINE",
            Self::TunnelNotFound => "TUNNEL_NOT_FOUND",
            Self::InvalidAuthKey => "INVALID_AUTH_KEY",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionBusy => "SESSION_BUSY",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::Internal => "INTERNAL_ERROR",
            Self::QueueOverflow => "QUEUE_OVERFLOW",
            Self::BackpressureExceeded => "BACKPRESSURE_EXCEEDED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error body carried in `error` envelopes and HTTP error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorCode {
    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings_match_spec_vocabulary() {
        assert_eq!(ErrorCode::SessionBusy.as_str(), "SESSION_BUSY");
        assert_eq!(ErrorCode::QueueOverflow.as_str(), "QUEUE_OVERFLOW");
        assert_eq!(ErrorCode::BackpressureExceeded.as_str(), "BACKPRESSURE_EXCEEDED");
    }

    #[test]
    fn http_status_is_4xx_or_5xx() {
        for code in [
            ErrorCode::InvalidApiKey,
            ErrorCode::SessionNotFound,
            ErrorCode::SessionBusy,
            ErrorCode::Internal,
            ErrorCode::QueueOverflow,
        ] {
            assert!(code.http_status() >= 400);
        }
    }
}
