// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/WS mapping for the shared wire error vocabulary.
//!
//! The tunnel speaks the same `ErrorCode` vocabulary as the workstation
//! (defined once in `tiflis-protocol` so the two runtimes can never drift);
//! this module only adapts it onto axum response types.

use axum::http::StatusCode;
use axum::Json;

use tiflis_protocol::ErrorCode;

/// Top-level error response envelope for HTTP endpoints.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: tiflis_protocol::ErrorBody,
}

/// Render an `ErrorCode` as an axum `(StatusCode, Json<ErrorResponse>)`.
pub fn to_http_response(code: ErrorCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    let status = StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorResponse {
        error: code.to_error_body(message),
    };
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_not_found_maps_to_404() {
        let (status, _) = to_http_response(ErrorCode::TunnelNotFound, "no such tunnel");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_api_key_maps_to_401() {
        let (status, _) = to_http_response(ErrorCode::InvalidApiKey, "bad key");
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
