// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{CollaboratorError, COLLABORATOR_TIMEOUT};

/// Speech-to-text collaborator client. The concrete provider (and its API
/// key) is external configuration; this client only speaks the
/// request/response contract the core needs: base64 audio in, transcribed
/// text out.
pub struct SttClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl SttClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(COLLABORATOR_TIMEOUT).build()?;
        Ok(Self { client, endpoint: endpoint.into(), api_key })
    }

    pub async fn transcribe(&self, audio_base64: &str, audio_format: Option<&str>, language: Option<&str>) -> Result<String, CollaboratorError> {
        let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
            "audio": audio_base64,
            "format": audio_format,
            "language": language,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| CollaboratorError(format!("stt request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(CollaboratorError(format!("stt returned {}", response.status())));
        }
        let body: serde_json::Value = response.json().await.map_err(|e| CollaboratorError(format!("stt response decode failed: {e}")))?;
        body.get("text")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| CollaboratorError("stt response missing `text`".to_owned()))
    }
}
