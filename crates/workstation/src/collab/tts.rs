// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{CollaboratorError, COLLABORATOR_TIMEOUT};

/// Text-to-speech collaborator client: summarizes assistant output to a few
/// sentences, synthesizes it, and the caller emits the result as a
/// `voice_output`.
pub struct TtsClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

pub struct Synthesized {
    pub audio_base64: String,
    pub duration: Option<f64>,
}

impl TtsClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(COLLABORATOR_TIMEOUT).build()?;
        Ok(Self { client, endpoint: endpoint.into(), api_key })
    }

    pub async fn synthesize(&self, text: &str) -> Result<Synthesized, CollaboratorError> {
        let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({ "text": text }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| CollaboratorError(format!("tts request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(CollaboratorError(format!("tts returned {}", response.status())));
        }
        let body: serde_json::Value = response.json().await.map_err(|e| CollaboratorError(format!("tts response decode failed: {e}")))?;
        let audio_base64 = body
            .get("audio")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| CollaboratorError("tts response missing `audio`".to_owned()))?;
        let duration = body.get("duration").and_then(|v| v.as_f64());
        Ok(Synthesized { audio_base64, duration })
    }
}

/// Trim assistant output to at most `max_sentences` sentences before handing
/// it to TTS; a crude but deterministic split on sentence-ending punctuation
/// is sufficient here since real sentence segmentation belongs to the TTS
/// collaborator, not the core.
pub fn summarize_for_speech(text: &str, max_sentences: usize) -> String {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            sentences.push(current.trim().to_owned());
            current.clear();
            if sentences.len() == max_sentences {
                break;
            }
        }
    }
    if sentences.is_empty() && !current.trim().is_empty() {
        sentences.push(current.trim().to_owned());
    }
    sentences.join(" ")
}
