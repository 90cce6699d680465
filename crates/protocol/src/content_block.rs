// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// A typed unit of streamed assistant output with a stable `id`, unique
/// within its producing turn.
///
/// Tagged union: exhaustive matching on `kind` replaces a class hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: String,
    #[serde(flatten)]
    pub kind: ContentBlockKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "block_type", rename_all = "snake_case")]
pub enum ContentBlockKind {
    Text { text: String },
    Code {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        text: String,
    },
    Tool {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
        status: ToolStatus,
    },
    Thinking { text: String },
    Status { text: String },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
    },
    Cancel { message: String },
    VoiceInput {
        has_audio: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
    },
    VoiceOutput {
        message_id: String,
        has_audio: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
    },
    ActionButtons { buttons: Vec<ActionButton> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionButton {
    pub label: String,
    pub value: String,
}

impl ContentBlock {
    pub fn new(id: impl Into<String>, kind: ContentBlockKind) -> Self {
        Self { id: id.into(), kind }
    }

    pub fn cancel(id: impl Into<String>) -> Self {
        Self::new(id, ContentBlockKind::Cancel { message: "Cancelled by user".to_owned() })
    }
}
