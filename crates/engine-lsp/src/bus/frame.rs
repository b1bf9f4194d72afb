//
// frame.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// A single message on the wire: a topic name and an arbitrary JSON payload.
///
/// Frames are length-delimited with a `Content-Length` header, the same
/// framing `tower-lsp` uses for the editor-facing side of this process, so
/// the two transports in this binary share one mental model even though
/// they're unrelated wires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub channel: String,
    pub payload: Value,

    /// Present on every frame sent to a locally launched interpreter,
    /// absent for attached connections (spec.md §4.1).
    #[serde(rename = "apiKey", skip_serializing_if = "Option::is_none", default)]
    pub api_key: Option<String>,
}

impl Frame {
    pub fn new(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
            api_key: None,
        }
    }

    pub fn with_api_key(channel: impl Into<String>, payload: Value, api_key: Option<String>) -> Self {
        Self {
            channel: channel.into(),
            payload,
            api_key,
        }
    }

    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let body = serde_json::to_vec(self)?;
        let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        out.extend_from_slice(&body);
        Ok(out)
    }
}
