//
// handshake.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

use std::path::Path;

use serde::Deserialize;

use crate::errors::Result;

/// The contents of the handshake file written by the interpreter once
/// bootstrap completes (spec.md §6.3). Not rewritten on reconnects.
#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeFile {
    pub pid: u32,
    pub release: String,

    /// The TCP port the interpreter bound its transport endpoint to. Not
    /// part of the minimal contract in spec.md §6.3 (`{pid, release}`), but
    /// the handshake file is explicitly allowed to carry more, and the
    /// server needs some way to learn the port the bootstrap script chose.
    #[serde(default)]
    pub port: Option<u16>,
}

impl HandshakeFile {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let handshake = serde_json::from_str(&contents)?;
        Ok(handshake)
    }
}
