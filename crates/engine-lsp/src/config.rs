//
// config.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! Server configuration, sourced from CLI flags at launch and refreshed via
//! the LSP `workspace/configuration` mechanism (spec.md §6.4).

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// When the server should establish a connection to the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionTiming {
    /// Connect right after the LSP `initialized` notification.
    #[default]
    OnStart,
    /// Connect lazily, the first time a feature needs the interpreter.
    OnDemand,
    /// Never connect; on-demand features report `InterpreterUnavailable`.
    Never,
}

/// Configuration recognized by the server, mirroring spec.md §6.4 exactly.
/// Field names match the wire keys the client sends via
/// `workspace/configuration`, since `serde` deserializes these directly out
/// of that JSON payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Extra argv appended to the interpreter launch command line.
    #[serde(default)]
    pub matlab_launch_command_args: Vec<String>,

    /// Base directory from which to derive the interpreter binary.
    #[serde(default)]
    pub matlab_install_path: Option<PathBuf>,

    #[serde(default)]
    pub matlab_connection_timing: ConnectionTiming,

    /// Whether the workspace indexer is enabled at all.
    #[serde(default = "default_true")]
    pub index_workspace: bool,

    /// URL of an already-running interpreter to attach to, instead of
    /// spawning an owned process.
    #[serde(default)]
    pub matlab_url: Option<String>,
}

fn default_true() -> bool {
    true
}
