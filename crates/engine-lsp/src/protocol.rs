//
// protocol.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! Custom notifications outside the core LSP surface (spec.md §7
//! "User-visible"): connection-status transitions and feature-unavailable
//! warnings. Grounded on the `LSPNotification` pattern other LSP
//! implementations in the wider Rust ecosystem use for server-to-client
//! extensions (a zero-variant enum implementing `tower_lsp`'s
//! `Notification` trait with a custom method name).

use serde::Deserialize;
use serde::Serialize;
use tower_lsp::lsp_types::notification::Notification;

/// `engine/connectionStatus`: fired on every interpreter lifecycle
/// transition (spec.md §7).
#[derive(Debug)]
pub enum ConnectionStatus {}

impl Notification for ConnectionStatus {
    type Params = ConnectionStatusParams;
    const METHOD: &'static str = "engine/connectionStatus";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatusParams {
    pub status: ConnectionState,
}

/// `engine/featureUnavailable`: sent when a feature returns early because
/// the interpreter isn't reachable under the current connection policy
/// (spec.md §7 `InterpreterUnavailable`).
#[derive(Debug)]
pub enum FeatureUnavailable {}

impl Notification for FeatureUnavailable {
    type Params = FeatureUnavailableParams;
    const METHOD: &'static str = "engine/featureUnavailable";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureUnavailableParams {
    pub feature: String,
}
