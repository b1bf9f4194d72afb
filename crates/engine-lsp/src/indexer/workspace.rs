//
// workspace.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! The workspace indexer (spec.md §4.5): bulk-indexes whole folder trees,
//! streaming one `parseAndStore` per file back from the interpreter under a
//! single request id.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

use crate::config::Configuration;
use crate::index::raw::RawCodeData;
use crate::index::SymbolIndex;
use crate::interpreter::InterpreterManager;

/// No single file's response is expected to take long, but the whole stream
/// for a large workspace might; this bounds the gap between two messages,
/// not the whole index operation.
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceIndexMessage {
    file_path: String,
    code_data: RawCodeData,
    is_done: bool,
}

#[derive(Clone)]
pub struct WorkspaceIndexer {
    interpreter: InterpreterManager,
    index: Arc<RwLock<SymbolIndex>>,
    enabled: Arc<AtomicBool>,
    next_request_id: Arc<AtomicU64>,
}

impl WorkspaceIndexer {
    pub fn new(interpreter: InterpreterManager, index: Arc<RwLock<SymbolIndex>>) -> Self {
        Self {
            interpreter,
            index,
            enabled: Arc::new(AtomicBool::new(false)),
            next_request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Enables the component only if the client advertises workspace
    /// folder support (spec.md §4.5).
    pub fn setup(&self, client_supports_workspace_folders: bool) {
        self.enabled.store(client_supports_workspace_folders, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// No-op if disabled or the interpreter is disconnected; otherwise
    /// indexes every given folder.
    pub async fn index_workspace(&self, folders: Vec<Url>, config: &Configuration) {
        if !self.is_enabled() {
            return;
        }
        if !self.interpreter.is_connected().await {
            return;
        }
        self.index_folders(folders, config).await;
    }

    /// Allocates a request id, subscribes to the per-request response
    /// channel, publishes the bulk request, and stores each streamed file
    /// as it arrives, unsubscribing once `isDone` is seen.
    ///
    /// Honors `indexWorkspace` (spec.md §6.4) directly, since this is the
    /// entry point every caller (`index_workspace`, workspace-folder
    /// changes, class-closure expansion) eventually funnels through.
    pub async fn index_folders(&self, folders: Vec<Url>, config: &Configuration) {
        if folders.is_empty() || !config.index_workspace {
            return;
        }

        let bus = match self.interpreter.ensure_connection(config).await {
            Ok(bus) => bus,
            Err(_) => return,
        };

        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let response_channel = format!("/indexWorkspace/response/{request_id}");

        let (subscription, mut rx) = match bus.subscribe(response_channel) {
            Ok(pair) => pair,
            Err(_) => return,
        };

        let folder_paths: Vec<String> = folders.iter().map(Url::to_string).collect();
        bus.publish(
            "/indexWorkspace/request",
            serde_json::json!({
                "requestId": request_id,
                "folders": folder_paths,
            }),
        );

        loop {
            let message = match tokio::time::timeout(MESSAGE_TIMEOUT, rx.recv()).await {
                Ok(Some(message)) => message,
                Ok(None) | Err(_) => break,
            };

            let parsed: WorkspaceIndexMessage = match serde_json::from_value(message) {
                Ok(parsed) => parsed,
                Err(err) => {
                    log::warn!("malformed workspace-index message: {err}");
                    continue;
                }
            };

            if let Ok(uri) = parse_file_path(&parsed.file_path) {
                self.index.write().await.parse_and_store(uri, parsed.code_data);
            } else {
                log::warn!("workspace-index message had an unusable filePath: {}", parsed.file_path);
            }

            if parsed.is_done {
                break;
            }
        }

        bus.unsubscribe(subscription);
    }
}

fn parse_file_path(raw: &str) -> Result<Url, ()> {
    Url::parse(raw).or_else(|_| Url::from_file_path(raw).map_err(|_| ()))
}
