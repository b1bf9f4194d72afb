//
// backend.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! The `tower_lsp::LanguageServer` implementation. Grounded on
//! `ark-lsp::backend::Backend`: a thin dispatcher holding a client handle
//! and a `RwLock`-guarded world state, delegating everything else.

use std::sync::Arc;

use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result as RpcResult;
use tower_lsp::lsp_types::*;
use tower_lsp::Client;
use tower_lsp::LanguageServer;
use tower_lsp::LspService;
use tower_lsp::Server;

use crate::config::Configuration;
use crate::config::ConnectionTiming;
use crate::document_symbols;
use crate::navigation;
use crate::protocol::ConnectionState;
use crate::protocol::ConnectionStatus;
use crate::protocol::ConnectionStatusParams;
use crate::protocol::FeatureUnavailable;
use crate::protocol::FeatureUnavailableParams;
use crate::providers;
use crate::state::WorldState;

pub struct Backend {
    client: Client,
    state: Arc<RwLock<WorldState>>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            state: Arc::new(RwLock::new(WorldState::new())),
        }
    }

    async fn notify_status(&self, status: ConnectionState) {
        self.client
            .send_notification::<ConnectionStatus>(ConnectionStatusParams { status })
            .await;
    }

    async fn notify_unavailable(&self, feature: &str) {
        self.client
            .send_notification::<FeatureUnavailable>(FeatureUnavailableParams {
                feature: feature.to_string(),
            })
            .await;
    }

    /// Re-indexes every currently open buffer; used both right after the
    /// interpreter first connects and on every later reconnect (spec.md
    /// S5: "next connection event triggers re-index of all open docs").
    async fn reindex_open_documents(&self) {
        let state = self.state.read().await;
        let config = state.config.clone();
        let open: Vec<Url> = state.documents.read().await.keys().cloned().collect();
        for uri in open {
            state.document_indexer.queue_index(uri, config.clone()).await;
        }
    }

    /// Spawns the long-lived task that watches the interpreter's lifecycle
    /// events and mirrors them onto the LSP connection-status notification,
    /// re-indexing open buffers on every reconnect.
    fn spawn_lifecycle_watcher(&self) {
        let client = self.client.clone();
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let mut lifecycle = {
                let state = state.read().await;
                match state.interpreter.ensure_connection(&state.config).await {
                    Ok(bus) => bus.subscribe_lifecycle(),
                    Err(_) => return,
                }
            };

            loop {
                match lifecycle.recv().await {
                    Ok(crate::bus::ConnectionEvent::Connected) => {
                        client
                            .send_notification::<ConnectionStatus>(ConnectionStatusParams {
                                status: ConnectionState::Connected,
                            })
                            .await;

                        let state = state.read().await;
                        let config = state.config.clone();
                        let open: Vec<Url> = state.documents.read().await.keys().cloned().collect();
                        for uri in open {
                            state.document_indexer.queue_index(uri, config.clone()).await;
                        }
                    }
                    Ok(crate::bus::ConnectionEvent::Disconnected) => {
                        client
                            .send_notification::<ConnectionStatus>(ConnectionStatusParams {
                                status: ConnectionState::Disconnected,
                            })
                            .await;
                    }
                    Err(_) => break,
                }
            }
        });
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> RpcResult<InitializeResult> {
        log::info!("initializing");

        let supports_workspace_folders = params
            .capabilities
            .workspace
            .as_ref()
            .and_then(|w| w.workspace_folders)
            .unwrap_or(false);

        let mut state = self.state.write().await;
        if let Some(folders) = params.workspace_folders {
            state.workspace_folders = folders.into_iter().map(|f| f.uri).collect();
        }
        state.workspace_indexer.setup(supports_workspace_folders);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
                document_formatting_provider: Some(OneOf::Left(true)),
                code_action_provider: Some(CodeActionProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(
                        [".", "(", ",", "/", "\\", " "].iter().map(|s| s.to_string()).collect(),
                    ),
                    ..Default::default()
                }),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(vec![String::from("("), String::from(",")]),
                    ..Default::default()
                }),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![
                        "engine.filterDiagnosticsByLine".to_string(),
                        "engine.filterDiagnosticsByFile".to_string(),
                    ],
                    ..Default::default()
                }),
                document_symbol_provider: Some(OneOf::Left(true)),
                folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: String::from("engine-lsp"),
                version: Some(String::from(env!("CARGO_PKG_VERSION"))),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        log::info!("initialized");

        let (config, folders, timing) = {
            let state = self.state.read().await;
            (state.config.clone(), state.workspace_folders.clone(), state.config.matlab_connection_timing)
        };

        if timing == ConnectionTiming::OnStart {
            self.notify_status(ConnectionState::Connecting).await;

            let state = self.state.read().await;
            match state.interpreter.ensure_connection(&config).await {
                Ok(_) => {
                    drop(state);
                    self.notify_status(ConnectionState::Connected).await;
                    self.spawn_lifecycle_watcher();

                    let state = self.state.read().await;
                    state.workspace_indexer.index_workspace(folders, &config).await;
                }
                Err(_) => {
                    self.notify_status(ConnectionState::Disconnected).await;
                    self.notify_unavailable("interpreter").await;
                }
            }
        }
    }

    async fn shutdown(&self) -> RpcResult<()> {
        log::info!("shutting down");
        self.state.read().await.interpreter.shutdown().await;
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        let text = params.text_document.text;

        let state = self.state.read().await;
        state.open_document(uri.clone(), text.clone()).await;
        drop(state);

        self.publish_diagnostics(&uri, &text).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        // `TextDocumentSyncKind::FULL` guarantees a single whole-document
        // change event.
        let Some(change) = params.content_changes.into_iter().next() else {
            return;
        };
        let text = change.text;

        let state = self.state.read().await;
        state.change_document(uri.clone(), text.clone()).await;
        drop(state);

        self.publish_diagnostics(&uri, &text).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.state.read().await.close_document(&params.text_document.uri).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        let text = {
            let state = self.state.read().await;
            state.documents.read().await.get(&uri).cloned()
        };
        if let Some(text) = text {
            self.publish_diagnostics(&uri, &text).await;
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        if let Ok(config) = serde_json::from_value::<Configuration>(params.settings) {
            self.state.write().await.config = config;
        }
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        let mut state = self.state.write().await;
        for removed in params.event.removed {
            state.workspace_folders.retain(|f| *f != removed.uri);
        }
        let added: Vec<Url> = params.event.added.into_iter().map(|f| f.uri).collect();
        state.workspace_folders.extend(added.iter().cloned());

        if state.workspace_indexer.is_enabled() {
            let config = state.config.clone();
            state.workspace_indexer.index_folders(added, &config).await;
        }
    }

    async fn goto_definition(&self, params: GotoDefinitionParams) -> RpcResult<Option<GotoDefinitionResponse>> {
        let pos = params.text_document_position_params;
        let uri = pos.text_document.uri;
        let line = pos.position.line;
        let character = pos.position.character;

        let state = self.state.read().await;
        let Some(line_text) = self.line_text(&state, &uri, line).await else {
            return Ok(None);
        };
        let Some(resolver) = state.path_resolver().await else {
            return Ok(None);
        };

        let mut index = state.index.write().await;
        let locations = navigation::find_definition(&mut index, &resolver, &uri, &line_text, line, character).await;
        drop(index);
        drop(state);

        if locations.is_empty() {
            return Ok(None);
        }
        Ok(Some(GotoDefinitionResponse::Array(
            locations
                .into_iter()
                .map(|loc| Location::new(loc.uri, to_lsp_range(loc.range)))
                .collect(),
        )))
    }

    async fn references(&self, params: ReferenceParams) -> RpcResult<Option<Vec<Location>>> {
        let pos = params.text_document_position;
        let uri = pos.text_document.uri;
        let line = pos.position.line;
        let character = pos.position.character;

        let state = self.state.read().await;
        let Some(line_text) = self.line_text(&state, &uri, line).await else {
            return Ok(None);
        };

        let index = state.index.read().await;
        let locations = navigation::find_references(&index, &uri, &line_text, line, character);
        drop(index);
        drop(state);

        if locations.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            locations
                .into_iter()
                .map(|loc| Location::new(loc.uri, to_lsp_range(loc.range)))
                .collect(),
        ))
    }

    async fn document_symbol(&self, params: DocumentSymbolParams) -> RpcResult<Option<DocumentSymbolResponse>> {
        let state = self.state.read().await;
        let index = state.index.read().await;
        Ok(document_symbols::document_symbols(&index, &params.text_document.uri)
            .map(DocumentSymbolResponse::Nested))
    }

    async fn completion(&self, params: CompletionParams) -> RpcResult<Option<CompletionResponse>> {
        let pos = params.text_document_position;
        let uri = pos.text_document.uri;

        let state = self.state.read().await;
        let Some(text) = state.documents.read().await.get(&uri).cloned() else {
            return Ok(None);
        };
        let Ok(bus) = state.interpreter.ensure_connection(&state.config).await else {
            drop(state);
            self.notify_unavailable("completion").await;
            return Ok(None);
        };
        drop(state);

        let offset = offset_at(&text, pos.position);
        match providers::completion::completions(&bus, &text, uri.as_str(), offset as u32).await {
            Ok(items) if !items.is_empty() => Ok(Some(CompletionResponse::Array(items))),
            _ => Ok(None),
        }
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> RpcResult<Option<SignatureHelp>> {
        let pos = params.text_document_position_params;
        let uri = pos.text_document.uri;

        let state = self.state.read().await;
        let Some(text) = state.documents.read().await.get(&uri).cloned() else {
            return Ok(None);
        };
        let Ok(bus) = state.interpreter.ensure_connection(&state.config).await else {
            drop(state);
            self.notify_unavailable("signatureHelp").await;
            return Ok(None);
        };
        drop(state);

        let offset = offset_at(&text, pos.position);
        Ok(providers::signature_help::signature_help(&bus, &text, uri.as_str(), offset as u32)
            .await
            .unwrap_or(None))
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> RpcResult<Option<Vec<TextEdit>>> {
        let uri = params.text_document.uri;

        let state = self.state.read().await;
        let Some(text) = state.documents.read().await.get(&uri).cloned() else {
            return Ok(None);
        };
        let Ok(bus) = state.interpreter.ensure_connection(&state.config).await else {
            drop(state);
            self.notify_unavailable("format").await;
            return Ok(None);
        };
        drop(state);

        match providers::format::format_document(&bus, &text, &params.options).await {
            Ok(edits) => Ok(Some(edits)),
            Err(_) => Ok(None),
        }
    }

    async fn folding_range(&self, params: FoldingRangeParams) -> RpcResult<Option<Vec<FoldingRange>>> {
        let uri = params.text_document.uri;

        let state = self.state.read().await;
        let Some(text) = state.documents.read().await.get(&uri).cloned() else {
            return Ok(None);
        };
        let Ok(bus) = state.interpreter.ensure_connection(&state.config).await else {
            drop(state);
            return Ok(None);
        };
        drop(state);

        match providers::folding::folding_ranges(&bus, &text).await {
            Ok(ranges) => Ok(Some(ranges)),
            Err(_) => Ok(None),
        }
    }

    async fn code_action(&self, params: CodeActionParams) -> RpcResult<Option<CodeActionResponse>> {
        // Diagnostics carry everything a quick-fix needs already; no
        // additional interpreter round trip is defined for this surface
        // (spec.md §4.8 treats providers as thin bus wrappers, and no
        // `/codeAction` channel is named in §6.1).
        let _ = params;
        Ok(None)
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> RpcResult<Option<serde_json::Value>> {
        match params.command.as_str() {
            "engine.filterDiagnosticsByLine" => {
                let Some(uri) = params.arguments.first().and_then(|v| v.as_str()).and_then(|s| Url::parse(s).ok())
                else {
                    return Ok(None);
                };
                let Some(line_number) = params.arguments.get(1).and_then(|v| v.as_u64()).map(|n| n as u32) else {
                    return Ok(None);
                };

                let state = self.state.read().await;
                let Some(text) = state.documents.read().await.get(&uri).cloned() else {
                    return Ok(None);
                };
                let Ok(bus) = state.interpreter.ensure_connection(&state.config).await else {
                    return Ok(None);
                };
                drop(state);

                let resolved_line = providers::lint::is_end_of_statement(&bus, &text, line_number)
                    .await
                    .unwrap_or(line_number);
                Ok(Some(serde_json::json!({ "lineNumber": resolved_line })))
            }
            "engine.filterDiagnosticsByFile" => {
                let Some(uri) = params.arguments.first().and_then(|v| v.as_str()).and_then(|s| Url::parse(s).ok())
                else {
                    return Ok(None);
                };
                let text = {
                    let state = self.state.read().await;
                    state.documents.read().await.get(&uri).cloned()
                };
                if let Some(text) = text {
                    self.publish_diagnostics(&uri, &text).await;
                }
                Ok(None)
            }
            other => {
                log::warn!("unrecognized command: {other}");
                Ok(None)
            }
        }
    }
}

impl Backend {
    async fn publish_diagnostics(&self, uri: &Url, text: &str) {
        let state = self.state.read().await;
        let Ok(bus) = state.interpreter.ensure_connection(&state.config).await else {
            return;
        };
        drop(state);

        match providers::lint::lint_document(&bus, text, uri.as_str()).await {
            Ok(diagnostics) => {
                self.client.publish_diagnostics(uri.clone(), diagnostics, None).await;
            }
            Err(err) => log::warn!("lint request for {uri} failed: {err}"),
        }
    }

    async fn line_text(&self, state: &WorldState, uri: &Url, line: u32) -> Option<String> {
        let text = state.documents.read().await.get(uri).cloned()?;
        text.lines().nth(line as usize).map(str::to_string)
    }
}

fn to_lsp_range(range: crate::index::model::Range) -> Range {
    Range::new(
        Position::new(range.line_start.saturating_sub(1), range.char_start),
        Position::new(range.line_end.saturating_sub(1), range.char_end),
    )
}

fn offset_at(text: &str, position: Position) -> usize {
    let mut offset = 0;
    for (i, line) in text.split('\n').enumerate() {
        if i as u32 == position.line {
            return offset + position.character as usize;
        }
        offset += line.len() + 1;
    }
    offset
}

pub async fn start_lsp() -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}
