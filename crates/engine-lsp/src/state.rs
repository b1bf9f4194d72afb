//
// state.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! Process-wide server state (spec.md §3, §5): open documents, the symbol
//! index, the interpreter connection, and the two indexers that keep the
//! index fresh. Grounded on `ark-lsp::state::WorldState`, generalized past
//! its R-specific `Library`/`Document` (tree-sitter) content to this
//! server's bus-backed indexing model.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use url::Url;

use crate::config::Configuration;
use crate::index::SymbolIndex;
use crate::indexer::document::OpenDocuments;
use crate::indexer::DocumentIndexer;
use crate::indexer::WorkspaceIndexer;
use crate::interpreter::InterpreterManager;
use crate::resolver::PathResolver;

pub struct WorldState {
    pub config: Configuration,
    pub workspace_folders: Vec<Url>,
    pub interpreter: InterpreterManager,
    pub index: Arc<RwLock<SymbolIndex>>,
    pub documents: OpenDocuments,
    pub document_indexer: Arc<DocumentIndexer>,
    pub workspace_indexer: WorkspaceIndexer,
}

impl WorldState {
    pub fn new() -> Self {
        let interpreter = InterpreterManager::new();
        let index = Arc::new(RwLock::new(SymbolIndex::new()));
        let documents: OpenDocuments = Arc::new(RwLock::new(HashMap::new()));
        let workspace_indexer = WorkspaceIndexer::new(interpreter.clone(), index.clone());
        let document_indexer = DocumentIndexer::new(
            interpreter.clone(),
            index.clone(),
            workspace_indexer.clone(),
            documents.clone(),
        );

        Self {
            config: Configuration::default(),
            workspace_folders: Vec::new(),
            interpreter,
            index,
            documents,
            document_indexer,
            workspace_indexer,
        }
    }

    /// A [`PathResolver`] bound to whatever bus is currently connected, or
    /// `None` if the interpreter isn't reachable under the current policy.
    pub async fn path_resolver(&self) -> Option<PathResolver> {
        self.interpreter.ensure_connection(&self.config).await.ok().map(PathResolver::new)
    }

    pub async fn open_document(&self, uri: Url, text: String) {
        self.documents.write().await.insert(uri.clone(), text.clone());
        self.document_indexer.queue_index(uri, self.config.clone()).await;
    }

    pub async fn change_document(&self, uri: Url, text: String) {
        self.documents.write().await.insert(uri.clone(), text);
        self.document_indexer.queue_index(uri, self.config.clone()).await;
    }

    pub async fn close_document(&self, uri: &Url) {
        self.documents.write().await.remove(uri);
        self.index.write().await.clear(uri);
    }
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_document_stores_text_and_closes_remove_it() {
        let state = WorldState::new();
        let uri = Url::parse("file:///a.m").unwrap();

        state.open_document(uri.clone(), "x = 1;".into()).await;
        assert_eq!(state.documents.read().await.get(&uri).map(String::as_str), Some("x = 1;"));

        state.close_document(&uri).await;
        assert!(state.documents.read().await.get(&uri).is_none());
    }
}
