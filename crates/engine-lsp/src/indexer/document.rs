//
// document.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! The document indexer (spec.md §4.4): debounced re-indexing of open
//! buffers, plus class-closure expansion (§4.4.1) once a fresh index shows
//! the file contributes to a class folder or declares base classes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stdext::result::ResultExt;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::Configuration;
use crate::errors::Error;
use crate::index::raw::RawCodeData;
use crate::index::SymbolIndex;
use crate::indexer::workspace::WorkspaceIndexer;
use crate::interpreter::InterpreterManager;
use crate::resolver::PathResolver;

/// spec.md §4.4: "debounces by 500 ms (per-URI)".
const DEBOUNCE: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Documents currently open in the client, keyed by URI. Shared with the
/// LSP backend so `did_change` mutates the same map the debounce timer
/// reads from at fire time — reading the freshest text rather than whatever
/// was live when the timer was armed.
pub type OpenDocuments = Arc<RwLock<HashMap<Url, String>>>;

pub struct DocumentIndexer {
    interpreter: InterpreterManager,
    index: Arc<RwLock<SymbolIndex>>,
    workspace: WorkspaceIndexer,
    documents: OpenDocuments,
    pending: Mutex<HashMap<Url, JoinHandle<()>>>,
}

impl DocumentIndexer {
    pub fn new(
        interpreter: InterpreterManager,
        index: Arc<RwLock<SymbolIndex>>,
        workspace: WorkspaceIndexer,
        documents: OpenDocuments,
    ) -> Arc<Self> {
        Arc::new(Self {
            interpreter,
            index,
            workspace,
            documents,
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Cancels any timer already armed for `uri` and arms a new one; fires
    /// `index_document` after the debounce window (spec.md §8 invariant 7:
    /// N calls within 500ms yield exactly one fire after the last one).
    pub async fn queue_index(self: &Arc<Self>, uri: Url, config: Configuration) {
        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.remove(&uri) {
            previous.abort();
        }

        let this = Arc::clone(self);
        let debounced_uri = uri.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            this.index_document(debounced_uri, &config).await;
        });

        pending.insert(uri, handle);
    }

    /// Does nothing if the interpreter isn't connected (spec.md §4.4); the
    /// next `connected` lifecycle event is expected to trigger a re-index
    /// of open buffers (spec.md S5), which callers drive from the backend.
    pub async fn index_document(&self, uri: Url, config: &Configuration) {
        if !self.interpreter.is_connected().await {
            return;
        }

        let Some(text) = self.documents.read().await.get(&uri).cloned() else {
            return;
        };

        let bus = match self.interpreter.ensure_connection(config).await {
            Ok(bus) => bus,
            Err(_) => return,
        };

        let file_path = uri.to_string();
        let reply = bus
            .request_reply(
                "/indexDocument/request",
                "/indexDocument/response",
                REQUEST_TIMEOUT,
                move |id| {
                    serde_json::json!({
                        "requestId": id,
                        "code": text,
                        "filePath": file_path,
                    })
                },
            )
            .await;

        let Some(raw): Option<RawCodeData> = reply
            .and_then(|value| serde_json::from_value(value).map_err(|_| Error::MalformedReply))
            .warn_on_err()
        else {
            return;
        };

        let (class_def_folder, base_classes) = {
            let mut index = self.index.write().await;
            let stored = index.parse_and_store(uri.clone(), raw);
            let class_name = stored.class_name.clone();
            match class_name.and_then(|name| index.class(&name).cloned()) {
                Some(class) => (class.class_def_folder.clone(), class.base_classes.clone()),
                None => (None, Vec::new()),
            }
        };

        self.expand_class_closure(uri, class_def_folder, base_classes, config).await;
    }

    /// spec.md §4.4.1: if the file contributes to a class folder, enqueue a
    /// workspace-index of that folder so sibling method files get picked
    /// up; for each base class, resolve its defining file and store the
    /// code data the resolver already fetched.
    async fn expand_class_closure(
        &self,
        uri: Url,
        class_def_folder: Option<String>,
        base_classes: Vec<String>,
        config: &Configuration,
    ) {
        if let Some(folder) = class_def_folder {
            if let Some(folder_uri) = class_folder_uri(&folder) {
                let workspace = self.workspace.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    workspace.index_folders(vec![folder_uri], &config).await;
                });
            }
        }

        if base_classes.is_empty() {
            return;
        }

        let bus = match self.interpreter.ensure_connection(config).await {
            Ok(bus) => bus,
            Err(_) => return,
        };
        let resolver = PathResolver::new(bus);

        for base_class in base_classes {
            let resolved = match resolver.resolve_one(&base_class, &uri).await {
                Ok(resolved) => resolved,
                Err(_) => continue,
            };
            if resolved.is_not_found() {
                continue;
            }
            if let Some(file) = resolved.file {
                self.index.write().await.parse_and_store(file.uri, file.code_data);
            }
        }
    }
}

fn class_folder_uri(folder: &str) -> Option<Url> {
    Url::parse(folder)
        .ok()
        .or_else(|| Url::from_file_path(PathBuf::from(folder)).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionTiming;

    #[tokio::test]
    async fn index_document_is_a_noop_when_disconnected() {
        let interpreter = InterpreterManager::new();
        let index = Arc::new(RwLock::new(SymbolIndex::new()));
        let workspace = WorkspaceIndexer::new(interpreter.clone(), index.clone());
        let documents: OpenDocuments = Arc::new(RwLock::new(HashMap::new()));
        let indexer = DocumentIndexer::new(interpreter, index.clone(), workspace, documents.clone());

        let uri = Url::parse("file:///a.m").unwrap();
        documents.write().await.insert(uri.clone(), "function foo() end".into());

        let mut config = Configuration::default();
        config.matlab_connection_timing = ConnectionTiming::Never;

        indexer.index_document(uri.clone(), &config).await;

        assert!(!index.read().await.contains(&uri));
    }
}
