//! LSP protocol handler implementations
//!
//! This module contains the `tower_lsp::LanguageServer` implementation for
//! the Angelscript backend:
//! - Lifecycle handlers (initialize, initialized, shutdown)
//! - Document lifecycle (did_open, did_change, did_close, did_change_watched_files)
//! - Reference search and rename, both answered by resumable searches

use std::path::PathBuf;

use tower_lsp::jsonrpc::Result as LspResult;
use tower_lsp::lsp_types::{
    DidChangeTextDocumentParams, DidChangeWatchedFilesParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, FileChangeType, InitializeParams, InitializeResult, InitializedParams, Location,
    OneOf, ReferenceParams, RenameParams, ServerCapabilities, ServerInfo, TextDocumentPositionParams,
    TextDocumentSyncCapability, TextDocumentSyncKind, Url, WorkspaceEdit,
};
use tower_lsp::{jsonrpc, LanguageServer};
use tracing::{debug, error, info, trace, warn};
use walkdir::WalkDir;

use super::state::{AngelscriptBackend, Command};
use super::watcher::is_script_file;
use crate::lsp::document::{word_at, EditorDocument};
use crate::pipeline::FileChange;
use crate::service::{ReferenceOutcome, ReferenceRequest};

fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    #[allow(deprecated)]
    let root_uri = params
        .root_uri
        .clone()
        .or_else(|| params.workspace_folders.as_ref()?.first().map(|folder| folder.uri.clone()))?;
    match root_uri.to_file_path() {
        Ok(path) => Some(path),
        Err(()) => {
            warn!("Failed to convert root_uri to path: {}. Skipping workspace indexing.", root_uri);
            None
        }
    }
}

fn script_files(root: &std::path::Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_script_file(e.path()))
        .map(|e| e.into_path())
        .collect()
}

impl AngelscriptBackend {
    /// Identifier at the position, read from the editor's copy when the document is open
    fn symbol_at(&self, position: &TextDocumentPositionParams) -> Option<String> {
        let uri = &position.text_document.uri;
        if let Some(doc) = self.documents.get(uri) {
            return word_at(&doc.text, &position.position);
        }
        let path = uri.to_file_path().ok()?;
        let text = std::fs::read_to_string(path).ok()?;
        word_at(&ropey::Rope::from_str(&text), &position.position)
    }

    async fn run_reference_search(
        &self,
        position: &TextDocumentPositionParams,
        request: ReferenceRequest,
    ) -> LspResult<Option<ReferenceOutcome>> {
        let Some(name) = self.symbol_at(position) else {
            debug!("No symbol at {:?}", position.position);
            return Ok(None);
        };
        let outcome = self
            .query(|reply| Command::FindReferences { name, request, reply })
            .await?;
        Ok(Some(outcome))
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for AngelscriptBackend {
    /// Sets up the workspace, starts the service actor and reports capabilities.
    async fn initialize(&self, params: InitializeParams) -> jsonrpc::Result<InitializeResult> {
        info!("Received initialize from {:?}", params.client_info.as_ref().map(|c| &c.name));

        if let Some(options) = &params.initialization_options {
            self.config.write().await.merge_initialization_options(options);
        }

        let root = workspace_root(&params);
        let files = match &root {
            Some(root) => {
                let files = script_files(root);
                info!("Found {} script files under {:?}", files.len(), root);
                files
            }
            None => Vec::new(),
        };
        *self.root_dir.write().await = root.clone();

        self.start_service(root.clone(), files).await.map_err(|e| {
            error!("Failed to start language service: {:#}", e);
            jsonrpc::Error::internal_error()
        })?;

        if let Some(root) = &root {
            match super::watcher::spawn_file_watcher(root, self.commands.clone(), &self.shutdown_tx) {
                Ok(watcher) => {
                    if let Ok(mut slot) = self.file_watcher.lock() {
                        *slot = Some(watcher);
                    }
                }
                Err(e) => warn!("File watching disabled: {}", e),
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::INCREMENTAL)),
                references_provider: Some(OneOf::Left(true)),
                rename_provider: Some(OneOf::Left(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        info!("Client initialized");
    }

    async fn shutdown(&self) -> jsonrpc::Result<()> {
        info!("Received shutdown request");
        let _ = self.shutdown_tx.send(());
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        debug!("Opening document: URI={}, version={}", doc.uri, doc.version);
        let Ok(path) = doc.uri.to_file_path() else {
            warn!("Ignoring non-file document {}", doc.uri);
            return;
        };
        self.documents.insert(doc.uri.clone(), EditorDocument::new(doc.uri, &doc.text, doc.version));
        self.send(Command::DocumentOpened { path, text: doc.text }).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        trace!("Change to {} (version {})", uri, version);

        let text = match self.documents.get_mut(&uri) {
            Some(mut doc) => match doc.apply(&params.content_changes, version) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Ignoring change to {}: {}", uri, e);
                    return;
                }
            },
            None => {
                warn!("Change to unopened document {}", uri);
                return;
            }
        };
        let Ok(path) = uri.to_file_path() else {
            return;
        };
        self.send(Command::DocumentChanged { path, text }).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        debug!("Closing document {}", uri);
        self.documents.remove(&uri);
        if let Ok(path) = uri.to_file_path() {
            self.send(Command::DocumentClosed { path }).await;
        }
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        for event in params.changes {
            let Ok(path) = event.uri.to_file_path() else {
                continue;
            };
            if !is_script_file(&path) {
                continue;
            }
            let change = match event.typ {
                FileChangeType::CREATED => FileChange::Created,
                FileChangeType::DELETED => FileChange::Deleted,
                _ => FileChange::Changed,
            };
            self.send(Command::FileChanged { path, change }).await;
        }
    }

    async fn references(&self, params: ReferenceParams) -> LspResult<Option<Vec<Location>>> {
        let outcome = self
            .run_reference_search(&params.text_document_position, ReferenceRequest::FindReferences)
            .await?;
        Ok(match outcome {
            Some(ReferenceOutcome::Locations(locations)) => Some(locations),
            _ => None,
        })
    }

    async fn rename(&self, params: RenameParams) -> LspResult<Option<WorkspaceEdit>> {
        let request = ReferenceRequest::Rename { new_name: params.new_name };
        let outcome = self.run_reference_search(&params.text_document_position, request).await?;
        Ok(match outcome {
            Some(ReferenceOutcome::Rename(edit)) => Some(edit),
            _ => None,
        })
    }
}
