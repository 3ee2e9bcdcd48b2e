//! Backend state
//!
//! Defines the [`AngelscriptBackend`] handle shared by every LSP handler and
//! the commands it sends to the service actor.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use notify::RecommendedWatcher;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tower_lsp::lsp_types::Url;
use tower_lsp::Client;

use crate::config::ServerConfig;
use crate::lsp::document::EditorDocument;
use crate::pipeline::FileChange;
use crate::query::hierarchy::HierarchyResult;
use crate::query::{HierarchyParams, MembersParams, MembersResult, QueryResult, SearchParams, SearchResult};
use crate::service::{ReferenceOutcome, ReferenceRequest};

pub(super) type Reply<T> = oneshot::Sender<QueryResult<T>>;

/// Work for the service actor
#[derive(Debug)]
pub(crate) enum Command {
    FileChanged { path: PathBuf, change: FileChange },
    DocumentOpened { path: PathBuf, text: String },
    DocumentChanged { path: PathBuf, text: String },
    DocumentClosed { path: PathBuf },
    TypeHierarchy { params: HierarchyParams, reply: Reply<HierarchyResult> },
    TypeMembers { params: MembersParams, reply: Reply<MembersResult> },
    SearchSymbols { params: SearchParams, reply: Reply<Vec<SearchResult>> },
    FindReferences { name: String, request: ReferenceRequest, reply: Reply<ReferenceOutcome> },
}

/// The Angelscript language server backend.
///
/// Cheap to clone; all clones talk to the same service actor.
#[derive(Clone)]
pub struct AngelscriptBackend {
    pub(super) client: Client,
    /// Configuration from the command line, overlaid with the client's
    /// initialization options during `initialize`
    pub(super) config: Arc<RwLock<ServerConfig>>,
    pub(super) commands: mpsc::Sender<Command>,
    /// Receiving end of `commands`, taken once when the actor starts
    pub(super) command_rx: Arc<Mutex<Option<mpsc::Receiver<Command>>>>,
    pub(super) documents: Arc<DashMap<Url, EditorDocument>>,
    pub(super) root_dir: Arc<RwLock<Option<PathBuf>>>,
    pub(super) file_watcher: Arc<Mutex<Option<RecommendedWatcher>>>,
    pub(super) shutdown_tx: Arc<broadcast::Sender<()>>,
}

impl std::fmt::Debug for AngelscriptBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AngelscriptBackend")
            .field("open_documents", &self.documents.len())
            .finish()
    }
}
