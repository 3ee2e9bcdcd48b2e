use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tower_lsp::{jsonrpc, Client};
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::engine::{run_engine_supervisor, EngineEvent, TcpJsonTransport};
use crate::query::{QueryError, QueryResult};
use crate::service::LanguageService;

mod actor;
mod handlers;
mod requests;
mod state;
mod watcher;

pub use requests::{GET_TYPE_HIERARCHY, GET_TYPE_MEMBERS, SEARCH_SYMBOLS};
pub use state::AngelscriptBackend;
pub use watcher::is_script_file;
use state::{Command, Reply};

const COMMAND_CAPACITY: usize = 256;
const ENGINE_EVENT_CAPACITY: usize = 1024;

/// JSON-RPC code for names that do not resolve
pub const NOT_FOUND_CODE: i64 = -32001;

/// Maps a query failure onto a JSON-RPC error
pub fn query_error_to_jsonrpc(error: QueryError) -> jsonrpc::Error {
    match error {
        QueryError::InvalidParams(message) => jsonrpc::Error::invalid_params(message),
        QueryError::NotFound(message) => jsonrpc::Error {
            code: jsonrpc::ErrorCode::ServerError(NOT_FOUND_CODE),
            message: message.into(),
            data: None,
        },
        QueryError::InternalError(message) => jsonrpc::Error {
            code: jsonrpc::ErrorCode::InternalError,
            message: message.into(),
            data: None,
        },
    }
}

impl AngelscriptBackend {
    /// Creates the backend. The service actor is started by `initialize`,
    /// once the workspace and the client's options are known; commands sent
    /// before then wait in the channel.
    pub fn new(client: Client, config: ServerConfig) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        Self {
            client,
            config: Arc::new(RwLock::new(config)),
            commands,
            command_rx: Arc::new(Mutex::new(Some(command_rx))),
            documents: Arc::new(DashMap::new()),
            root_dir: Arc::new(RwLock::new(None)),
            file_watcher: Arc::new(Mutex::new(None)),
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Builds the language service and spawns the actor that owns it, plus
    /// the engine supervisor when the engine link is enabled
    async fn start_service(&self, root: Option<PathBuf>, files: Vec<PathBuf>) -> anyhow::Result<()> {
        let command_rx = self
            .command_rx
            .lock()
            .map_err(|_| anyhow::anyhow!("command receiver lock poisoned"))?
            .take()
            .ok_or_else(|| anyhow::anyhow!("language service already started"))?;
        let config = self.config.read().await.clone();

        let mut service = LanguageService::with_outline_analyzer(config.clone());
        if let Some(root) = root {
            service.set_workspace_root(root);
            service.bootstrap_from_snapshot();
        }
        let queued = service.queue_workspace_files(files);
        info!("Queued {} script files for loading", queued);

        let (engine_tx, engine_rx) = mpsc::channel::<EngineEvent>(ENGINE_EVENT_CAPACITY);
        if config.engine.enabled {
            let transport = Arc::new(TcpJsonTransport::new(config.engine.address()));
            tokio::spawn(run_engine_supervisor(
                transport,
                engine_tx,
                config.engine.reconnect_interval(),
                self.shutdown_tx.subscribe(),
            ));
        } else {
            debug!("Engine link disabled by configuration");
            drop(engine_tx);
        }

        tokio::spawn(actor::run_service_actor(
            service,
            self.client.clone(),
            command_rx,
            engine_rx,
            self.shutdown_tx.subscribe(),
        ));
        Ok(())
    }

    /// Sends a fire-and-forget command to the actor
    async fn send(&self, command: Command) {
        if self.commands.send(command).await.is_err() {
            error!("Language service is no longer running");
        }
    }

    /// Sends a command carrying a reply channel and waits for the answer
    async fn query<T: Send>(&self, build: impl FnOnce(Reply<T>) -> Command + Send) -> jsonrpc::Result<T> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(build(reply)).await.is_err() {
            return Err(jsonrpc::Error::internal_error());
        }
        let result: QueryResult<T> = response.await.map_err(|_| jsonrpc::Error::internal_error())?;
        result.map_err(query_error_to_jsonrpc)
    }
}
