//! The service actor
//!
//! One task owns the [`LanguageService`]. Handler commands, engine events and
//! the tick interval are multiplexed into it, so the type database and the
//! scheduler are only ever touched from here.

use std::time::Instant;

use rustc_hash::FxHashMap;
use tokio::sync::{broadcast, mpsc, oneshot};
use tower_lsp::Client;
use tracing::{debug, info, trace, warn};

use super::state::Command;
use crate::engine::EngineEvent;
use crate::pipeline::ModuleAnalyzer;
use crate::query::QueryResult;
use crate::service::{JobId, LanguageService, ReferenceOutcome, ServiceOutput};

type ReferenceReply = oneshot::Sender<QueryResult<ReferenceOutcome>>;

pub(super) async fn run_service_actor<A: ModuleAnalyzer + 'static>(
    mut service: LanguageService<A>,
    client: Client,
    mut commands: mpsc::Receiver<Command>,
    mut engine_events: mpsc::Receiver<EngineEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(service.config().tick_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut waiting: FxHashMap<JobId, ReferenceReply> = FxHashMap::default();
    let mut engine_open = true;

    info!("Service actor started");
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => handle_command(&mut service, command, &mut waiting),
                None => break,
            },
            event = engine_events.recv(), if engine_open => match event {
                Some(event) => service.handle_engine_event(event, Instant::now()),
                None => engine_open = false,
            },
            _ = interval.tick() => {
                // A closed reply channel means the request was cancelled
                for (job, reply) in &waiting {
                    if reply.is_closed() {
                        service.cancel_reference_search(*job);
                    }
                }
                for output in service.tick(Instant::now()) {
                    deliver(&client, output, &mut waiting).await;
                }
            }
            _ = shutdown.recv() => {
                debug!("Service actor received shutdown signal");
                break;
            }
        }
    }
    info!("Service actor terminated");
}

fn handle_command<A: ModuleAnalyzer>(
    service: &mut LanguageService<A>,
    command: Command,
    waiting: &mut FxHashMap<JobId, ReferenceReply>,
) {
    match command {
        Command::FileChanged { path, change } => service.on_file_event(&path, change),
        Command::DocumentOpened { path, text } => service.on_document_opened(&path, text),
        Command::DocumentChanged { path, text } => service.on_document_changed(&path, text, Instant::now()),
        Command::DocumentClosed { path } => service.on_document_closed(&path),
        Command::TypeHierarchy { params, reply } => {
            let _ = reply.send(service.type_hierarchy(&params));
        }
        Command::TypeMembers { params, reply } => {
            let _ = reply.send(service.type_members(&params));
        }
        Command::SearchSymbols { params, reply } => {
            let _ = reply.send(service.search_symbols(&params));
        }
        Command::FindReferences { name, request, reply } => match service.start_reference_search(&name, request) {
            Ok((job, _flag)) => {
                waiting.insert(job, reply);
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        },
    }
}

async fn deliver(client: &Client, output: ServiceOutput, waiting: &mut FxHashMap<JobId, ReferenceReply>) {
    match output {
        ServiceOutput::PublishDiagnostics { uri, diagnostics } => {
            trace!("Publishing {} diagnostics for {}", diagnostics.len(), uri);
            client.publish_diagnostics(uri, diagnostics, None).await;
        }
        ServiceOutput::RefreshSemanticTokens => {
            let client = client.clone();
            tokio::spawn(async move {
                if let Err(e) = client.semantic_tokens_refresh().await {
                    debug!("Semantic token refresh not delivered: {}", e);
                }
            });
        }
        ServiceOutput::ReferencesDone { job, outcome } => match waiting.remove(&job) {
            Some(reply) => {
                if reply.send(Ok(outcome)).is_err() {
                    trace!("Requester of {:?} went away", job);
                }
            }
            None => warn!("Reference search {:?} finished without a requester", job),
        },
    }
}
