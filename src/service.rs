//! The language service
//!
//! [`LanguageService`] is the single owner of the type database, the module
//! scheduler, the analyzer and every piece of session state around them.
//! Nothing in here locks: the LSP front end runs the service on one actor
//! task and feeds it events, queries and ticks in order. All time-based
//! behavior takes an explicit `now` so it can be driven in tests.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rustc_hash::FxHashMap;
use tower_lsp::lsp_types::{Diagnostic, Location, Url, WorkspaceEdit};
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::engine::{EngineEvent, EngineMessage};
use crate::kb::{ScriptSettings, SettingsMessage, SnapshotPayload, SnapshotStore, TypeDatabase};
use crate::pipeline::references::rename_edit;
use crate::pipeline::{
    CancellationFlag, Debouncer, FileChange, ModuleAnalyzer, ModuleScheduler, OutlineAnalyzer, PipelineEvent,
    ReferenceSearch, SearchProgress,
};
use crate::query::hierarchy::HierarchyResult;
use crate::query::{
    get_type_hierarchy, get_type_members, search_symbols, HierarchyParams, MembersParams, MembersResult,
    QueryError, QueryResult, SearchParams, SearchResult,
};

/// Handle of a running reference search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

/// What to do with the locations once a reference search completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceRequest {
    FindReferences,
    Rename { new_name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceOutcome {
    Locations(Vec<Location>),
    Rename(WorkspaceEdit),
    Cancelled,
}

/// Side effects a tick asks the front end to perform
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceOutput {
    PublishDiagnostics { uri: Url, diagnostics: Vec<Diagnostic> },
    RefreshSemanticTokens,
    ReferencesDone { job: JobId, outcome: ReferenceOutcome },
}

#[derive(Debug)]
struct ReferenceJob {
    search: ReferenceSearch,
    request: ReferenceRequest,
}

/// State of the type dump currently being received
#[derive(Debug)]
struct Ingestion {
    active: bool,
    /// The current dump went quiet and was finalized partially; later
    /// fragments continue it and it is never snapshotted
    stalled: bool,
    chunks: Vec<serde_json::Value>,
    inactivity: Debouncer,
}

pub struct LanguageService<A: ModuleAnalyzer = OutlineAnalyzer> {
    config: ServerConfig,
    db: TypeDatabase,
    scheduler: ModuleScheduler,
    analyzer: A,

    settings: ScriptSettings,
    engine_supports_create_blueprint: bool,
    engine_connected: bool,
    ingestion: Ingestion,

    workspace_root: Option<PathBuf>,
    snapshot: Option<SnapshotStore>,
    snapshot_save: Debouncer,
    pending_snapshot: Option<SnapshotPayload>,

    jobs: FxHashMap<JobId, ReferenceJob>,
    next_job: u64,
}

impl LanguageService<OutlineAnalyzer> {
    pub fn with_outline_analyzer(config: ServerConfig) -> Self {
        Self::new(config, OutlineAnalyzer::new())
    }
}

impl<A: ModuleAnalyzer> LanguageService<A> {
    pub fn new(config: ServerConfig, analyzer: A) -> Self {
        let scheduler = ModuleScheduler::new(
            config.queue_caps.into(),
            config.edit_debounce(),
            config.refresh_debounce(),
        );
        Self {
            db: TypeDatabase::new(),
            scheduler,
            analyzer,
            settings: ScriptSettings::default(),
            engine_supports_create_blueprint: false,
            engine_connected: false,
            ingestion: Ingestion {
                active: false,
                stalled: false,
                chunks: Vec::new(),
                inactivity: Debouncer::new(config.ingestion_timeout()),
            },
            workspace_root: None,
            snapshot: None,
            snapshot_save: Debouncer::new(config.snapshot_debounce()),
            pending_snapshot: None,
            jobs: FxHashMap::default(),
            next_job: 0,
            config,
        }
    }

    // ===== Accessors =====

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn database(&self) -> &TypeDatabase {
        &self.db
    }

    pub fn scheduler(&self) -> &ModuleScheduler {
        &self.scheduler
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn settings(&self) -> &ScriptSettings {
        &self.settings
    }

    pub fn engine_supports_create_blueprint(&self) -> bool {
        self.engine_supports_create_blueprint
    }

    pub fn is_engine_connected(&self) -> bool {
        self.engine_connected
    }

    pub fn is_ingesting(&self) -> bool {
        self.ingestion.active
    }

    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }

    pub fn has_pending_snapshot(&self) -> bool {
        self.pending_snapshot.is_some()
    }

    // ===== Workspace =====

    /// Sets the workspace root; module names and the snapshot location are
    /// derived from it
    pub fn set_workspace_root(&mut self, root: PathBuf) {
        self.scheduler.set_root(root.clone());
        self.snapshot = Some(SnapshotStore::for_workspace(&root));
        self.workspace_root = Some(root);
    }

    /// Seeds the database from the workspace snapshot, if a compatible one
    /// exists. Returns whether the database was finalized from it.
    pub fn bootstrap_from_snapshot(&mut self) -> bool {
        let Some(store) = &self.snapshot else {
            return false;
        };
        let Some(payload) = store.load() else {
            return false;
        };

        let mut rejected = 0;
        for chunk in &payload.debug_database_chunks {
            if let Err(e) = self.db.ingest_fragment(chunk) {
                debug!("Skipping snapshot chunk: {}", e);
                rejected += 1;
            }
        }
        if rejected > 0 {
            warn!("{} snapshot chunks could not be decoded", rejected);
        }
        self.settings = payload.script_settings;
        self.engine_supports_create_blueprint = payload.engine_supports_create_blueprint;
        self.db.finalize(&self.settings, false);
        self.scheduler.request_full_sweep();
        info!("Bootstrapped type database from snapshot");
        true
    }

    /// Queues the given script files for loading
    pub fn queue_workspace_files<I>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut count = 0;
        for path in paths {
            let id = self.scheduler.module_for_path(&path);
            self.scheduler.queue_load(id);
            count += 1;
        }
        count
    }

    pub fn on_file_event(&mut self, path: &Path, change: FileChange) {
        self.scheduler.on_file_event(path, change);
    }

    pub fn on_document_opened(&mut self, path: &Path, text: String) {
        self.scheduler.on_document_opened(path, text);
    }

    pub fn on_document_changed(&mut self, path: &Path, text: String, now: Instant) {
        self.scheduler.on_document_changed(path, text, now);
    }

    pub fn on_document_closed(&mut self, path: &Path) {
        self.scheduler.on_document_closed(path);
    }

    // ===== Engine =====

    pub fn handle_engine_event(&mut self, event: EngineEvent, now: Instant) {
        match event {
            EngineEvent::Connected => {
                self.engine_connected = true;
                self.ingestion.stalled = false;
                self.ingestion.chunks.clear();
                info!("Engine connected");
            }
            EngineEvent::Disconnected => {
                self.engine_connected = false;
                if self.pending_snapshot.take().is_some() {
                    self.snapshot_save.cancel();
                    debug!("Dropped pending snapshot save after disconnect");
                }
                warn!("Engine disconnected, queries keep using the last type database");
            }
            EngineEvent::Message(message) => self.handle_engine_message(message, now),
        }
    }

    fn handle_engine_message(&mut self, message: EngineMessage, now: Instant) {
        match message {
            EngineMessage::TypeDump { fragment } => self.ingest(fragment, now),
            EngineMessage::EndOfDump => self.finish_ingestion(false, now),
            EngineMessage::Settings(message) => self.apply_settings(&message),
        }
    }

    fn ingest(&mut self, fragment: serde_json::Value, now: Instant) {
        if !self.ingestion.active {
            self.ingestion.active = true;
            if self.ingestion.stalled {
                debug!("Type dump resumed after going quiet");
            } else {
                debug!("Type dump started");
                self.ingestion.chunks.clear();
            }
        }
        match self.db.ingest_fragment(&fragment) {
            Ok(()) => self.ingestion.chunks.push(fragment),
            Err(e) => warn!("Skipping type dump fragment: {}", e),
        }
        self.ingestion.inactivity.schedule(now);
    }

    fn apply_settings(&mut self, message: &SettingsMessage) {
        if let Some(create_blueprint) = message.apply_to(&mut self.settings) {
            self.engine_supports_create_blueprint = create_blueprint;
        }
        debug!("Applied engine settings version {}: {:?}", message.version, self.settings);
    }

    fn finish_ingestion(&mut self, partial: bool, now: Instant) {
        self.ingestion.inactivity.cancel();
        let was_active = std::mem::replace(&mut self.ingestion.active, false);
        if partial {
            warn!(
                "Type dump went quiet after {} fragments, degraded finalize with partial data",
                self.ingestion.chunks.len()
            );
        }

        self.db.finalize(&self.settings, partial);
        self.scheduler.request_full_sweep();

        if partial {
            self.ingestion.stalled = true;
            return;
        }
        if std::mem::replace(&mut self.ingestion.stalled, false) {
            info!("Type dump completed after going quiet, not snapshotting it");
            self.ingestion.chunks.clear();
            return;
        }
        if !was_active || !self.engine_connected || self.snapshot.is_none() {
            return;
        }
        self.pending_snapshot = Some(SnapshotPayload {
            workspace_root: self
                .workspace_root
                .as_ref()
                .map(|root| root.to_string_lossy().into_owned())
                .unwrap_or_default(),
            debug_database_chunks: std::mem::take(&mut self.ingestion.chunks),
            script_settings: self.settings,
            engine_supports_create_blueprint: self.engine_supports_create_blueprint,
        });
        self.snapshot_save.schedule(now);
    }

    fn save_pending_snapshot(&mut self) {
        let Some(payload) = self.pending_snapshot.take() else {
            return;
        };
        let Some(store) = &self.snapshot else {
            return;
        };
        match store.save(&payload) {
            Ok(()) => info!("Saved type snapshot to {:?}", store.path()),
            Err(e) => warn!("Failed to save type snapshot: {:#}", e),
        }
    }

    // ===== Tick =====

    /// Fires due timers, runs one scheduler step and one step of every
    /// reference search
    pub fn tick(&mut self, now: Instant) -> Vec<ServiceOutput> {
        if self.ingestion.inactivity.poll_expired(now) && self.ingestion.active {
            self.finish_ingestion(true, now);
        }
        if self.snapshot_save.poll_expired(now) {
            self.save_pending_snapshot();
        }

        let mut outputs = Vec::new();
        for event in self.scheduler.tick(now, &mut self.db, &mut self.analyzer) {
            match event {
                PipelineEvent::PublishDiagnostics { path, diagnostics, .. } => match Url::from_file_path(&path) {
                    Ok(uri) => outputs.push(ServiceOutput::PublishDiagnostics { uri, diagnostics }),
                    Err(()) => trace!("No URI for {:?}, dropping diagnostics", path),
                },
                PipelineEvent::RefreshSemanticTokens => outputs.push(ServiceOutput::RefreshSemanticTokens),
            }
        }
        self.step_reference_jobs(&mut outputs);
        outputs
    }

    /// Whether a tick would have nothing to do right now
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
            && self.jobs.is_empty()
            && !self.ingestion.inactivity.is_pending()
            && !self.snapshot_save.is_pending()
    }

    // ===== Queries =====

    pub fn type_hierarchy(&self, params: &HierarchyParams) -> QueryResult<HierarchyResult> {
        get_type_hierarchy(&self.db, &self.scheduler, params, self.config.hierarchy)
    }

    pub fn type_members(&self, params: &MembersParams) -> QueryResult<MembersResult> {
        get_type_members(&self.db, params)
    }

    pub fn search_symbols(&self, params: &SearchParams) -> QueryResult<Vec<SearchResult>> {
        if params.limit.is_none() {
            if let Some(limit) = self.config.search_limit {
                let params = SearchParams { limit: Some(limit), ..params.clone() };
                return search_symbols(&self.db, &params);
            }
        }
        search_symbols(&self.db, params)
    }

    // ===== Reference searches =====

    /// Starts a resumable search for `name` across every known module
    pub fn start_reference_search(
        &mut self,
        name: &str,
        request: ReferenceRequest,
    ) -> QueryResult<(JobId, CancellationFlag)> {
        if name.trim().is_empty() {
            return Err(QueryError::InvalidParams("symbol name must not be empty".into()));
        }
        if let ReferenceRequest::Rename { new_name } = &request {
            if !is_identifier(new_name) {
                return Err(QueryError::InvalidParams(format!("'{}' is not a valid identifier", new_name)));
            }
        }

        let job = JobId(self.next_job);
        self.next_job += 1;
        let flag = CancellationFlag::new();
        let search = ReferenceSearch::new(
            name,
            self.scheduler.module_ids(),
            self.config.reference_batch_size,
            flag.clone(),
        );
        debug!("Started reference search {:?} for '{}'", job, name);
        self.jobs.insert(job, ReferenceJob { search, request });
        Ok((job, flag))
    }

    pub fn cancel_reference_search(&mut self, job: JobId) {
        if let Some(entry) = self.jobs.get(&job) {
            entry.search.cancellation().cancel();
        }
    }

    fn step_reference_jobs(&mut self, outputs: &mut Vec<ServiceOutput>) {
        if self.jobs.is_empty() {
            return;
        }
        let mut ids: Vec<JobId> = self.jobs.keys().copied().collect();
        ids.sort();

        for id in ids {
            let Some(entry) = self.jobs.get_mut(&id) else {
                continue;
            };
            let outcome = match entry.search.step(&self.scheduler, &self.analyzer) {
                SearchProgress::Pending => continue,
                SearchProgress::Cancelled => ReferenceOutcome::Cancelled,
                SearchProgress::Complete(locations) => match &entry.request {
                    ReferenceRequest::FindReferences => ReferenceOutcome::Locations(locations),
                    ReferenceRequest::Rename { new_name } => ReferenceOutcome::Rename(rename_edit(&locations, new_name)),
                },
            };
            self.jobs.remove(&id);
            outputs.push(ServiceOutput::ReferencesDone { job: id, outcome });
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn service() -> LanguageService {
        LanguageService::with_outline_analyzer(ServerConfig::default())
    }

    fn dump(service: &mut LanguageService, now: Instant) {
        service.handle_engine_event(
            EngineEvent::Message(EngineMessage::TypeDump { fragment: json!({"types": [{"name": "AActor"}]}) }),
            now,
        );
    }

    #[test]
    fn test_end_of_dump_finalizes() {
        let mut service = service();
        let now = Instant::now();
        dump(&mut service, now);
        assert!(service.is_ingesting());
        assert!(!service.database().is_ready());

        service.handle_engine_event(EngineEvent::Message(EngineMessage::EndOfDump), now);
        assert!(service.database().is_ready());
        assert!(!service.database().is_partial());
        assert!(service.scheduler().is_sweep_pending());
    }

    #[test]
    fn test_inactivity_finalizes_partial() {
        let mut service = service();
        let now = Instant::now();
        dump(&mut service, now);

        service.tick(now + Duration::from_secs(1));
        assert!(!service.database().is_ready());

        service.tick(now + Duration::from_secs(6));
        assert!(service.database().is_ready());
        assert!(service.database().is_partial());
        assert!(!service.is_ingesting());
    }

    #[test]
    fn test_settings_change_float_alias() {
        let mut service = service();
        let message = SettingsMessage { version: 1, float_is_float64: Some(true), ..Default::default() };
        service.handle_engine_event(EngineEvent::Message(EngineMessage::Settings(message)), Instant::now());
        assert!(service.settings().float_is_float64);
    }

    #[test]
    fn test_rename_rejects_invalid_identifier() {
        let mut service = service();
        let result = service.start_reference_search("AHero", ReferenceRequest::Rename { new_name: "1Bad".into() });
        assert!(matches!(result, Err(QueryError::InvalidParams(_))));
        assert!(service.start_reference_search("", ReferenceRequest::FindReferences).is_err());
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("AHero_2"));
        assert!(is_identifier("_Private"));
        assert!(!is_identifier("Has Space"));
        assert!(!is_identifier(""));
    }
}
