//! Staged module processing
//!
//! Every script file moves through four stages:
//!
//! ```text
//! Load -> Parse -> PostProcessTypes -> Resolve
//! ```
//!
//! Each stage has its own FIFO queue drained in capped batches, one batch per
//! [`ModuleScheduler::tick`]. A later queue is only serviced once every
//! earlier queue is empty, and the last two stages additionally wait until
//! the type database has been finalized at least once.
//!
//! Triggers:
//! - file system events re-enter `Load`
//! - editor edits are debounced per module and re-enter `Parse`
//! - database finalization and script type changes request a full sweep,
//!   which is deferred while queues are draining

pub mod analyzer;
pub mod debounce;
pub mod module;
pub mod outline;
pub mod queue;
pub mod references;

use rustc_hash::FxHashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};
use tracing::{debug, info, trace, warn};

use crate::kb::TypeDatabase;
use crate::query::ModuleSources;
use analyzer::byte_range;

pub use analyzer::ModuleAnalyzer;
pub use debounce::{DebounceMap, Debouncer};
pub use module::{module_name_for, Module, ModuleId, ModuleStage};
pub use outline::OutlineAnalyzer;
pub use queue::WorkQueue;
pub use references::{CancellationFlag, ReferenceSearch, SearchProgress};

/// Per-tick batch caps of the four stage queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageCaps {
    pub load: usize,
    pub parse: usize,
    pub post_process: usize,
    pub resolve: usize,
}

impl Default for StageCaps {
    fn default() -> Self {
        Self { load: 200, parse: 10, post_process: 50, resolve: 20 }
    }
}

/// What happened to a file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    Created,
    Changed,
    Deleted,
}

/// Output of a scheduler tick
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    PublishDiagnostics { module: ModuleId, path: PathBuf, diagnostics: Vec<Diagnostic> },
    /// Semantic highlighting should be re-requested by the editor
    RefreshSemanticTokens,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Load,
    Parse,
    PostProcess,
    Resolve,
}

/// Owns every module and drives it through the stages
#[derive(Debug)]
pub struct ModuleScheduler {
    root: Option<PathBuf>,
    modules: Vec<Module>,
    by_path: FxHashMap<PathBuf, ModuleId>,
    by_name: FxHashMap<String, ModuleId>,

    load: WorkQueue,
    parse: WorkQueue,
    post_process: WorkQueue,
    resolve: WorkQueue,

    /// Set while any queue holds work
    servicing: bool,
    sweep_pending: bool,
    /// Bumped whenever a module's registered script types change
    script_revision: u64,

    edits: DebounceMap<ModuleId>,
    refresh: Debouncer,
    parse_errors: FxHashMap<ModuleId, Diagnostic>,
    /// Declarations the database refused at type registration
    registration_errors: FxHashMap<ModuleId, Vec<Diagnostic>>,
}

impl ModuleScheduler {
    pub fn new(caps: StageCaps, edit_debounce: Duration, refresh_debounce: Duration) -> Self {
        Self {
            root: None,
            modules: Vec::new(),
            by_path: FxHashMap::default(),
            by_name: FxHashMap::default(),
            load: WorkQueue::new(caps.load),
            parse: WorkQueue::new(caps.parse),
            post_process: WorkQueue::new(caps.post_process),
            resolve: WorkQueue::new(caps.resolve),
            servicing: false,
            sweep_pending: false,
            script_revision: 0,
            edits: DebounceMap::new(edit_debounce),
            refresh: Debouncer::new(refresh_debounce),
            parse_errors: FxHashMap::default(),
            registration_errors: FxHashMap::default(),
        }
    }

    pub fn set_root(&mut self, root: PathBuf) {
        self.root = Some(root);
    }

    // ===== Module registry =====

    /// Returns the module for `path`, creating it on first reference
    pub fn module_for_path(&mut self, path: &Path) -> ModuleId {
        if let Some(&id) = self.by_path.get(path) {
            return id;
        }
        let id = ModuleId(self.modules.len() as u32);
        let name = module_name_for(self.root.as_deref(), path);
        trace!("Registered module {} for {:?}", name, path);
        self.by_name.insert(name.clone(), id);
        self.by_path.insert(path.to_path_buf(), id);
        self.modules.push(Module::new(id, name, path.to_path_buf()));
        id
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.0 as usize)
    }

    fn module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id.0 as usize)
    }

    pub fn find_by_path(&self, path: &Path) -> Option<ModuleId> {
        self.by_path.get(path).copied()
    }

    pub fn find_by_name(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.modules.iter().map(|m| m.id).collect()
    }

    // ===== Gate and status =====

    /// Types may be registered and modules resolved once the database has
    /// been finalized and nothing is waiting to load
    pub fn can_resolve(&self, db: &TypeDatabase) -> bool {
        db.is_ready() && self.load.is_empty()
    }

    pub fn is_servicing(&self) -> bool {
        self.servicing
    }

    pub fn is_sweep_pending(&self) -> bool {
        self.sweep_pending
    }

    /// Nothing queued, nothing debounced
    pub fn is_idle(&self) -> bool {
        self.queues_empty() && self.edits.is_empty() && !self.sweep_pending && !self.refresh.is_pending()
    }

    fn queues_empty(&self) -> bool {
        self.load.is_empty() && self.parse.is_empty() && self.post_process.is_empty() && self.resolve.is_empty()
    }

    // ===== Triggers =====

    pub fn queue_load(&mut self, id: ModuleId) {
        if self.load.push(id) {
            self.servicing = true;
        }
    }

    fn queue_parse(&mut self, id: ModuleId) {
        if self.parse.push(id) {
            self.servicing = true;
        }
    }

    pub fn on_file_event(&mut self, path: &Path, change: FileChange) {
        let id = self.module_for_path(path);
        let Some(module) = self.module_mut(id) else {
            return;
        };
        if module.is_opened && change != FileChange::Deleted {
            trace!("Ignoring disk change for open module {}", module.name);
            return;
        }
        if change == FileChange::Deleted {
            module.pending_text = Some(String::new());
        }
        debug!("File {:?}: {:?}", path, change);
        self.queue_load(id);
    }

    /// Editor opened the file: its text replaces the disk content at once
    pub fn on_document_opened(&mut self, path: &Path, text: String) -> ModuleId {
        let id = self.module_for_path(path);
        self.edits.cancel(&id);
        let Some(module) = self.module_mut(id) else {
            return id;
        };
        module.is_opened = true;
        module.pending_text = None;
        if module.set_content(&text) || !module.parsed {
            self.queue_parse(id);
        }
        id
    }

    /// Editor changed the text; re-parsing waits for the edit debounce
    pub fn on_document_changed(&mut self, path: &Path, text: String, now: Instant) -> ModuleId {
        let id = self.module_for_path(path);
        if let Some(module) = self.module_mut(id) {
            module.pending_text = Some(text);
        }
        self.edits.schedule(id, now);
        id
    }

    /// Editor closed the file: the disk content becomes authoritative again
    pub fn on_document_closed(&mut self, path: &Path) {
        let Some(id) = self.find_by_path(path) else {
            return;
        };
        self.edits.cancel(&id);
        if let Some(module) = self.module_mut(id) {
            module.is_opened = false;
            module.pending_text = None;
        }
        self.queue_load(id);
    }

    /// Asks for every module to be re-resolved once the queues drain
    pub fn request_full_sweep(&mut self) {
        if !self.sweep_pending {
            debug!("Full re-resolution requested");
        }
        self.sweep_pending = true;
    }

    // ===== Tick =====

    /// Runs one cooperative step: fires due timers, then services at most one
    /// capped batch of the earliest non-empty stage.
    pub fn tick(
        &mut self,
        now: Instant,
        db: &mut TypeDatabase,
        analyzer: &mut dyn ModuleAnalyzer,
    ) -> Vec<PipelineEvent> {
        let mut events = Vec::new();

        for id in self.edits.drain_expired(now) {
            self.flush_edit(id);
        }
        if self.refresh.poll_expired(now) {
            events.push(PipelineEvent::RefreshSemanticTokens);
        }

        if let Some(stage) = self.next_stage(db) {
            self.service(stage, db, analyzer, &mut events);
            return events;
        }

        if self.queues_empty() {
            self.servicing = false;
            if self.sweep_pending && db.is_ready() {
                self.start_sweep(now, db);
            }
        }
        events
    }

    fn next_stage(&self, db: &TypeDatabase) -> Option<Stage> {
        if !self.load.is_empty() {
            return Some(Stage::Load);
        }
        if !self.parse.is_empty() {
            return Some(Stage::Parse);
        }
        if !self.can_resolve(db) {
            return None;
        }
        if !self.post_process.is_empty() {
            return Some(Stage::PostProcess);
        }
        if !self.resolve.is_empty() {
            return Some(Stage::Resolve);
        }
        None
    }

    fn service(
        &mut self,
        stage: Stage,
        db: &mut TypeDatabase,
        analyzer: &mut dyn ModuleAnalyzer,
        events: &mut Vec<PipelineEvent>,
    ) {
        let batch = match stage {
            Stage::Load => self.load.take_batch(),
            Stage::Parse => self.parse.take_batch(),
            Stage::PostProcess => self.post_process.take_batch(),
            Stage::Resolve => self.resolve.take_batch(),
        };
        trace!("Servicing {:?} batch of {}", stage, batch.len());

        for id in batch {
            match stage {
                Stage::Load => self.load_module(id, events),
                Stage::Parse => self.parse_module(id, analyzer),
                Stage::PostProcess => self.post_process_module(id, db, analyzer),
                Stage::Resolve => self.resolve_module(id, db, analyzer, events),
            }
        }
    }

    fn flush_edit(&mut self, id: ModuleId) {
        let Some(module) = self.module_mut(id) else {
            return;
        };
        let Some(text) = module.pending_text.take() else {
            return;
        };
        if module.set_content(&text) {
            self.queue_parse(id);
        }
    }

    fn load_module(&mut self, id: ModuleId, events: &mut Vec<PipelineEvent>) {
        let Some(module) = self.modules.get_mut(id.0 as usize) else {
            return;
        };
        let text = match module.pending_text.take() {
            Some(text) => text,
            None => match std::fs::read_to_string(&module.path) {
                Ok(text) => text,
                Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
                Err(e) => {
                    warn!("Failed to read {:?}: {}", module.path, e);
                    module.loaded = true;
                    events.push(PipelineEvent::PublishDiagnostics {
                        module: id,
                        path: module.path.clone(),
                        diagnostics: vec![error_diagnostic(format!("Failed to read file: {}", e))],
                    });
                    return;
                }
            },
        };

        if module.set_content(&text) || !module.parsed {
            if self.parse.push(id) {
                self.servicing = true;
            }
        } else {
            trace!("Module {} unchanged on load", module.name);
        }
    }

    fn parse_module(&mut self, id: ModuleId, analyzer: &mut dyn ModuleAnalyzer) {
        let Some(module) = self.modules.get_mut(id.0 as usize) else {
            return;
        };
        let outcome = if module.content.len_bytes() == 0 {
            trace!("Module {} is empty, dropping its analysis", module.name);
            analyzer.forget(id);
            Ok(())
        } else {
            analyzer.parse(module)
        };
        match outcome {
            Ok(()) => {
                self.parse_errors.remove(&id);
            }
            Err(e) => {
                warn!("Failed to parse {}: {:#}", module.name, e);
                self.parse_errors.insert(id, error_diagnostic(format!("{:#}", e)));
            }
        }
        module.parsed = true;
        module.types_post_processed = false;
        module.resolved = false;
        if self.post_process.push(id) {
            self.servicing = true;
        }
    }

    fn post_process_module(&mut self, id: ModuleId, db: &mut TypeDatabase, analyzer: &mut dyn ModuleAnalyzer) {
        let Some(module) = self.modules.get_mut(id.0 as usize) else {
            return;
        };
        let decls = analyzer.declared_types(module);
        let registration = db.register_script_types(&module.name, decls);
        let changed = registration.changed;
        let refused: Vec<Diagnostic> = registration
            .rejected
            .iter()
            .map(|script| Diagnostic {
                range: byte_range(&module.content, script.span.start, script.span.end),
                message: format!("Script type '{}' would shadow an engine type", script.decl.name),
                ..error_diagnostic(String::new())
            })
            .collect();
        if refused.is_empty() {
            self.registration_errors.remove(&id);
        } else {
            self.registration_errors.insert(id, refused);
        }
        module.types_post_processed = true;
        module.resolved = false;

        if changed {
            self.script_revision += 1;
            if module.has_been_resolved() {
                debug!("Script types of {} changed, scheduling full re-resolution", module.name);
                self.sweep_pending = true;
            }
        }
        if self.resolve.push(id) {
            self.servicing = true;
        }
    }

    fn resolve_module(
        &mut self,
        id: ModuleId,
        db: &TypeDatabase,
        analyzer: &mut dyn ModuleAnalyzer,
        events: &mut Vec<PipelineEvent>,
    ) {
        let stamp = (db.generation(), self.script_revision);
        let parse_error = self.parse_errors.get(&id).cloned();
        let refused = self.registration_errors.get(&id).cloned().unwrap_or_default();
        let Some(module) = self.modules.get_mut(id.0 as usize) else {
            return;
        };

        let mut diagnostics: Vec<Diagnostic> = parse_error.into_iter().chain(refused).collect();
        diagnostics.extend(analyzer.resolve(module, db));
        module.resolved = true;
        module.resolved_against = Some(stamp);

        events.push(PipelineEvent::PublishDiagnostics {
            module: id,
            path: module.path.clone(),
            diagnostics,
        });
    }

    /// Re-queues every module that was not resolved against the current
    /// database and script state
    fn start_sweep(&mut self, now: Instant, db: &TypeDatabase) {
        self.sweep_pending = false;
        let stamp = (db.generation(), self.script_revision);

        let mut queued = 0;
        for index in 0..self.modules.len() {
            let module = &mut self.modules[index];
            if !module.types_post_processed || module.resolved_against == Some(stamp) {
                continue;
            }
            module.resolved = false;
            let id = module.id;
            if self.resolve.push(id) {
                queued += 1;
            }
        }
        if queued > 0 {
            self.servicing = true;
        }
        self.refresh.schedule(now);
        info!("Full re-resolution sweep queued {} modules", queued);
    }
}

fn error_diagnostic(message: String) -> Diagnostic {
    Diagnostic {
        range: Range { start: Position::new(0, 0), end: Position::new(0, 0) },
        severity: Some(DiagnosticSeverity::ERROR),
        source: Some("angelscript".to_string()),
        message,
        ..Default::default()
    }
}

impl ModuleSources for ModuleScheduler {
    fn file_path(&self, module: &str) -> Option<String> {
        let id = self.find_by_name(module)?;
        self.module(id).map(|m| m.path.to_string_lossy().into_owned())
    }

    fn source_text(&self, module: &str) -> Option<&ropey::Rope> {
        let id = self.find_by_name(module)?;
        self.module(id).filter(|m| m.loaded).map(|m| &m.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> ModuleScheduler {
        ModuleScheduler::new(StageCaps::default(), Duration::from_millis(50), Duration::from_millis(100))
    }

    #[test]
    fn test_stage_caps_defaults() {
        let caps = StageCaps::default();
        assert_eq!((caps.load, caps.parse, caps.post_process, caps.resolve), (200, 10, 50, 20));
    }

    #[test]
    fn test_module_registry_is_stable() {
        let mut scheduler = scheduler();
        scheduler.set_root(PathBuf::from("/ws"));
        let a = scheduler.module_for_path(Path::new("/ws/Game/Hero.as"));
        let b = scheduler.module_for_path(Path::new("/ws/Game/Hero.as"));
        assert_eq!(a, b);
        assert_eq!(scheduler.find_by_name("Game.Hero"), Some(a));
        assert_eq!(scheduler.module(a).unwrap().stage(), ModuleStage::Unloaded);
    }

    #[test]
    fn test_disk_changes_ignored_while_open() {
        let mut scheduler = scheduler();
        let path = Path::new("/ws/Hero.as");
        scheduler.on_document_opened(path, "class AHero {}".into());
        scheduler.on_file_event(path, FileChange::Changed);
        assert!(scheduler.load.is_empty());
        assert!(!scheduler.parse.is_empty());

        scheduler.on_file_event(path, FileChange::Deleted);
        assert!(!scheduler.load.is_empty());
    }
}
