//! Resumable reference search
//!
//! Searching every module at once would stall the scheduling loop on large
//! workspaces, so a search is a state machine: each [`ReferenceSearch::step`]
//! scans one batch of modules and reports whether it is done. A shared
//! [`CancellationFlag`] stops the search at the next step.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_lsp::lsp_types::{Location, TextEdit, Url, WorkspaceEdit};
use tracing::debug;

use super::analyzer::ModuleAnalyzer;
use super::module::ModuleId;
use super::ModuleScheduler;

#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchProgress {
    Pending,
    Complete(Vec<Location>),
    Cancelled,
}

#[derive(Debug)]
pub struct ReferenceSearch {
    name: String,
    modules: Vec<ModuleId>,
    cursor: usize,
    batch: usize,
    found: Vec<Location>,
    cancel: CancellationFlag,
}

impl ReferenceSearch {
    /// Captures the module list; modules created later are not searched
    pub fn new(name: impl Into<String>, modules: Vec<ModuleId>, batch: usize, cancel: CancellationFlag) -> Self {
        Self {
            name: name.into(),
            modules,
            cursor: 0,
            batch: batch.max(1),
            found: Vec::new(),
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancel
    }

    /// Scans the next batch of modules
    pub fn step(&mut self, scheduler: &ModuleScheduler, analyzer: &dyn ModuleAnalyzer) -> SearchProgress {
        if self.cancel.is_cancelled() {
            debug!("Reference search for '{}' cancelled at {}/{}", self.name, self.cursor, self.modules.len());
            return SearchProgress::Cancelled;
        }

        let end = (self.cursor + self.batch).min(self.modules.len());
        for &id in &self.modules[self.cursor..end] {
            let Some(module) = scheduler.module(id).filter(|m| m.loaded) else {
                continue;
            };
            let Ok(uri) = Url::from_file_path(&module.path) else {
                continue;
            };
            for range in analyzer.find_references(module, &self.name) {
                self.found.push(Location { uri: uri.clone(), range });
            }
        }
        self.cursor = end;

        if self.cursor >= self.modules.len() {
            debug!("Reference search for '{}' found {} locations", self.name, self.found.len());
            SearchProgress::Complete(std::mem::take(&mut self.found))
        } else {
            SearchProgress::Pending
        }
    }
}

/// Turns the locations of a completed search into a rename edit
pub fn rename_edit(locations: &[Location], new_name: &str) -> WorkspaceEdit {
    let mut changes: HashMap<Url, Vec<TextEdit>> = HashMap::new();
    for location in locations {
        changes
            .entry(location.uri.clone())
            .or_default()
            .push(TextEdit { range: location.range, new_text: new_name.to_string() });
    }
    WorkspaceEdit { changes: Some(changes), ..Default::default() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{OutlineAnalyzer, StageCaps};
    use std::path::Path;
    use std::time::Duration;

    fn scheduler_with(files: &[(&str, &str)]) -> ModuleScheduler {
        let mut scheduler = ModuleScheduler::new(StageCaps::default(), Duration::ZERO, Duration::ZERO);
        for (path, text) in files {
            scheduler.on_document_opened(Path::new(path), text.to_string());
        }
        scheduler
    }

    #[test]
    fn test_search_steps_until_complete() {
        let scheduler = scheduler_with(&[
            ("/ws/A.as", "class AHero {}"),
            ("/ws/B.as", "AHero Hero;"),
            ("/ws/C.as", "int Unrelated;"),
        ]);
        let analyzer = OutlineAnalyzer::new();
        let mut search = ReferenceSearch::new("AHero", scheduler.module_ids(), 2, CancellationFlag::new());

        assert_eq!(search.step(&scheduler, &analyzer), SearchProgress::Pending);
        match search.step(&scheduler, &analyzer) {
            SearchProgress::Complete(locations) => {
                assert_eq!(locations.len(), 2);
                let edit = rename_edit(&locations, "AChampion");
                assert_eq!(edit.changes.unwrap().len(), 2);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_search_stops() {
        let scheduler = scheduler_with(&[("/ws/A.as", "class AHero {}"), ("/ws/B.as", "AHero X;")]);
        let analyzer = OutlineAnalyzer::new();
        let flag = CancellationFlag::new();
        let mut search = ReferenceSearch::new("AHero", scheduler.module_ids(), 1, flag.clone());

        assert_eq!(search.step(&scheduler, &analyzer), SearchProgress::Pending);
        flag.cancel();
        assert_eq!(search.step(&scheduler, &analyzer), SearchProgress::Cancelled);
    }
}
