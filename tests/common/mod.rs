//! Shared fixtures for the integration tests

#![allow(dead_code)]

pub mod lsp_client;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use angelscript_language_server::kb::{ScriptSettings, TypeDatabase};
use angelscript_language_server::pipeline::{ModuleAnalyzer, ModuleScheduler, PipelineEvent, StageCaps};
use angelscript_language_server::service::{LanguageService, ServiceOutput};

/// Step between simulated ticks; longer than every default debounce window
/// of the scheduler so timers fire on the next tick
pub const TICK: Duration = Duration::from_millis(300);

pub fn class(name: &str, supertype: Option<&str>) -> Value {
    match supertype {
        Some(parent) => json!({ "name": name, "supertype": parent }),
        None => json!({ "name": name }),
    }
}

/// Ingests every fragment and finalizes with default settings
pub fn database_from(fragments: &[Value]) -> TypeDatabase {
    let mut db = TypeDatabase::new();
    for fragment in fragments {
        db.ingest_fragment(fragment).expect("fixture fragment must decode");
    }
    db.finalize(&ScriptSettings::default(), false);
    db
}

/// Namespace `Game` holding `APawn` and `AHero : APawn`
pub fn game_fragments() -> Vec<Value> {
    vec![
        json!({ "namespaces": [{ "name": "Game" }] }),
        json!({ "types": [{ "name": "APawn", "namespace": "Game" }] }),
        json!({ "types": [{ "name": "AHero", "namespace": "Game", "supertype": "APawn" }] }),
    ]
}

/// A linear chain `C0 <- C1 <- ... <- C{len-1}`
pub fn chain_fragment(len: usize) -> Value {
    let types: Vec<Value> = (0..len)
        .map(|i| {
            let parent = (i > 0).then(|| format!("C{}", i - 1));
            class(&format!("C{}", i), parent.as_deref())
        })
        .collect();
    json!({ "types": types })
}

pub fn write_script(root: &Path, relative: &str, text: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, text).unwrap();
    path
}

pub fn scheduler() -> ModuleScheduler {
    ModuleScheduler::new(StageCaps::default(), Duration::from_millis(50), Duration::from_millis(100))
}

/// Ticks until the scheduler is idle, advancing the clock by [`TICK`] each
/// time. Returns every event and the final clock.
pub fn drain(
    scheduler: &mut ModuleScheduler,
    db: &mut TypeDatabase,
    analyzer: &mut dyn ModuleAnalyzer,
    mut now: Instant,
) -> (Vec<PipelineEvent>, Instant) {
    let mut events = Vec::new();
    for _ in 0..100 {
        events.extend(scheduler.tick(now, db, analyzer));
        if scheduler.is_idle() {
            break;
        }
        now += TICK;
    }
    assert!(scheduler.is_idle(), "scheduler did not settle");
    (events, now)
}

pub fn published_for(events: &[PipelineEvent], path: &Path) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::PublishDiagnostics { path: p, .. } if p == path))
        .count()
}

/// Ticks the service `count` times, advancing the clock by [`TICK`]
pub fn run_service(service: &mut LanguageService, mut now: Instant, count: usize) -> (Vec<ServiceOutput>, Instant) {
    let mut outputs = Vec::new();
    for _ in 0..count {
        outputs.extend(service.tick(now));
        now += TICK;
    }
    (outputs, now)
}
