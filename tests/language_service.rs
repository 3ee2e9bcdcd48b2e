//! Language service: ingestion lifecycle, snapshots and reference jobs

mod common;

use std::time::{Duration, Instant};

use tempfile::TempDir;

use angelscript_language_server::config::ServerConfig;
use angelscript_language_server::engine::{EngineEvent, EngineMessage};
use angelscript_language_server::kb::{ScriptSettings, SnapshotPayload, SnapshotStore};
use angelscript_language_server::query::HierarchyParams;
use angelscript_language_server::service::{LanguageService, ReferenceOutcome, ReferenceRequest, ServiceOutput};

use common::{game_fragments, run_service};

fn service_at(dir: &TempDir) -> LanguageService {
    let mut service = LanguageService::with_outline_analyzer(ServerConfig::default());
    service.set_workspace_root(dir.path().to_path_buf());
    service
}

fn stream_dump(service: &mut LanguageService, now: Instant) {
    for fragment in game_fragments() {
        service.handle_engine_event(EngineEvent::Message(EngineMessage::TypeDump { fragment }), now);
    }
}

fn references_done(outputs: &[ServiceOutput]) -> Vec<&ReferenceOutcome> {
    outputs
        .iter()
        .filter_map(|output| match output {
            ServiceOutput::ReferencesDone { outcome, .. } => Some(outcome),
            _ => None,
        })
        .collect()
}

#[test]
fn test_complete_dump_is_snapshotted_after_debounce() {
    let dir = TempDir::new().unwrap();
    let mut service = service_at(&dir);
    let store = SnapshotStore::for_workspace(dir.path());
    let start = Instant::now();

    service.handle_engine_event(EngineEvent::Connected, start);
    stream_dump(&mut service, start);
    service.handle_engine_event(EngineEvent::Message(EngineMessage::EndOfDump), start);
    assert!(service.database().is_ready());
    assert!(service.has_pending_snapshot());

    service.tick(start + Duration::from_secs(1));
    assert!(store.load().is_none());

    service.tick(start + Duration::from_millis(2100));
    assert!(!service.has_pending_snapshot());
    let saved = store.load().unwrap();
    assert_eq!(saved.debug_database_chunks, game_fragments());
    assert_eq!(saved.workspace_root, dir.path().to_string_lossy());
}

#[test]
fn test_partial_dump_is_not_snapshotted() {
    let dir = TempDir::new().unwrap();
    let mut service = service_at(&dir);
    let start = Instant::now();

    service.handle_engine_event(EngineEvent::Connected, start);
    stream_dump(&mut service, start);
    service.tick(start + Duration::from_secs(6));

    assert!(service.database().is_partial());
    assert!(!service.has_pending_snapshot());
    service.tick(start + Duration::from_secs(10));
    assert!(SnapshotStore::for_workspace(dir.path()).load().is_none());
}

#[test]
fn test_dump_that_went_quiet_is_not_snapshotted() {
    let dir = TempDir::new().unwrap();
    let mut service = service_at(&dir);
    let start = Instant::now();
    let dump = |name: &str| EngineEvent::Message(EngineMessage::TypeDump {
        fragment: serde_json::json!({ "types": [{ "name": name }] }),
    });

    service.handle_engine_event(EngineEvent::Connected, start);
    service.handle_engine_event(dump("AFirst"), start);
    service.tick(start + Duration::from_secs(6));
    assert!(service.database().is_partial());

    let resumed = start + Duration::from_secs(7);
    service.handle_engine_event(dump("ASecond"), resumed);
    service.handle_engine_event(EngineEvent::Message(EngineMessage::EndOfDump), resumed);
    assert!(!service.database().is_partial());
    assert!(service.database().lookup_type("AFirst").is_some());
    assert!(!service.has_pending_snapshot());

    service.tick(resumed + Duration::from_secs(3));
    assert!(SnapshotStore::for_workspace(dir.path()).load().is_none());

    // A fresh dump after the stalled one is snapshotted in full
    let next = resumed + Duration::from_secs(10);
    service.handle_engine_event(dump("AThird"), next);
    service.handle_engine_event(EngineEvent::Message(EngineMessage::EndOfDump), next);
    service.tick(next + Duration::from_secs(3));
    let saved = SnapshotStore::for_workspace(dir.path()).load().unwrap();
    assert_eq!(saved.debug_database_chunks, vec![serde_json::json!({ "types": [{ "name": "AThird" }] })]);
}

#[test]
fn test_dump_without_connection_is_not_snapshotted() {
    let dir = TempDir::new().unwrap();
    let mut service = service_at(&dir);
    let start = Instant::now();

    stream_dump(&mut service, start);
    service.handle_engine_event(EngineEvent::Message(EngineMessage::EndOfDump), start);
    assert!(service.database().is_ready());
    assert!(!service.has_pending_snapshot());
}

#[test]
fn test_disconnect_drops_pending_snapshot() {
    let dir = TempDir::new().unwrap();
    let mut service = service_at(&dir);
    let start = Instant::now();

    service.handle_engine_event(EngineEvent::Connected, start);
    stream_dump(&mut service, start);
    service.handle_engine_event(EngineEvent::Message(EngineMessage::EndOfDump), start);
    service.handle_engine_event(EngineEvent::Disconnected, start + Duration::from_millis(500));

    service.tick(start + Duration::from_secs(3));
    assert!(!service.is_engine_connected());
    assert!(SnapshotStore::for_workspace(dir.path()).load().is_none());
    assert!(service.database().lookup_type("AHero").is_some());
}

#[test]
fn test_bootstrap_from_snapshot() {
    let dir = TempDir::new().unwrap();
    SnapshotStore::for_workspace(dir.path())
        .save(&SnapshotPayload {
            workspace_root: dir.path().to_string_lossy().into_owned(),
            debug_database_chunks: game_fragments(),
            script_settings: ScriptSettings { float_is_float64: true, ..Default::default() },
            engine_supports_create_blueprint: true,
        })
        .unwrap();

    let mut service = service_at(&dir);
    assert!(service.bootstrap_from_snapshot());
    assert!(service.database().is_ready());
    assert!(service.settings().float_is_float64);
    assert!(service.engine_supports_create_blueprint());

    let hierarchy = service
        .type_hierarchy(&HierarchyParams { name: "AHero".into(), ..Default::default() })
        .unwrap();
    assert_eq!(hierarchy.supers, vec!["APawn".to_string()]);
}

#[test]
fn test_bootstrap_without_snapshot_is_cold() {
    let dir = TempDir::new().unwrap();
    let mut service = service_at(&dir);
    assert!(!service.bootstrap_from_snapshot());
    assert!(!service.database().is_ready());
}

fn reference_service(dir: &TempDir) -> LanguageService {
    let config = ServerConfig { reference_batch_size: 1, ..Default::default() };
    let mut service = LanguageService::with_outline_analyzer(config);
    service.set_workspace_root(dir.path().to_path_buf());
    service.on_document_opened(&dir.path().join("Hero.as"), "class AHero {}\n".to_string());
    service.on_document_opened(&dir.path().join("Game.as"), "AHero Hero;\nAHero Other; // AHero\n".to_string());
    service
}

#[test]
fn test_reference_search_completes_over_ticks() {
    let dir = TempDir::new().unwrap();
    let mut service = reference_service(&dir);
    service.start_reference_search("AHero", ReferenceRequest::FindReferences).unwrap();

    let start = Instant::now();
    let first = service.tick(start);
    assert!(references_done(&first).is_empty());

    let (outputs, _) = run_service(&mut service, start + Duration::from_millis(10), 1);
    let done = references_done(&outputs);
    assert_eq!(done.len(), 1);
    match done[0] {
        ReferenceOutcome::Locations(locations) => assert_eq!(locations.len(), 3),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_rename_groups_edits_by_file() {
    let dir = TempDir::new().unwrap();
    let mut service = reference_service(&dir);
    service
        .start_reference_search("AHero", ReferenceRequest::Rename { new_name: "AChampion".into() })
        .unwrap();

    let (outputs, _) = run_service(&mut service, Instant::now(), 3);
    let done = references_done(&outputs);
    let ReferenceOutcome::Rename(edit) = done[0] else {
        panic!("expected a rename outcome");
    };
    let changes = edit.changes.as_ref().unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes.values().map(Vec::len).sum::<usize>(), 3);
    assert!(changes.values().flatten().all(|e| e.new_text == "AChampion"));
}

#[test]
fn test_cancelled_search_reports_cancelled() {
    let dir = TempDir::new().unwrap();
    let mut service = reference_service(&dir);
    let (job, _) = service.start_reference_search("AHero", ReferenceRequest::FindReferences).unwrap();

    let start = Instant::now();
    assert!(references_done(&service.tick(start)).is_empty());
    service.cancel_reference_search(job);

    let outputs = service.tick(start + Duration::from_millis(10));
    assert_eq!(references_done(&outputs), vec![&ReferenceOutcome::Cancelled]);

    let (_, flag) = service.start_reference_search("AHero", ReferenceRequest::FindReferences).unwrap();
    flag.cancel();
    let outputs = service.tick(start + Duration::from_millis(20));
    assert_eq!(references_done(&outputs), vec![&ReferenceOutcome::Cancelled]);
}
