//! Fragment ingestion into the type database

mod common;

use serde_json::json;

use angelscript_language_server::kb::{ScriptSettings, TypeDatabase};
use angelscript_language_server::query::hierarchy::HierarchyLimits;
use angelscript_language_server::query::{
    get_type_hierarchy, get_type_members, search_symbols, HierarchyParams, MembersParams, SearchParams,
};

use common::game_fragments;

fn hero_fragment() -> serde_json::Value {
    json!({ "types": [{ "name": "AHero", "namespace": "Game", "supertype": "APawn", "methods": [
        { "name": "GetHealth", "returnType": "float" },
        { "name": "Jump" }
    ]}]})
}

fn snapshot_of_queries(db: &TypeDatabase) -> (String, String, String) {
    let hierarchy = get_type_hierarchy(
        db,
        &(),
        &HierarchyParams { name: "APawn".into(), ..Default::default() },
        HierarchyLimits::default(),
    )
    .unwrap();
    let members = get_type_members(
        db,
        &MembersParams { name: "AHero".into(), include_inherited: true, ..Default::default() },
    )
    .unwrap();
    let search = search_symbols(db, &SearchParams { query: "hero".into(), ..Default::default() }).unwrap();
    (
        serde_json::to_string(&hierarchy).unwrap(),
        serde_json::to_string(&members).unwrap(),
        serde_json::to_string(&search).unwrap(),
    )
}

#[test]
fn test_reingesting_fragments_is_idempotent() {
    let mut fragments = game_fragments();
    fragments.push(hero_fragment());

    let mut db = TypeDatabase::new();
    for fragment in &fragments {
        db.ingest_fragment(fragment).unwrap();
    }
    db.finalize(&ScriptSettings::default(), false);
    let first = snapshot_of_queries(&db);
    let first_stats = db.stats();

    for fragment in &fragments {
        db.ingest_fragment(fragment).unwrap();
    }
    db.finalize(&ScriptSettings::default(), false);
    let second = snapshot_of_queries(&db);

    assert_eq!(first, second);
    assert_eq!(db.stats().types, first_stats.types);
    assert_eq!(db.stats().symbols, first_stats.symbols);
}

#[test]
fn test_malformed_fragment_leaves_database_untouched() {
    let mut db = TypeDatabase::new();
    for fragment in game_fragments() {
        db.ingest_fragment(&fragment).unwrap();
    }
    let before = db.stats();

    let malformed = json!({ "types": [
        { "name": "AGood" },
        { "name": 42, "methods": "not a list" }
    ]});
    assert!(db.ingest_fragment(&malformed).is_err());
    assert!(db.ingest_fragment(&json!("just a string")).is_err());

    assert_eq!(db.stats(), before);
    assert!(db.lookup_type("AGood").is_none());
}

#[test]
fn test_database_is_not_ready_until_finalized() {
    let mut db = TypeDatabase::new();
    db.ingest_fragment(&hero_fragment()).unwrap();
    assert!(!db.is_ready());

    db.finalize(&ScriptSettings::default(), true);
    assert!(db.is_ready());
    assert!(db.is_partial());
    assert!(db.lookup_type("float").is_some());
}
