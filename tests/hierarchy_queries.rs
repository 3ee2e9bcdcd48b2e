//! Hierarchy queries over engine-ingested class trees

mod common;

use quickcheck::{QuickCheck, TestResult};
use serde_json::json;

use angelscript_language_server::query::hierarchy::{ClassSource, HierarchyLimits};
use angelscript_language_server::query::{get_type_hierarchy, HierarchyParams, QueryError};

use common::{chain_fragment, class, database_from, game_fragments};

fn params(name: &str) -> HierarchyParams {
    HierarchyParams { name: name.to_string(), ..Default::default() }
}

#[test]
fn test_namespaced_hero_resolves_its_parent() {
    let db = database_from(&game_fragments());
    let result = get_type_hierarchy(&db, &(), &params("AHero"), HierarchyLimits::default()).unwrap();

    assert_eq!(result.root, "AHero");
    assert_eq!(result.supers, vec!["APawn".to_string()]);
    assert!(result.derived_by_parent.is_empty());
    assert!(!result.truncated.supers);
    assert!(!result.truncated.derived_depth);
    assert!(result.truncated.derived_breadth_by_class.is_empty());
    assert_eq!(result.source_by_class.get("APawn"), Some(&ClassSource::Native));
}

#[test]
fn test_parent_lists_its_derived_classes() {
    let db = database_from(&game_fragments());
    let result = get_type_hierarchy(&db, &(), &params("Game::APawn"), HierarchyLimits::default()).unwrap();

    assert!(result.supers.is_empty());
    assert_eq!(result.derived_by_parent.get("APawn"), Some(&vec!["AHero".to_string()]));
}

#[test]
fn test_unknown_class_is_not_found() {
    let db = database_from(&game_fragments());
    let err = get_type_hierarchy(&db, &(), &params("AMissing"), HierarchyLimits::default()).unwrap_err();
    assert!(matches!(err, QueryError::NotFound(_)));
}

#[test]
fn test_cyclic_parents_terminate() {
    let db = database_from(&[json!({ "types": [
        class("A", Some("C")),
        class("B", Some("A")),
        class("C", Some("B")),
    ]})]);
    let result = get_type_hierarchy(&db, &(), &params("A"), HierarchyLimits::default()).unwrap();

    assert_eq!(result.supers, vec!["C".to_string(), "B".to_string()]);
    assert!(!result.truncated.supers);
    assert!(result.derived_by_parent.is_empty());
    assert_eq!(result.source_by_class.len(), 3);
}

#[test]
fn prop_supers_follow_depth_limit() {
    fn prop(len: u8, depth: u8) -> TestResult {
        let len = (len % 24) as usize + 1;
        let depth = (depth % 12) as usize + 1;

        let db = database_from(&[chain_fragment(len)]);
        let leaf = format!("C{}", len - 1);
        let p = HierarchyParams { max_super_depth: Some(depth), ..params(&leaf) };
        let result = match get_type_hierarchy(&db, &(), &p, HierarchyLimits::default()) {
            Ok(result) => result,
            Err(_) => return TestResult::failed(),
        };

        let ancestors = len - 1;
        let expected: Vec<String> = (0..ancestors.min(depth)).map(|i| format!("C{}", len - 2 - i)).collect();
        TestResult::from_bool(result.supers == expected && result.truncated.supers == (ancestors > depth))
    }
    QuickCheck::new().tests(50).quickcheck(prop as fn(u8, u8) -> TestResult);
}

#[test]
fn prop_breadth_truncation_counts_omitted_children() {
    fn prop(children: u8, breadth: u8) -> TestResult {
        let children = (children % 20) as usize + 1;
        let breadth = (breadth % 20) as usize + 1;

        let mut types = vec![class("ABase", None)];
        types.extend((0..children).map(|i| class(&format!("AChild{:02}", i), Some("ABase"))));
        let db = database_from(&[json!({ "types": types })]);

        let p = HierarchyParams { max_sub_breadth: Some(breadth), ..params("ABase") };
        let result = match get_type_hierarchy(&db, &(), &p, HierarchyLimits::default()) {
            Ok(result) => result,
            Err(_) => return TestResult::failed(),
        };

        let listed = result.derived_by_parent.get("ABase").map_or(0, Vec::len);
        let omitted = result.truncated.derived_breadth_by_class.get("ABase").copied();
        let expected_omitted = (children > breadth).then(|| children - breadth);
        TestResult::from_bool(listed == children.min(breadth) && omitted == expected_omitted)
    }
    QuickCheck::new().tests(50).quickcheck(prop as fn(u8, u8) -> TestResult);
}
