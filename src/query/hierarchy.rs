//! Type hierarchy queries
//!
//! Walks the supertype chain and the subtype tree of a class with explicit
//! depth and breadth limits. Parent links may form cycles, so every walk
//! carries a visited set and never emits a type twice.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::{resolve_type_name, ModuleSources, QueryError, QueryResult};
use crate::kb::{DbType, TypeDatabase, TypeId, TypeOrigin};

/// Depth and breadth limits of a hierarchy query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HierarchyLimits {
    pub max_super_depth: usize,
    pub max_sub_depth: usize,
    pub max_sub_breadth: usize,
}

impl Default for HierarchyLimits {
    fn default() -> Self {
        Self { max_super_depth: 3, max_sub_depth: 2, max_sub_breadth: 10 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyParams {
    pub name: String,
    pub max_super_depth: Option<usize>,
    pub max_sub_depth: Option<usize>,
    pub max_sub_breadth: Option<usize>,
}

/// Where a class in the result was declared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClassSource {
    Native,
    #[serde(rename_all = "camelCase")]
    Script { file_path: String, start_line: usize, end_line: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Truncation {
    pub supers: bool,
    pub derived_depth: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub derived_breadth_by_class: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyResult {
    pub root: String,
    pub supers: Vec<String>,
    pub derived_by_parent: BTreeMap<String, Vec<String>>,
    pub source_by_class: BTreeMap<String, ClassSource>,
    pub limits: HierarchyLimits,
    pub truncated: Truncation,
}

/// Answers a hierarchy query for a class-like type
pub fn get_type_hierarchy(
    db: &TypeDatabase,
    sources: &dyn ModuleSources,
    params: &HierarchyParams,
    defaults: HierarchyLimits,
) -> QueryResult<HierarchyResult> {
    let limits = HierarchyLimits {
        max_super_depth: params.max_super_depth.unwrap_or(defaults.max_super_depth),
        max_sub_depth: params.max_sub_depth.unwrap_or(defaults.max_sub_depth),
        max_sub_breadth: params.max_sub_breadth.unwrap_or(defaults.max_sub_breadth),
    };
    if limits.max_super_depth == 0 && limits.max_sub_depth == 0 {
        return Err(QueryError::InvalidParams(
            "maxSuperDepth and maxSubDepth cannot both be 0".to_string(),
        ));
    }

    let root_id = resolve_type_name(db, &params.name, None)?;
    let root = db
        .get_type(root_id)
        .ok_or_else(|| QueryError::InternalError(format!("dangling type id for '{}'", params.name)))?;
    if !root.kind.is_class_like() {
        return Err(QueryError::InvalidParams(format!(
            "'{}' is a {:?}, not a class",
            params.name, root.kind
        )));
    }

    let mut walk = HierarchyWalk {
        db,
        sources,
        limits,
        visited: FxHashSet::default(),
        result: HierarchyResult {
            root: class_label(db, root),
            supers: Vec::new(),
            derived_by_parent: BTreeMap::new(),
            source_by_class: BTreeMap::new(),
            limits,
            truncated: Truncation::default(),
        },
    };
    walk.visit(root);
    walk.collect_supers(root);

    let children = reverse_adjacency(db);
    walk.collect_derived(root_id, &children, 0);

    debug!(
        "Hierarchy for {}: {} supers, {} parents with children",
        walk.result.root,
        walk.result.supers.len(),
        walk.result.derived_by_parent.len()
    );
    Ok(walk.result)
}

/// Maps every type to the class-like types naming it as a parent
fn reverse_adjacency(db: &TypeDatabase) -> FxHashMap<TypeId, Vec<TypeId>> {
    let mut children: FxHashMap<TypeId, Vec<TypeId>> = FxHashMap::default();
    for ty in db.types().filter(|ty| ty.kind.is_class_like()) {
        for parent in db.resolve_parent_links(ty) {
            let entry = children.entry(parent).or_default();
            if !entry.contains(&ty.id) {
                entry.push(ty.id);
            }
        }
    }
    children
}

struct HierarchyWalk<'a> {
    db: &'a TypeDatabase,
    sources: &'a dyn ModuleSources,
    limits: HierarchyLimits,
    visited: FxHashSet<TypeId>,
    result: HierarchyResult,
}

impl<'a> HierarchyWalk<'a> {
    fn visit(&mut self, ty: &DbType) {
        self.visited.insert(ty.id);
        let source = class_source(self.sources, ty);
        self.result.source_by_class.entry(class_label(self.db, ty)).or_insert(source);
    }

    fn collect_supers(&mut self, root: &DbType) {
        let db = self.db;
        let mut current = root;
        while self.result.supers.len() < self.limits.max_super_depth {
            let Some(parent) = db.resolve_parent(current).and_then(|id| db.get_type(id)) else {
                return;
            };
            if self.visited.contains(&parent.id) {
                return;
            }
            self.visit(parent);
            self.result.supers.push(class_label(db, parent));
            current = parent;
        }

        self.result.truncated.supers = db
            .resolve_parent(current)
            .is_some_and(|id| !self.visited.contains(&id));
    }

    fn collect_derived(
        &mut self,
        node: TypeId,
        adjacency: &FxHashMap<TypeId, Vec<TypeId>>,
        depth: usize,
    ) {
        let db = self.db;
        let mut children: Vec<&DbType> = adjacency
            .get(&node)
            .into_iter()
            .flatten()
            .filter(|id| !self.visited.contains(*id))
            .filter_map(|id| db.get_type(*id))
            .collect();
        if children.is_empty() {
            return;
        }
        if depth >= self.limits.max_sub_depth {
            self.result.truncated.derived_depth = true;
            return;
        }

        children.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| db.qualified_type_name(a.id).cmp(&db.qualified_type_name(b.id)))
        });
        let total = children.len();
        if total > self.limits.max_sub_breadth {
            children.truncate(self.limits.max_sub_breadth);
            if let Some(parent) = db.get_type(node) {
                self.result
                    .truncated
                    .derived_breadth_by_class
                    .insert(class_label(db, parent), total - self.limits.max_sub_breadth);
            }
        }
        if children.is_empty() {
            return;
        }

        for child in &children {
            self.visit(child);
        }
        if let Some(parent) = db.get_type(node) {
            self.result
                .derived_by_parent
                .insert(class_label(db, parent), children.iter().map(|c| class_label(db, c)).collect());
        }
        for child in children {
            self.collect_derived(child.id, adjacency, depth + 1);
        }
    }
}

/// Result key of a class: the bare name, qualified when another namespace
/// declares the same name
fn class_label(db: &TypeDatabase, ty: &DbType) -> String {
    if db.is_type_name_shared(&ty.name) {
        db.qualified_type_name(ty.id)
    } else {
        ty.name.clone()
    }
}

fn class_source(sources: &dyn ModuleSources, ty: &DbType) -> ClassSource {
    match &ty.origin {
        TypeOrigin::Native => ClassSource::Native,
        TypeOrigin::Script { module, span } => {
            let file_path = sources.file_path(module).unwrap_or_else(|| module.clone());
            let (start_line, end_line) = match sources.source_text(module) {
                Some(text) => {
                    let line_of = |offset: usize| text.byte_to_line(offset.min(text.len_bytes())) + 1;
                    (line_of(span.start), line_of(span.end))
                }
                None => (1, 1),
            };
            ClassSource::Script { file_path, start_line, end_line }
        }
    }
}
