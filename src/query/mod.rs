//! Read-only query engines over the type database
//!
//! Every query takes the database by shared reference and returns a typed
//! result; failures are [`QueryError`] values and never panics.

pub mod hierarchy;
pub mod members;
pub mod search;

use ropey::Rope;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::kb::{TypeDatabase, TypeId};

pub use hierarchy::{get_type_hierarchy, HierarchyParams, HierarchyResult};
pub use members::{get_type_members, MemberInfo, MembersParams, MembersResult};
pub use search::{search_symbols, SearchParams, SearchResult, SourceFilter};

/// Typed failure of a query
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Malformed or out-of-range caller input
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The name does not resolve in the current database state
    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Access to the script sources behind script-declared types, used to turn
/// declaration offsets into file locations
pub trait ModuleSources {
    fn file_path(&self, module: &str) -> Option<String>;
    fn source_text(&self, module: &str) -> Option<&Rope>;
}

/// No sources available; script types fall back to line 1
impl ModuleSources for () {
    fn file_path(&self, _module: &str) -> Option<String> {
        None
    }

    fn source_text(&self, _module: &str) -> Option<&Rope> {
        None
    }
}

/// Resolves a possibly qualified type name.
///
/// An explicit namespace is tried first; when it yields nothing the lookup
/// falls back to the embedded `Ns::Type` qualification and then to a global
/// lookup by bare name.
pub fn resolve_type_name(
    db: &TypeDatabase,
    name: &str,
    namespace: Option<&str>,
) -> QueryResult<TypeId> {
    let name = name.trim();
    if name.is_empty() || name.ends_with("::") {
        return Err(QueryError::InvalidParams(format!("invalid type name '{}'", name)));
    }

    if let Some(ns) = namespace.map(str::trim).filter(|ns| !ns.is_empty()) {
        let bare = name.rsplit("::").next().unwrap_or(name);
        if let Some(id) = db.find_namespace(ns).and_then(|ns| db.lookup_type_in(ns, bare)) {
            return Ok(id);
        }
    }

    db.lookup_type(name)
        .or_else(|| name.rsplit_once("::").and_then(|(_, bare)| db.lookup_type(bare)))
        .ok_or_else(|| QueryError::NotFound(format!("type '{}' not found", name)))
}

/// Ordered ancestors of `id` (nearest first), stopping at an unresolvable
/// parent or at the first revisited type
pub fn ancestor_chain(db: &TypeDatabase, id: TypeId) -> Vec<TypeId> {
    let mut chain = Vec::new();
    let mut visited = FxHashSet::default();
    visited.insert(id);

    let mut current = db.get_type(id).and_then(|ty| db.resolve_parent(ty));
    while let Some(parent) = current {
        if !visited.insert(parent) {
            break;
        }
        chain.push(parent);
        current = db.get_type(parent).and_then(|ty| db.resolve_parent(ty));
    }
    chain
}
