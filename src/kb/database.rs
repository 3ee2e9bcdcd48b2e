//! Type database: the single source of truth for namespaces, types and symbols
//!
//! Storage is a set of flat arenas indexed by [`NamespaceId`], [`TypeId`] and
//! [`SymbolId`]. Engine fragments are merged additively; script modules
//! register and replace their own types. Parent links stay as names and are
//! resolved on demand through [`TypeDatabase::resolve_parent`].

use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use super::fragment::{DumpFragment, IngestError, NamespaceDecl, ScriptTypeDecl, TypeDecl};
use super::settings::ScriptSettings;
use super::types::{
    base_type_name, DbNamespace, DbType, NamespaceId, Symbol, SymbolId, SymbolKind, SymbolOwner,
    TypeId, TypeKind, TypeOrigin,
};

/// Primitive types registered when the database is finalized
const PRIMITIVES: &[&str] = &[
    "bool", "int", "int8", "int16", "int32", "int64", "uint", "uint8", "uint16", "uint32",
    "uint64", "float32", "float64", "void",
];

#[derive(Debug)]
pub struct TypeDatabase {
    namespaces: Vec<DbNamespace>,
    namespace_index: FxHashMap<String, NamespaceId>,
    types: Vec<Option<DbType>>,
    type_index: FxHashMap<(NamespaceId, String), TypeId>,
    types_by_name: FxHashMap<String, Vec<TypeId>>,
    symbols: FxHashMap<SymbolId, Symbol>,
    next_symbol: u64,
    script_types: FxHashMap<String, Vec<TypeId>>,
    script_decls: FxHashMap<String, Vec<TypeDecl>>,
    ready: bool,
    partial: bool,
    generation: u64,
    fragments_ingested: usize,
}

/// Outcome of registering one module's script types
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptRegistration {
    /// The declarations differ from the previous registration, ignoring
    /// source offsets
    pub changed: bool,
    /// Declarations that would have shadowed an engine type
    pub rejected: Vec<ScriptTypeDecl>,
}

/// Counters reported in logs after ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    pub namespaces: usize,
    pub types: usize,
    pub symbols: usize,
    pub fragments: usize,
}

impl Default for TypeDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeDatabase {
    pub fn new() -> Self {
        let root = DbNamespace {
            id: NamespaceId::ROOT,
            name: String::new(),
            qualified_name: String::new(),
            parent: None,
            children: Vec::new(),
            types: Vec::new(),
            functions: Vec::new(),
            properties: Vec::new(),
        };
        let mut namespace_index = FxHashMap::default();
        namespace_index.insert(String::new(), NamespaceId::ROOT);

        Self {
            namespaces: vec![root],
            namespace_index,
            types: Vec::new(),
            type_index: FxHashMap::default(),
            types_by_name: FxHashMap::default(),
            symbols: FxHashMap::default(),
            next_symbol: 1,
            script_types: FxHashMap::default(),
            script_decls: FxHashMap::default(),
            ready: false,
            partial: false,
            generation: 0,
            fragments_ingested: 0,
        }
    }

    // ===== Readiness =====

    /// True once at least one ingestion has been finalized
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Incremented by every finalization
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the last finalization ran on an incomplete dump
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            namespaces: self.namespaces.len(),
            types: self.types.iter().flatten().count(),
            symbols: self.symbols.len(),
            fragments: self.fragments_ingested,
        }
    }

    // ===== Ingestion =====

    /// Merges one raw engine fragment.
    ///
    /// The fragment is decoded completely before the first mutation, so a
    /// rejected fragment leaves the database untouched.
    pub fn ingest_fragment(&mut self, raw: &serde_json::Value) -> Result<(), IngestError> {
        let fragment = DumpFragment::from_value(raw)?;
        self.merge_fragment(&fragment);
        Ok(())
    }

    pub fn merge_fragment(&mut self, fragment: &DumpFragment) {
        for decl in &fragment.namespaces {
            self.merge_namespace(decl);
        }
        for decl in &fragment.types {
            self.insert_type(decl, TypeOrigin::Native);
        }
        self.fragments_ingested += 1;
        debug!(
            "Merged fragment: {} types, {} namespaces",
            fragment.types.len(),
            fragment.namespaces.len()
        );
    }

    /// Performs fix-ups that need the complete type set and marks the
    /// database ready.
    pub fn finalize(&mut self, settings: &ScriptSettings, partial: bool) {
        for primitive in PRIMITIVES {
            self.register_primitive(primitive, None);
        }
        let float_target = if settings.float_is_float64 { "float64" } else { "float32" };
        self.register_primitive("float", Some(float_target));
        self.register_primitive("double", Some("float64"));

        self.ready = true;
        self.partial = partial;
        self.generation += 1;

        let stats = self.stats();
        if partial {
            warn!(
                "Type database finalized with partial data (generation {}): {} types, {} symbols from {} fragments",
                self.generation, stats.types, stats.symbols, stats.fragments
            );
        } else {
            info!(
                "Type database finalized (generation {}): {} types, {} symbols from {} fragments",
                self.generation, stats.types, stats.symbols, stats.fragments
            );
        }
    }

    fn register_primitive(&mut self, name: &str, alias_of: Option<&str>) {
        let decl = TypeDecl {
            name: name.to_string(),
            kind: TypeKind::Primitive,
            ..Default::default()
        };
        let id = self.insert_type(&decl, TypeOrigin::Native);
        if let Some(ty) = self.type_mut(id) {
            ty.alias_of = alias_of.map(str::to_string);
        }
    }

    /// Replaces every type `module` declared with `decls`.
    ///
    /// A declaration that names an existing engine type is not registered;
    /// it comes back in [`ScriptRegistration::rejected`].
    pub fn register_script_types(&mut self, module: &str, decls: Vec<ScriptTypeDecl>) -> ScriptRegistration {
        self.remove_script_types(module);

        let (accepted, rejected): (Vec<_>, Vec<_>) =
            decls.into_iter().partition(|script| !self.is_native_type(&script.decl));
        for script in &rejected {
            warn!(
                "Script module {} redeclares engine type '{}', keeping the engine declaration",
                module, script.decl.name
            );
        }

        let new_decls: Vec<TypeDecl> = accepted.iter().map(|d| d.decl.clone()).collect();
        let changed = self.script_decls.get(module) != Some(&new_decls);

        let mut ids = Vec::with_capacity(accepted.len());
        for script in &accepted {
            let origin = TypeOrigin::Script { module: module.to_string(), span: script.span };
            ids.push(self.insert_type(&script.decl, origin));
        }
        self.script_types.insert(module.to_string(), ids);
        self.script_decls.insert(module.to_string(), new_decls);

        ScriptRegistration { changed, rejected }
    }

    fn is_native_type(&self, decl: &TypeDecl) -> bool {
        let (ns_name, name) = decl.namespace_and_name();
        self.find_namespace(ns_name.unwrap_or(""))
            .and_then(|ns| self.lookup_type_in(ns, name))
            .and_then(|id| self.get_type(id))
            .is_some_and(DbType::is_native)
    }

    /// Drops the types a script module declared
    pub fn remove_script_types(&mut self, module: &str) {
        let Some(ids) = self.script_types.remove(module) else {
            return;
        };
        for id in ids {
            let owned = self
                .get_type(id)
                .is_some_and(|ty| ty.origin.module() == Some(module));
            if owned {
                self.remove_type(id);
            }
        }
    }

    fn merge_namespace(&mut self, decl: &NamespaceDecl) {
        let ns = self.ensure_namespace(&decl.name);

        for method in &decl.methods {
            let method = super::types::DbMethod::from(method);
            let key = method.overload_key();
            let existing = self.namespaces[ns.0 as usize].functions.iter().copied().find(|id| {
                self.symbols
                    .get(id)
                    .and_then(Symbol::as_method)
                    .is_some_and(|m| m.overload_key() == key)
            });
            match existing.and_then(|id| self.symbols.get_mut(&id)) {
                Some(symbol) => symbol.kind = SymbolKind::Method(method),
                None => {
                    let id = self.alloc_symbol(SymbolOwner::Namespace(ns), None, SymbolKind::Method(method));
                    self.namespaces[ns.0 as usize].functions.push(id);
                }
            }
        }

        for property in &decl.properties {
            let existing = self.namespaces[ns.0 as usize]
                .properties
                .iter()
                .copied()
                .find(|id| self.symbols.get(id).is_some_and(|s| s.name() == property.name));
            let kind = SymbolKind::Property(property.into());
            match existing.and_then(|id| self.symbols.get_mut(&id)) {
                Some(symbol) => symbol.kind = kind,
                None => {
                    let id = self.alloc_symbol(SymbolOwner::Namespace(ns), None, kind);
                    self.namespaces[ns.0 as usize].properties.push(id);
                }
            }
        }
    }

    fn insert_type(&mut self, decl: &TypeDecl, origin: TypeOrigin) -> TypeId {
        let (ns_name, name) = decl.namespace_and_name();
        let name = name.to_string();
        let ns = self.ensure_namespace(ns_name.unwrap_or(""));
        let key = (ns, name.clone());

        let id = match self.type_index.get(&key) {
            Some(&existing) => {
                self.clear_type_members(existing);
                existing
            }
            None => {
                let id = TypeId(self.types.len() as u32);
                self.types.push(None);
                self.type_index.insert(key, id);
                self.namespaces[ns.0 as usize].types.push(id);
                self.types_by_name.entry(name.clone()).or_default().push(id);
                id
            }
        };

        let module = origin.module().map(str::to_string);
        let methods = decl
            .methods
            .iter()
            .map(|m| self.alloc_symbol(SymbolOwner::Type(id), module.clone(), SymbolKind::Method(m.into())))
            .collect();
        let properties = decl
            .properties
            .iter()
            .map(|p| self.alloc_symbol(SymbolOwner::Type(id), module.clone(), SymbolKind::Property(p.into())))
            .collect();

        self.types[id.0 as usize] = Some(DbType {
            id,
            name,
            namespace: ns,
            kind: decl.effective_kind(),
            supertype: decl.supertype.clone().filter(|s| !s.is_empty()),
            unrealsuper: decl.unrealsuper.clone().filter(|s| !s.is_empty()),
            alias_of: None,
            origin,
            documentation: decl.doc.clone(),
            methods,
            properties,
        });
        id
    }

    fn remove_type(&mut self, id: TypeId) {
        self.clear_type_members(id);
        let Some(ty) = self.types.get_mut(id.0 as usize).and_then(Option::take) else {
            return;
        };
        self.type_index.remove(&(ty.namespace, ty.name.clone()));
        self.namespaces[ty.namespace.0 as usize].types.retain(|t| *t != id);
        if let Some(ids) = self.types_by_name.get_mut(&ty.name) {
            ids.retain(|t| *t != id);
            if ids.is_empty() {
                self.types_by_name.remove(&ty.name);
            }
        }
    }

    fn clear_type_members(&mut self, id: TypeId) {
        if let Some(ty) = self.types.get_mut(id.0 as usize).and_then(Option::as_mut) {
            for symbol in ty.methods.drain(..).chain(ty.properties.drain(..)) {
                self.symbols.remove(&symbol);
            }
        }
    }

    fn alloc_symbol(&mut self, owner: SymbolOwner, module: Option<String>, kind: SymbolKind) -> SymbolId {
        let id = SymbolId(self.next_symbol);
        self.next_symbol += 1;
        self.symbols.insert(id, Symbol { id, owner, module, kind });
        id
    }

    fn type_mut(&mut self, id: TypeId) -> Option<&mut DbType> {
        self.types.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Returns the namespace for a qualified name, creating the chain as needed
    pub fn ensure_namespace(&mut self, qualified: &str) -> NamespaceId {
        let qualified = qualified.trim_matches(':');
        if let Some(&id) = self.namespace_index.get(qualified) {
            return id;
        }

        let mut current = NamespaceId::ROOT;
        let mut path = String::new();
        for segment in qualified.split("::").filter(|s| !s.is_empty()) {
            if !path.is_empty() {
                path.push_str("::");
            }
            path.push_str(segment);

            current = match self.namespace_index.get(&path) {
                Some(&id) => id,
                None => {
                    let id = NamespaceId(self.namespaces.len() as u32);
                    self.namespaces.push(DbNamespace {
                        id,
                        name: segment.to_string(),
                        qualified_name: path.clone(),
                        parent: Some(current),
                        children: Vec::new(),
                        types: Vec::new(),
                        functions: Vec::new(),
                        properties: Vec::new(),
                    });
                    self.namespaces[current.0 as usize].children.push(id);
                    self.namespace_index.insert(path.clone(), id);
                    id
                }
            };
        }
        current
    }

    // ===== Lookup =====

    pub fn namespace(&self, id: NamespaceId) -> &DbNamespace {
        &self.namespaces[id.0 as usize]
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &DbNamespace> {
        self.namespaces.iter()
    }

    pub fn find_namespace(&self, qualified: &str) -> Option<NamespaceId> {
        self.namespace_index.get(qualified.trim_matches(':')).copied()
    }

    pub fn get_type(&self, id: TypeId) -> Option<&DbType> {
        self.types.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn types(&self) -> impl Iterator<Item = &DbType> {
        self.types.iter().flatten()
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(&id)
    }

    /// Looks a type up by its name inside one namespace
    pub fn lookup_type_in(&self, ns: NamespaceId, name: &str) -> Option<TypeId> {
        self.type_index.get(&(ns, name.to_string())).copied()
    }

    /// Global lookup: `Ns::Type` goes straight to the namespace; bare names try
    /// the root namespace first, then the namespace with the smallest
    /// qualified name that declares it
    pub fn lookup_type(&self, name: &str) -> Option<TypeId> {
        let name = base_type_name(name);
        if let Some((ns, bare)) = name.rsplit_once("::") {
            let ns = self.find_namespace(ns)?;
            return self.lookup_type_in(ns, bare);
        }
        if let Some(id) = self.lookup_type_in(NamespaceId::ROOT, name) {
            return Some(id);
        }
        self.types_by_name
            .get(name)?
            .iter()
            .copied()
            .min_by(|a, b| self.qualified_type_name(*a).cmp(&self.qualified_type_name(*b)))
    }

    /// Resolves a type reference written inside namespace `from`, walking
    /// outward to the root before falling back to a global lookup
    pub fn resolve_type_reference(&self, name: &str, from: NamespaceId) -> Option<TypeId> {
        let name = base_type_name(name);
        if name.is_empty() {
            return None;
        }
        if name.contains("::") {
            return self.lookup_type(name);
        }
        let mut scope = Some(from);
        while let Some(ns) = scope {
            if let Some(id) = self.lookup_type_in(ns, name) {
                return Some(id);
            }
            scope = self.namespace(ns).parent;
        }
        self.lookup_type(name)
    }

    /// Resolves the single parent used by hierarchy walks
    pub fn resolve_parent(&self, ty: &DbType) -> Option<TypeId> {
        let parent = ty.parent_name()?;
        self.resolve_type_reference(parent, ty.namespace)
            .filter(|id| *id != ty.id)
    }

    /// Resolves both parent links independently, for reverse adjacency
    pub fn resolve_parent_links(&self, ty: &DbType) -> Vec<TypeId> {
        let mut parents = Vec::with_capacity(2);
        for name in [ty.supertype.as_deref(), ty.unrealsuper.as_deref()].into_iter().flatten() {
            if let Some(id) = self.resolve_type_reference(name, ty.namespace) {
                if id != ty.id && !parents.contains(&id) {
                    parents.push(id);
                }
            }
        }
        parents
    }

    /// More than one namespace declares a type called `name`
    pub fn is_type_name_shared(&self, name: &str) -> bool {
        self.types_by_name.get(name).is_some_and(|ids| ids.len() > 1)
    }

    pub fn qualified_type_name(&self, id: TypeId) -> String {
        match self.get_type(id) {
            Some(ty) => {
                let ns = self.namespace(ty.namespace);
                if ns.is_root() {
                    ty.name.clone()
                } else {
                    format!("{}::{}", ns.qualified_name, ty.name)
                }
            }
            None => String::new(),
        }
    }
}
