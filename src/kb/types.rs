//! Core data model of the type database
//!
//! Namespaces, types and symbols live in flat arenas owned by
//! [`TypeDatabase`](super::TypeDatabase) and refer to each other through the
//! small copyable ids defined here. Parent links between types are kept as
//! names and resolved lazily, so a type may arrive before its supertype.

use serde::{Deserialize, Serialize};

/// Index of a namespace in the database arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(pub(crate) u32);

/// Index of a type in the database arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

/// Process-unique identifier of a method or property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub(crate) u64);

impl NamespaceId {
    /// The root namespace always occupies the first arena slot
    pub const ROOT: NamespaceId = NamespaceId(0);
}

/// Classification of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TypeKind {
    #[default]
    Class,
    Struct,
    Enum,
    Primitive,
    Delegate,
    Event,
    TemplateInstantiation,
}

impl TypeKind {
    /// Only classes take part in hierarchy queries
    pub fn is_class_like(self) -> bool {
        matches!(self, TypeKind::Class)
    }
}

/// Member visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl Visibility {
    /// Keyword prefix used when rendering signatures; empty for public members
    pub fn keyword_prefix(self) -> &'static str {
        match self {
            Visibility::Public => "",
            Visibility::Protected => "protected ",
            Visibility::Private => "private ",
        }
    }
}

/// Byte offsets of a script declaration inside its module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationSpan {
    pub start: usize,
    pub end: usize,
    pub scope_start: usize,
    pub scope_end: usize,
}

/// Where a type came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeOrigin {
    /// Streamed from the engine (or restored from a snapshot of such a stream)
    Native,
    /// Declared in a script module
    Script { module: String, span: DeclarationSpan },
}

impl TypeOrigin {
    pub fn module(&self) -> Option<&str> {
        match self {
            TypeOrigin::Native => None,
            TypeOrigin::Script { module, .. } => Some(module),
        }
    }
}

/// One parameter of a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub type_name: String,
    pub default_value: Option<String>,
}

/// A callable symbol
#[derive(Debug, Clone, PartialEq)]
pub struct DbMethod {
    pub name: String,
    pub return_type: String,
    pub parameters: Vec<Parameter>,
    pub visibility: Visibility,
    pub is_constructor: bool,
    pub is_static: bool,
    pub is_const: bool,
    pub is_mixin: bool,
    pub documentation: Option<String>,
}

impl DbMethod {
    /// Key used to recognise a re-declaration of the same overload
    pub fn overload_key(&self) -> String {
        let params: Vec<&str> = self.parameters.iter().map(|p| p.type_name.as_str()).collect();
        format!("{}({})", self.name, params.join(","))
    }

    /// Names like `opAdd` or `opEquals` implement operators
    pub fn is_operator_overload(&self) -> bool {
        let mut chars = self.name.chars();
        matches!((chars.next(), chars.next(), chars.next()), (Some('o'), Some('p'), Some(c)) if c.is_ascii_uppercase())
    }
}

/// A data symbol
#[derive(Debug, Clone, PartialEq)]
pub struct DbProperty {
    pub name: String,
    pub type_name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub documentation: Option<String>,
}

/// Owner of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolOwner {
    Type(TypeId),
    Namespace(NamespaceId),
}

/// Closed union over everything that can be a member
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    Method(DbMethod),
    Property(DbProperty),
}

/// A method or property stored in the database
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub id: SymbolId,
    pub owner: SymbolOwner,
    /// Script module that declared this symbol, if any
    pub module: Option<String>,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn name(&self) -> &str {
        match &self.kind {
            SymbolKind::Method(method) => &method.name,
            SymbolKind::Property(property) => &property.name,
        }
    }

    pub fn visibility(&self) -> Visibility {
        match &self.kind {
            SymbolKind::Method(method) => method.visibility,
            SymbolKind::Property(property) => property.visibility,
        }
    }

    pub fn documentation(&self) -> Option<&str> {
        match &self.kind {
            SymbolKind::Method(method) => method.documentation.as_deref(),
            SymbolKind::Property(property) => property.documentation.as_deref(),
        }
    }

    pub fn as_method(&self) -> Option<&DbMethod> {
        match &self.kind {
            SymbolKind::Method(method) => Some(method),
            SymbolKind::Property(_) => None,
        }
    }
}

/// A type stored in the database
#[derive(Debug, Clone, PartialEq)]
pub struct DbType {
    pub id: TypeId,
    pub name: String,
    pub namespace: NamespaceId,
    pub kind: TypeKind,
    pub supertype: Option<String>,
    pub unrealsuper: Option<String>,
    /// Primitive aliases, e.g. `float` standing for `float64`
    pub alias_of: Option<String>,
    pub origin: TypeOrigin,
    pub documentation: Option<String>,
    pub methods: Vec<SymbolId>,
    pub properties: Vec<SymbolId>,
}

impl DbType {
    pub fn is_native(&self) -> bool {
        matches!(self.origin, TypeOrigin::Native)
    }

    /// Parent name consulted by hierarchy walks: `supertype` wins, `unrealsuper`
    /// is only a fallback when no `supertype` is declared
    pub fn parent_name(&self) -> Option<&str> {
        match &self.supertype {
            Some(name) => Some(name.as_str()),
            None => self.unrealsuper.as_deref(),
        }
    }
}

/// A namespace node
#[derive(Debug, Clone, PartialEq)]
pub struct DbNamespace {
    pub id: NamespaceId,
    pub name: String,
    pub qualified_name: String,
    pub parent: Option<NamespaceId>,
    pub children: Vec<NamespaceId>,
    pub types: Vec<TypeId>,
    pub functions: Vec<SymbolId>,
    pub properties: Vec<SymbolId>,
}

impl DbNamespace {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Strips qualifiers and reference markers from a type as written in a
/// signature: `const AActor&in` becomes `AActor`
pub fn base_type_name(type_name: &str) -> &str {
    let mut name = type_name.trim();
    if let Some(stripped) = name.strip_prefix("const ") {
        name = stripped.trim_start();
    }
    for suffix in ["&inout", "&in", "&out", "&", "?", "@"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped.trim_end();
            break;
        }
    }
    if let Some(stripped) = name.strip_suffix(" const") {
        name = stripped.trim_end();
    }
    name
}
