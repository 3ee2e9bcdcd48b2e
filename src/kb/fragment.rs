//! Wire shape of type-dump fragments
//!
//! The engine streams its type database as a sequence of JSON fragments. A
//! fragment is decoded completely into these declarations before anything is
//! merged, so a malformed fragment never leaves the database half-updated.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{DbMethod, DbProperty, DeclarationSpan, Parameter, TypeKind, Visibility};

/// Errors raised while decoding a fragment
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed type dump fragment: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("type declaration without a name")]
    UnnamedType,
}

/// One decoded fragment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DumpFragment {
    pub types: Vec<TypeDecl>,
    pub namespaces: Vec<NamespaceDecl>,
}

impl DumpFragment {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, IngestError> {
        let fragment = DumpFragment::deserialize(value)?;
        if fragment.types.iter().any(|ty| ty.namespace_and_name().1.trim().is_empty()) {
            return Err(IngestError::UnnamedType);
        }
        Ok(fragment)
    }
}

/// A type declaration, either streamed from the engine or produced by a
/// script module's type registration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TypeDecl {
    pub name: String,
    pub namespace: Option<String>,
    pub kind: TypeKind,
    pub supertype: Option<String>,
    pub unrealsuper: Option<String>,
    pub doc: Option<String>,
    pub methods: Vec<MethodDecl>,
    pub properties: Vec<PropertyDecl>,
}

impl TypeDecl {
    /// Splits `Ns::Type` names when no explicit namespace was given
    pub fn namespace_and_name(&self) -> (Option<&str>, &str) {
        if let Some(ns) = self.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            return (Some(ns), self.name.as_str());
        }
        match self.name.rsplit_once("::") {
            Some((ns, name)) if !ns.is_empty() => (Some(ns), name),
            Some((_, name)) => (None, name),
            None => (None, self.name.as_str()),
        }
    }

    /// Template instantiations are recognised by their argument list
    pub fn effective_kind(&self) -> TypeKind {
        if self.kind == TypeKind::Class && self.name.contains('<') {
            TypeKind::TemplateInstantiation
        } else {
            self.kind
        }
    }
}

/// A type declared by a script module, with the source offsets needed to
/// point back at the declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptTypeDecl {
    pub decl: TypeDecl,
    pub span: DeclarationSpan,
}

/// Free functions and globals of one namespace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NamespaceDecl {
    pub name: String,
    pub methods: Vec<MethodDecl>,
    pub properties: Vec<PropertyDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArgDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MethodDecl {
    pub name: String,
    pub return_type: String,
    pub args: Vec<ArgDecl>,
    pub visibility: Visibility,
    pub is_constructor: bool,
    pub is_mixin: bool,
    pub is_static: bool,
    pub is_const: bool,
    pub doc: Option<String>,
}

impl Default for MethodDecl {
    fn default() -> Self {
        Self {
            name: String::new(),
            return_type: "void".to_string(),
            args: Vec::new(),
            visibility: Visibility::Public,
            is_constructor: false,
            is_mixin: false,
            is_static: false,
            is_const: false,
            doc: None,
        }
    }
}

impl From<&MethodDecl> for DbMethod {
    fn from(decl: &MethodDecl) -> Self {
        DbMethod {
            name: decl.name.clone(),
            return_type: decl.return_type.clone(),
            parameters: decl
                .args
                .iter()
                .map(|arg| Parameter {
                    name: arg.name.clone(),
                    type_name: arg.type_name.clone(),
                    default_value: arg.default.clone(),
                })
                .collect(),
            visibility: decl.visibility,
            is_constructor: decl.is_constructor,
            is_static: decl.is_static,
            is_const: decl.is_const,
            is_mixin: decl.is_mixin,
            documentation: decl.doc.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PropertyDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub doc: Option<String>,
}

impl From<&PropertyDecl> for DbProperty {
    fn from(decl: &PropertyDecl) -> Self {
        DbProperty {
            name: decl.name.clone(),
            type_name: decl.type_name.clone(),
            visibility: decl.visibility,
            is_static: decl.is_static,
            documentation: decl.doc.clone(),
        }
    }
}
