//! Member aggregation
//!
//! Computes the method and property surface of a type: its own members,
//! optionally those inherited through the ancestor chain, and namespace
//! mixin functions that can be called as if they were members.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::{ancestor_chain, resolve_type_name, QueryResult};
use crate::kb::{
    base_type_name, DbMethod, DbNamespace, DbProperty, DbType, Symbol, SymbolId, SymbolKind,
    TypeDatabase, TypeId, Visibility,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberKinds {
    Methods,
    Properties,
    #[default]
    Both,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MembersParams {
    pub name: String,
    pub namespace: Option<String>,
    pub include_inherited: bool,
    pub include_docs: bool,
    pub kinds: MemberKinds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberKind {
    Method,
    Property,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclaredInKind {
    Type,
    Namespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessorKind {
    Get,
    Set,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub kind: MemberKind,
    pub name: String,
    pub signature: String,
    pub description: Option<String>,
    pub declared_in: String,
    pub declared_in_kind: DeclaredInKind,
    pub is_inherited: bool,
    pub is_mixin: bool,
    pub is_accessor: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessor_kind: Option<AccessorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    /// Getter return type or setter argument type of an accessor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRef {
    pub name: String,
    pub namespace: String,
    pub qualified_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembersResult {
    #[serde(rename = "type")]
    pub ty: TypeRef,
    pub members: Vec<MemberInfo>,
}

struct Accessor {
    kind: AccessorKind,
    property_name: String,
    value_type: Option<String>,
}

/// `GetHealth` / `SetHealth` style accessor detection
fn accessor_of(method: &DbMethod, receiver_params: usize) -> Option<Accessor> {
    let (kind, rest) = if let Some(rest) = method.name.strip_prefix("Get") {
        (AccessorKind::Get, rest)
    } else if let Some(rest) = method.name.strip_prefix("Set") {
        (AccessorKind::Set, rest)
    } else {
        return None;
    };
    if rest.is_empty() {
        return None;
    }

    let value_type = match kind {
        AccessorKind::Get => Some(method.return_type.clone()),
        AccessorKind::Set => method
            .parameters
            .iter()
            .skip(receiver_params)
            .last()
            .map(|p| p.type_name.clone()),
    };
    Some(Accessor { kind, property_name: rest.to_string(), value_type })
}

fn render_params(method: &DbMethod, skip: usize) -> String {
    method
        .parameters
        .iter()
        .skip(skip)
        .map(|p| {
            let mut rendered = p.type_name.clone();
            if !p.name.is_empty() {
                rendered.push(' ');
                rendered.push_str(&p.name);
            }
            if let Some(default) = &p.default_value {
                rendered.push_str(" = ");
                rendered.push_str(default);
            }
            rendered
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn method_signature(method: &DbMethod, receiver: &str, skip: usize) -> String {
    let mut signature = format!(
        "{}{} {}.{}({})",
        method.visibility.keyword_prefix(),
        method.return_type,
        receiver,
        method.name,
        render_params(method, skip)
    );
    if method.is_const {
        signature.push_str(" const");
    }
    signature
}

fn property_signature(property: &DbProperty, receiver: &str) -> String {
    format!(
        "{}{} {}.{}",
        property.visibility.keyword_prefix(),
        property.type_name,
        receiver,
        property.name
    )
}

/// Identity of a member for override deduplication
fn member_key(kind: &SymbolKind) -> (MemberKind, String, String) {
    match kind {
        SymbolKind::Method(method) => {
            let params: Vec<&str> = method.parameters.iter().map(|p| p.type_name.as_str()).collect();
            (MemberKind::Method, method.name.clone(), params.join(","))
        }
        SymbolKind::Property(property) => {
            (MemberKind::Property, property.name.clone(), property.type_name.clone())
        }
    }
}

struct Collector<'a> {
    db: &'a TypeDatabase,
    params: &'a MembersParams,
    seen_ids: FxHashSet<SymbolId>,
    seen_keys: FxHashSet<(MemberKind, String, String)>,
    members: Vec<MemberInfo>,
}

impl<'a> Collector<'a> {
    fn wants(&self, kind: MemberKind, accessor: bool) -> bool {
        match self.params.kinds {
            MemberKinds::Both => true,
            MemberKinds::Methods => kind == MemberKind::Method,
            MemberKinds::Properties => kind == MemberKind::Property || accessor,
        }
    }

    fn description(&self, symbol: &Symbol) -> Option<String> {
        if self.params.include_docs {
            symbol.documentation().map(str::to_string)
        } else {
            None
        }
    }

    fn collect_type(&mut self, ty: &DbType, inherited: bool) {
        let db = self.db;
        let declared_in = db.qualified_type_name(ty.id);
        for &id in ty.methods.iter().chain(ty.properties.iter()) {
            let Some(symbol) = db.symbol(id) else {
                continue;
            };
            if inherited && symbol.visibility() == Visibility::Private {
                continue;
            }
            if symbol.as_method().is_some_and(|m| m.is_constructor) {
                continue;
            }
            if self.seen_ids.contains(&id) || !self.seen_keys.insert(member_key(&symbol.kind)) {
                continue;
            }
            self.seen_ids.insert(id);

            let info = match &symbol.kind {
                SymbolKind::Method(method) => {
                    let accessor = accessor_of(method, 0);
                    if !self.wants(MemberKind::Method, accessor.is_some()) {
                        continue;
                    }
                    self.method_info(symbol, method, &ty.name, 0, accessor, &declared_in, DeclaredInKind::Type, inherited)
                }
                SymbolKind::Property(property) => {
                    if !self.wants(MemberKind::Property, false) {
                        continue;
                    }
                    MemberInfo {
                        kind: MemberKind::Property,
                        name: property.name.clone(),
                        signature: property_signature(property, &ty.name),
                        description: self.description(symbol),
                        declared_in: declared_in.clone(),
                        declared_in_kind: DeclaredInKind::Type,
                        is_inherited: inherited,
                        is_mixin: false,
                        is_accessor: false,
                        accessor_kind: None,
                        property_name: None,
                        value_type: None,
                        visibility: property.visibility,
                    }
                }
            };
            self.members.push(info);
        }
    }

    fn collect_mixins(&mut self, root: TypeId, ancestors: &[TypeId]) {
        let db = self.db;
        for ns in db.namespaces() {
            for &id in &ns.functions {
                let Some(symbol) = db.symbol(id) else {
                    continue;
                };
                let Some(method) = symbol.as_method().filter(|m| m.is_mixin) else {
                    continue;
                };
                let Some(receiver) = mixin_receiver(db, ns, method) else {
                    continue;
                };
                let inherited = if receiver == root {
                    false
                } else if self.params.include_inherited && ancestors.contains(&receiver) {
                    true
                } else {
                    continue;
                };
                if !self.seen_ids.insert(id) {
                    continue;
                }

                let accessor = accessor_of(method, 1);
                if !self.wants(MemberKind::Method, accessor.is_some()) {
                    continue;
                }
                let receiver_name = db.get_type(receiver).map(|t| t.name.clone()).unwrap_or_default();
                let info = self.method_info(
                    symbol,
                    method,
                    &receiver_name,
                    1,
                    accessor,
                    &ns.qualified_name,
                    DeclaredInKind::Namespace,
                    inherited,
                );
                self.members.push(MemberInfo { is_mixin: true, ..info });
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn method_info(
        &self,
        symbol: &Symbol,
        method: &DbMethod,
        receiver: &str,
        skip: usize,
        accessor: Option<Accessor>,
        declared_in: &str,
        declared_in_kind: DeclaredInKind,
        inherited: bool,
    ) -> MemberInfo {
        let (accessor_kind, property_name, value_type) = match accessor {
            Some(a) => (Some(a.kind), Some(a.property_name), a.value_type),
            None => (None, None, None),
        };
        MemberInfo {
            kind: MemberKind::Method,
            name: method.name.clone(),
            signature: method_signature(method, receiver, skip),
            description: self.description(symbol),
            declared_in: declared_in.to_string(),
            declared_in_kind,
            is_inherited: inherited,
            is_mixin: false,
            is_accessor: accessor_kind.is_some(),
            accessor_kind,
            property_name,
            value_type,
            visibility: method.visibility,
        }
    }
}

/// Type a mixin function extends, taken from its first parameter
fn mixin_receiver(db: &TypeDatabase, ns: &DbNamespace, method: &DbMethod) -> Option<TypeId> {
    let first = method.parameters.first()?;
    db.resolve_type_reference(base_type_name(&first.type_name), ns.id)
}

/// Lists the members of a type
pub fn get_type_members(db: &TypeDatabase, params: &MembersParams) -> QueryResult<MembersResult> {
    let root_id = resolve_type_name(db, &params.name, params.namespace.as_deref())?;
    let root = db
        .get_type(root_id)
        .ok_or_else(|| super::QueryError::InternalError(format!("dangling type id for '{}'", params.name)))?;

    let ancestors = if params.include_inherited { ancestor_chain(db, root_id) } else { Vec::new() };

    let mut collector = Collector {
        db,
        params,
        seen_ids: FxHashSet::default(),
        seen_keys: FxHashSet::default(),
        members: Vec::new(),
    };
    collector.collect_type(root, false);
    for ancestor in ancestors.iter().filter_map(|id| db.get_type(*id)) {
        collector.collect_type(ancestor, true);
    }
    collector.collect_mixins(root_id, &ancestors);

    let namespace = db.namespace(root.namespace).qualified_name.clone();
    Ok(MembersResult {
        ty: TypeRef {
            name: root.name.clone(),
            namespace,
            qualified_name: db.qualified_type_name(root_id),
        },
        members: collector.members,
    })
}
