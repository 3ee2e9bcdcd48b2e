//! Type Knowledge Base
//!
//! The in-memory registry of every namespace, type and symbol known to the
//! server, fed by engine type dumps and by the script modules of the
//! workspace.

pub mod database;
pub mod fragment;
pub mod settings;
pub mod snapshot;
pub mod types;

pub use database::{DatabaseStats, ScriptRegistration, TypeDatabase};
pub use fragment::{DumpFragment, IngestError, ScriptTypeDecl, TypeDecl};
pub use settings::{ScriptSettings, SettingsMessage};
pub use snapshot::{SnapshotPayload, SnapshotStore, SNAPSHOT_VERSION};
pub use types::{
    base_type_name, DbMethod, DbNamespace, DbProperty, DbType, DeclarationSpan, NamespaceId,
    Parameter, Symbol, SymbolId, SymbolKind, SymbolOwner, TypeId, TypeKind, TypeOrigin, Visibility,
};
