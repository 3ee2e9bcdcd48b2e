//! Custom JSON-RPC requests
//!
//! The three query engines are exposed under the `angelscript/` method
//! namespace; `main` registers them on the `LspService` builder.

use tower_lsp::jsonrpc;
use tracing::debug;

use super::state::{AngelscriptBackend, Command};
use crate::query::hierarchy::HierarchyResult;
use crate::query::{HierarchyParams, MembersParams, MembersResult, SearchParams, SearchResult};

pub const GET_TYPE_HIERARCHY: &str = "angelscript/getTypeHierarchy";
pub const GET_TYPE_MEMBERS: &str = "angelscript/getTypeMembers";
pub const SEARCH_SYMBOLS: &str = "angelscript/searchSymbols";

impl AngelscriptBackend {
    pub async fn get_type_hierarchy(&self, params: HierarchyParams) -> jsonrpc::Result<HierarchyResult> {
        debug!("{} for '{}'", GET_TYPE_HIERARCHY, params.name);
        self.query(|reply| Command::TypeHierarchy { params, reply }).await
    }

    pub async fn get_type_members(&self, params: MembersParams) -> jsonrpc::Result<MembersResult> {
        debug!("{} for '{}'", GET_TYPE_MEMBERS, params.name);
        self.query(|reply| Command::TypeMembers { params, reply }).await
    }

    pub async fn search_symbols(&self, params: SearchParams) -> jsonrpc::Result<Vec<SearchResult>> {
        debug!("{} for '{}'", SEARCH_SYMBOLS, params.query);
        self.query(|reply| Command::SearchSymbols { params, reply }).await
    }
}
