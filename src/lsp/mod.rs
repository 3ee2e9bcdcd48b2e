//! Language Server Protocol front end

pub mod backend;
pub mod document;

pub use backend::{AngelscriptBackend, GET_TYPE_HIERARCHY, GET_TYPE_MEMBERS, SEARCH_SYMBOLS};
