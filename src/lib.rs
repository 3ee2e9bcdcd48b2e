pub mod config;
pub mod engine;
pub mod kb;
pub mod logging;
pub mod lsp;
pub mod pipeline;
pub mod query;
pub mod service;
