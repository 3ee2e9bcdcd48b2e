//! Link to the running engine that supplies type information

pub mod connection;
pub mod messages;

pub use connection::{run_engine_supervisor, EngineEvent, EngineTransport, TcpJsonTransport};
pub use messages::{EngineMessage, EngineRequest};
