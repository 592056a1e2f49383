//! JSON-RPC dispatch for the MCP methods the server implements.

pub mod handler;
pub mod negotiation;
pub mod validator;

pub use handler::ProtocolHandler;
