//! MCP server exposing archive catalogue search and image harvesting as tools.

pub mod config;
pub mod context;
pub mod protocol;
pub mod tools;
pub mod transport;
pub mod types;

pub use config::{load_config, resolve_config_path};
pub use context::HarvestContext;
pub use protocol::ProtocolHandler;
pub use transport::StdioTransport;
