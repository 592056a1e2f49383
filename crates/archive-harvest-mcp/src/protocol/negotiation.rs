//! Initialize handshake state.

use crate::types::{ClientCapabilities, InitializeParams, InitializeResult, MCP_VERSION};

#[derive(Debug, Clone, Default)]
pub struct NegotiatedCapabilities {
    pub client: ClientCapabilities,
    pub client_name: Option<String>,
    pub initialized: bool,
}

impl NegotiatedCapabilities {
    /// Record the client and answer with the server's fixed capabilities.
    /// A differing protocol version is logged and otherwise ignored.
    pub fn negotiate(&mut self, params: InitializeParams) -> InitializeResult {
        if params.protocol_version != MCP_VERSION {
            tracing::warn!(
                requested = %params.protocol_version,
                supported = MCP_VERSION,
                "protocol version mismatch, continuing with server version"
            );
        }

        tracing::info!(
            client = %params.client_info.name,
            version = %params.client_info.version,
            "client connected"
        );
        self.client = params.capabilities;
        self.client_name = Some(params.client_info.name);

        InitializeResult::default_result()
    }

    pub fn mark_initialized(&mut self) {
        self.initialized = true;
        tracing::info!("handshake complete");
    }
}
