use crate::types::{JsonRpcRequest, McpError, McpResult, JSONRPC_VERSION};

/// Reject requests with the wrong protocol version or an empty method.
pub fn validate_request(request: &JsonRpcRequest) -> McpResult<()> {
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(McpError::InvalidRequest(format!(
            "expected jsonrpc \"{JSONRPC_VERSION}\", got \"{}\"",
            request.jsonrpc
        )));
    }
    if request.method.trim().is_empty() {
        return Err(McpError::InvalidRequest("method must not be empty".into()));
    }
    Ok(())
}
