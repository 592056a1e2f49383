//! One JSON-RPC message per line.

use serde::Serialize;

use crate::types::{JsonRpcMessage, McpError, McpResult};

pub fn parse_message(line: &str) -> McpResult<JsonRpcMessage> {
    let line = line.trim();
    if line.is_empty() {
        return Err(McpError::ParseError("Empty message".to_string()));
    }
    serde_json::from_str(line).map_err(|e| McpError::ParseError(e.to_string()))
}

/// Serialize `value` as a single line with a trailing newline.
pub fn frame_message(value: &impl Serialize) -> McpResult<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}
