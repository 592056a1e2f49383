use serde_json::Value;

use crate::context::HarvestContext;
use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

use super::{crawl, search};

pub struct ToolRegistry;

impl ToolRegistry {
    pub fn list_tools() -> Vec<ToolDefinition> {
        vec![search::definition(), crawl::definition()]
    }

    /// Unknown tool names are protocol errors. Everything else, including
    /// bad arguments, comes back inside the tool's result envelope.
    pub async fn call(
        name: &str,
        arguments: Option<Value>,
        context: &HarvestContext,
    ) -> McpResult<ToolCallResult> {
        let args = arguments.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        tracing::debug!(tool = name, "tool call");

        match name {
            "search" => Ok(search::execute(args, context).await),
            "crawl" => Ok(crawl::execute(args, context).await),
            _ => Err(McpError::ToolNotFound(name.to_string())),
        }
    }
}
