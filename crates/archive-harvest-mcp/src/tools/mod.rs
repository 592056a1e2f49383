//! The `search` and `crawl` tools.

pub mod crawl;
pub mod registry;
pub mod search;

pub use registry::ToolRegistry;

use serde_json::{json, Value};

/// Failure body shared by both tools: `{success: false, error, error_type, params}`.
pub(crate) fn failure_payload(error: &str, error_type: &str, params: Value) -> Value {
    json!({
        "success": false,
        "error": error,
        "error_type": error_type,
        "params": params,
    })
}
