//! Tool: search. Forwards a text query to the catalogue search endpoint.

use serde_json::{json, Value};

use archive_harvest::SearchQuery;

use crate::context::HarvestContext;
use crate::types::{ToolCallResult, ToolDefinition};

use super::failure_payload;

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "search".to_string(),
        description: Some(
            "Search the archive catalogue by keyword. Returns the raw API response and result counts."
                .to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "searchValue": { "type": "string", "description": "Search term" },
                "category": { "type": "string", "default": "0" },
                "pageNo": { "type": "string", "default": "1" },
                "numOfRows": { "type": "string", "default": "100" }
            },
            "required": ["searchValue"]
        }),
    }
}

/// Accepts strings or numbers for every parameter; anything else falls back to the default.
fn query_from(args: &Value) -> SearchQuery {
    let mut query = SearchQuery::new(text(args, "searchValue").unwrap_or_default());
    if let Some(category) = text(args, "category") {
        query.category = category;
    }
    if let Some(page_no) = text(args, "pageNo") {
        query.page_no = page_no;
    }
    if let Some(rows) = text(args, "numOfRows") {
        query.num_of_rows = rows;
    }
    query
}

fn text(args: &Value, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub async fn execute(args: Value, context: &HarvestContext) -> ToolCallResult {
    let query = query_from(&args);
    let params = serde_json::to_value(&query).unwrap_or(Value::Null);

    match context.search().search(&query).await {
        Ok(response) => {
            let total = response
                .summary
                .total_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".into());
            ToolCallResult::json(&json!({
                "success": true,
                "message": format!(
                    "Search for '{}' returned {} of {} result(s)",
                    query.search_value, response.summary.returned_count, total
                ),
                "search_info": {
                    "search_value": query.search_value,
                    "category": query.category,
                    "page_no": query.page_no,
                    "num_of_rows": query.num_of_rows,
                    "total_count": response.summary.total_count,
                    "returned_count": response.summary.returned_count,
                },
                "raw_response": response.raw,
            }))
        }
        Err(e) => {
            tracing::warn!(error = %e, "search failed");
            ToolCallResult::json(&failure_payload(&e.to_string(), e.error_type(), params))
        }
    }
}
