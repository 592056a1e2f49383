//! Tool: crawl. Discovers the image files of one item page and downloads them.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{json, Value};

use archive_harvest::{
    BackendPreference, CrawlFailure, CrawlRequest, CrawlResult, HarvestConfig, HarvestError,
    StrategyKind,
};

use crate::context::HarvestContext;
use crate::types::{ToolCallResult, ToolDefinition};

use super::failure_payload;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrawlParams {
    #[serde(default)]
    page_url: Option<String>,
    #[serde(default)]
    download_path: Option<String>,
    #[serde(default)]
    use_headless: Option<bool>,
    #[serde(default = "default_auto_download")]
    auto_download: bool,
    #[serde(default)]
    backend: Option<String>,
}

fn default_auto_download() -> bool {
    true
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "crawl".to_string(),
        description: Some(
            "Find the image files attached to an archive item page and optionally download them. \
             Tries the file-listing API first, then the rendered page, then a second browser driver."
                .to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "pageUrl": { "type": "string", "description": "Item page URL on the archive portal" },
                "downloadPath": { "type": "string", "default": "./downloads" },
                "useHeadless": { "type": "boolean", "description": "Run the browser without a window" },
                "autoDownload": { "type": "boolean", "default": true },
                "backend": { "type": "string", "enum": ["primary", "alternate"] }
            },
            "required": ["pageUrl"]
        }),
    }
}

fn parse_backend(name: Option<&str>) -> Result<BackendPreference, HarvestError> {
    match name.map(str::trim) {
        None | Some("") | Some("auto") => Ok(BackendPreference::Auto),
        Some("primary") => Ok(BackendPreference::Primary),
        Some("alternate") => Ok(BackendPreference::Alternate),
        Some(other) => Err(HarvestError::InvalidInput(format!(
            "unknown backend '{other}', expected 'primary' or 'alternate'"
        ))),
    }
}

/// Fill defaults from config and validate. On failure the raw arguments are
/// what gets echoed back.
fn normalize(args: &Value, config: &HarvestConfig) -> Result<CrawlRequest, HarvestError> {
    let params: CrawlParams = serde_json::from_value(args.clone())
        .map_err(|e| HarvestError::InvalidInput(format!("invalid crawl arguments: {e}")))?;

    let page_url = params
        .page_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| HarvestError::InvalidInput("pageUrl is required".into()))?;

    Ok(CrawlRequest {
        page_url,
        download_path: params
            .download_path
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| config.download.directory.clone()),
        headless: params.use_headless.unwrap_or(config.browser.headless),
        auto_download: params.auto_download,
        backend: parse_backend(params.backend.as_deref())?,
    })
}

fn request_params(request: &CrawlRequest) -> Value {
    json!({
        "pageUrl": request.page_url,
        "downloadPath": request.download_path.display().to_string(),
        "useHeadless": request.headless,
        "autoDownload": request.auto_download,
        "backend": request.backend,
    })
}

pub async fn execute(args: Value, context: &HarvestContext) -> ToolCallResult {
    let request = match normalize(&args, context.config()) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "rejected crawl arguments");
            return ToolCallResult::json(&failure_payload(&e.to_string(), e.error_type(), args));
        }
    };

    match context.harvester().crawl(request).await {
        Ok(result) => ToolCallResult::json(&success_payload(&result)),
        Err(failure) => ToolCallResult::json(&crawl_failure_payload(&failure)),
    }
}

fn crawl_failure_payload(failure: &CrawlFailure) -> Value {
    let mut payload = failure_payload(
        &failure.error,
        &failure.error_type,
        request_params(&failure.request),
    );
    payload["duration_ms"] = json!(failure.duration_ms);
    payload
}

pub(crate) fn success_payload(result: &CrawlResult) -> Value {
    let attempted = result.download_outcomes.len();
    let succeeded = result.download_outcomes.iter().filter(|o| o.success).count();

    let (bulk_attempted, bulk_success, bulk_info) = match (&result.bulk, &result.alternate) {
        (_, Some(alt)) => (true, alt.success, json!(alt)),
        (Some(bulk), None) => (bulk.attempted, bulk.success, json!(bulk)),
        (None, None) => (false, false, Value::Null),
    };

    let mut message = format!(
        "Found {} image file(s) via {}",
        result.descriptors.len(),
        strategy_name(result)
    );
    if result.auto_download && attempted > 0 {
        message.push_str(&format!("; downloaded {succeeded}/{attempted}"));
    }
    if bulk_success {
        message.push_str("; bulk download completed");
    }

    json!({
        "success": true,
        "message": message,
        "crawl_info": {
            "source_url": result.source_url,
            "duration_ms": result.duration_ms,
            "links_found": result.links_found,
            "unique_links": result.descriptors.len(),
            "auto_download_enabled": result.auto_download,
            "downloads_attempted": attempted,
            "bulk_download_attempted": bulk_attempted,
            "bulk_download_success": bulk_success,
            "catalog_attempted": result.catalog_attempted,
            "catalog_succeeded": result.catalog_succeeded,
            "strategy": result.strategy,
        },
        "extracted_links": result.descriptors,
        "download_results": result.download_outcomes,
        "bulk_download_info": bulk_info,
    })
}

fn strategy_name(result: &CrawlResult) -> &'static str {
    match result.strategy {
        StrategyKind::Catalog => "the file-listing API",
        StrategyKind::Dom => "the rendered page",
        StrategyKind::Alternate => "the alternate browser driver",
    }
}
