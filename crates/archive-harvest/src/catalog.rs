//! Client for the portal's internal file-listing API.
//!
//! Two response envelopes are in circulation and both are normalized here:
//!
//! * `{"result": "success", "payload": [ {orgnlAtchFileNm, atcflNo, atcflSz}, ... ]}`
//! * `{"success": true, "data": {"files": [...]}}` or `{"data": {"data": [...]}}`
//!
//! The client never fails past its own boundary: HTTP errors, network errors and
//! unrecognized payloads all come back as `success: false` with a detail string.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::classify;
use crate::config::{HttpSettings, PortalSettings};
use crate::download::{fallback_file_name, file_name_from_url};
use crate::types::{AssetDescriptor, HarvestError, SourceMethod};

/// Placeholder in the download URL template.
pub const FILE_TOKEN_PLACEHOLDER: &str = "{atcflNo}";

const NAME_KEYS: &[&str] = &["orgnlAtchFileNm", "fileName", "fileNm", "orgFileName", "originalName", "name"];
const TOKEN_KEYS: &[&str] = &["atcflNo", "fileId", "atchFileId", "fileSn"];
const URL_KEYS: &[&str] = &["downloadUrl", "fileUrl", "url", "filePath"];
const SIZE_KEYS: &[&str] = &["atcflSz", "fileSize", "fileSz", "size"];

/// Which response envelope a catalog answer used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSchema {
    Payload,
    DataFiles,
    DataData,
}

/// Result of one catalog call.
#[derive(Debug, Clone, Default)]
pub struct CatalogResponse {
    pub success: bool,
    pub assets: Vec<AssetDescriptor>,
    pub raw_response: Option<Value>,
    pub schema: Option<CatalogSchema>,
    /// Why the call did not succeed.
    pub detail: Option<String>,
}

impl CatalogResponse {
    fn unavailable(detail: impl Into<String>, raw_response: Option<Value>) -> Self {
        Self {
            success: false,
            raw_response,
            detail: Some(detail.into()),
            ..Default::default()
        }
    }

    /// Image-classified assets only.
    pub fn images(&self) -> Vec<AssetDescriptor> {
        self.assets
            .iter()
            .filter(|a| classify::is_image(Some(&a.file_name)))
            .cloned()
            .collect()
    }

    /// The failure as an error value, for reporting.
    pub fn error(&self) -> Option<HarvestError> {
        if self.success {
            return None;
        }
        Some(HarvestError::CatalogUnavailable(
            self.detail.clone().unwrap_or_else(|| "unknown".to_string()),
        ))
    }
}

/// Calls the listing endpoints with the portal header set.
#[derive(Clone)]
pub struct CatalogClient {
    client: reqwest::Client,
    headers: HeaderMap,
    portal: PortalSettings,
}

impl CatalogClient {
    pub fn new(http: &HttpSettings, portal: &PortalSettings) -> Self {
        let mut headers = crate::http::portal_headers(http, portal);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

        Self {
            client: crate::http::build_client(http, http.request_timeout()),
            headers,
            portal: portal.clone(),
        }
    }

    /// Primary listing call: form POST of `medSeq`, `payload` envelope expected.
    pub async fn fetch(&self, med_seq: &str) -> CatalogResponse {
        let request = self
            .client
            .post(&self.portal.catalog_endpoint)
            .headers(self.headers.clone())
            .form(&[("medSeq", med_seq)]);
        self.send(request).await
    }

    /// Secondary listing call: GET with `medSeq` query, `data.*` envelope expected.
    pub async fn fetch_generic(&self, med_seq: &str) -> CatalogResponse {
        let request = self
            .client
            .get(&self.portal.generic_catalog_endpoint)
            .headers(self.headers.clone())
            .query(&[("medSeq", med_seq)]);
        self.send(request).await
    }

    pub fn endpoint(&self) -> &str {
        &self.portal.catalog_endpoint
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> CatalogResponse {
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return CatalogResponse::unavailable(format!("request failed: {e}"), None),
        };

        let status = response.status();
        if !status.is_success() {
            return CatalogResponse::unavailable(format!("HTTP {}", status.as_u16()), None);
        }

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return CatalogResponse::unavailable(format!("response is not JSON: {e}"), None),
        };

        match normalize(&body, &self.portal) {
            Ok((schema, assets)) => CatalogResponse {
                success: true,
                assets,
                raw_response: Some(body),
                schema: Some(schema),
                detail: None,
            },
            Err(detail) => CatalogResponse::unavailable(detail, Some(body)),
        }
    }
}

/// Detect the envelope, check its success marker, and normalize every record.
pub fn normalize(
    body: &Value,
    portal: &PortalSettings,
) -> Result<(CatalogSchema, Vec<AssetDescriptor>), String> {
    let (schema, records) = if let Some(records) = body.get("payload").and_then(Value::as_array) {
        (CatalogSchema::Payload, records)
    } else if let Some(records) = body.pointer("/data/files").and_then(Value::as_array) {
        (CatalogSchema::DataFiles, records)
    } else if let Some(records) = body.pointer("/data/data").and_then(Value::as_array) {
        (CatalogSchema::DataData, records)
    } else {
        return Err("unrecognized response envelope".to_string());
    };

    if !has_success_marker(body) {
        return Err("response carries no success marker".to_string());
    }

    let assets = records
        .iter()
        .filter(|r| r.is_object())
        .map(|r| normalize_record(r, portal))
        .collect();

    Ok((schema, assets))
}

fn has_success_marker(body: &Value) -> bool {
    let text_marker = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .is_some_and(|s| s.eq_ignore_ascii_case("success") || s.eq_ignore_ascii_case("ok"))
    };
    text_marker("result")
        || text_marker("status")
        || body.get("success").and_then(Value::as_bool) == Some(true)
}

fn normalize_record(record: &Value, portal: &PortalSettings) -> AssetDescriptor {
    let name = first_str(record, NAME_KEYS);
    let token = first_str(record, TOKEN_KEYS);

    let url = first_str(record, URL_KEYS)
        .and_then(|u| resolve_against(&portal.referer, &u))
        .or_else(|| {
            token.as_ref().map(|t| {
                portal
                    .download_url_template
                    .replace(FILE_TOKEN_PLACEHOLDER, &urlencoding::encode(t))
            })
        });

    let file_name = name
        .clone()
        .or_else(|| {
            url.as_deref()
                .and_then(|u| Url::parse(u).ok())
                .and_then(|u| file_name_from_url(&u))
        })
        .unwrap_or_else(|| fallback_file_name("catalog", None));

    let file_size = SIZE_KEYS
        .iter()
        .find_map(|k| record.get(*k).and_then(as_byte_count))
        .map(format_size)
        .unwrap_or_else(|| "Unknown".to_string());

    AssetDescriptor {
        url,
        display_text: name.or(token).unwrap_or_else(|| file_name.clone()),
        media_type: classify::media_type(&file_name),
        file_name,
        file_size,
        source_method: SourceMethod::CatalogApi,
        raw_metadata: record.clone(),
    }
}

fn first_str(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match record.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn as_byte_count(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn resolve_against(base: &str, href: &str) -> Option<String> {
    if let Ok(u) = Url::parse(href) {
        return Some(u.to_string());
    }
    Url::parse(base).ok()?.join(href).ok().map(|u| u.to_string())
}

/// Human readable size label: "512 B", "1.50 KB", "1.00 MB", "2.00 GB".
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.2} KB", b / KB)
    } else if b < GB {
        format!("{:.2} MB", b / MB)
    } else {
        format!("{:.2} GB", b / GB)
    }
}
