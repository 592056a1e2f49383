//! Core data types for discovered assets, download outcomes, and crawl results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which discovery strategy produced a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMethod {
    CatalogApi,
    DomSelector,
    DomImageTag,
    InfoOnly,
}

/// Media category derived from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Document,
    Audio,
    Unknown,
}

/// One discoverable downloadable item, regardless of which strategy found it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDescriptor {
    /// Absolute download URL. `None` when only descriptive metadata was recovered.
    pub url: Option<String>,
    pub display_text: String,
    /// Never empty; synthesized from a timestamp when unrecoverable.
    pub file_name: String,
    /// Human readable size label ("1.00 MB", "Unknown").
    pub file_size: String,
    pub source_method: SourceMethod,
    pub media_type: MediaType,
    #[serde(default)]
    pub raw_metadata: Value,
}

impl AssetDescriptor {
    /// In-page control locator recorded by the DOM engine, if any.
    pub fn control(&self) -> Option<ControlLocator> {
        self.raw_metadata
            .get("control")
            .and_then(|c| serde_json::from_value(c.clone()).ok())
    }
}

/// Locates an in-page action control: the `index`-th match of `item_selector`,
/// then the first match of `control_selector` inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlLocator {
    pub item_selector: String,
    pub index: usize,
    pub control_selector: String,
}

/// Terminal result of one download attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    pub descriptor: AssetDescriptor,
    pub success: bool,
    pub file_path: Option<String>,
    pub size_bytes: Option<u64>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
}

impl DownloadOutcome {
    pub fn succeeded(descriptor: AssetDescriptor, path: PathBuf, size: u64, duration_ms: u64) -> Self {
        Self {
            descriptor,
            success: true,
            file_path: Some(path.display().to_string()),
            size_bytes: Some(size),
            duration_ms: Some(duration_ms),
            error_message: None,
        }
    }

    pub fn failed(descriptor: AssetDescriptor, error: impl Into<String>, duration_ms: Option<u64>) -> Self {
        Self {
            descriptor,
            success: false,
            file_path: None,
            size_bytes: None,
            duration_ms,
            error_message: Some(error.into()),
        }
    }
}

/// Which automation backend the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Primary backend, falling back to the alternate one on session failure.
    #[default]
    Auto,
    /// Primary backend only.
    Primary,
    /// Alternate backend only.
    Alternate,
}

/// Normalized input of one crawl invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRequest {
    pub page_url: String,
    pub download_path: PathBuf,
    pub headless: bool,
    pub auto_download: bool,
    pub backend: BackendPreference,
}

/// The strategy whose result the invocation settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Catalog,
    Dom,
    Alternate,
}

/// Outcome of triggering a page's "download all" control.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkReport {
    pub attempted: bool,
    pub success: bool,
    /// Which matcher located the control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,
    /// Which click method succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_method: Option<String>,
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

/// Coarse outcome reported by the alternate automation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternateReport {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    pub control: String,
    pub click_method: String,
    pub settle_ms: u64,
}

/// Aggregate of one crawl invocation. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub source_url: String,
    pub duration_ms: u64,
    pub strategy: StrategyKind,
    /// Descriptor count before de-duplication.
    pub links_found: usize,
    pub descriptors: Vec<AssetDescriptor>,
    pub download_outcomes: Vec<DownloadOutcome>,
    pub auto_download: bool,
    pub catalog_attempted: bool,
    pub catalog_succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk: Option<BulkReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate: Option<AlternateReport>,
}

/// Structured failure of a whole invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlFailure {
    pub error: String,
    pub error_type: String,
    pub request: CrawlRequest,
    pub duration_ms: u64,
}

/// All errors that can occur in the harvesting pipeline.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Download control not found after checking {candidates} clickable elements")]
    ControlNotFound { candidates: usize },

    #[error("Download did not settle within {waited_ms}ms")]
    DownloadTimeout { waited_ms: u64 },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Automation session error: {0}")]
    AutomationSession(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarvestError {
    /// Stable error kind name reported to callers.
    pub fn error_type(&self) -> &'static str {
        match self {
            HarvestError::InvalidInput(_) => "InvalidInputError",
            HarvestError::CatalogUnavailable(_) => "CatalogUnavailableError",
            HarvestError::ControlNotFound { .. } => "ControlNotFoundError",
            HarvestError::DownloadTimeout { .. } => "DownloadTimeoutError",
            HarvestError::HttpStatus { .. } => "HttpStatusError",
            HarvestError::AutomationSession(_) => "AutomationSessionError",
            HarvestError::Network(_) => "NetworkError",
            HarvestError::Io(_) => "IoError",
            HarvestError::Json(_) => "JsonError",
        }
    }
}

/// Convenience result type.
pub type HarvestResult<T> = Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_wire_names() {
        let d = AssetDescriptor {
            url: None,
            display_text: "photo".into(),
            file_name: "a.png".into(),
            file_size: "Unknown".into(),
            source_method: SourceMethod::DomImageTag,
            media_type: MediaType::Image,
            raw_metadata: Value::Null,
        };
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["sourceMethod"], "dom-image-tag");
        assert_eq!(v["mediaType"], "image");
        assert_eq!(v["fileName"], "a.png");
        assert!(v["url"].is_null());
    }

    #[test]
    fn test_control_locator_from_metadata() {
        let d = AssetDescriptor {
            url: None,
            display_text: "x".into(),
            file_name: "x.jpg".into(),
            file_size: "3 KB".into(),
            source_method: SourceMethod::DomSelector,
            media_type: MediaType::Image,
            raw_metadata: json!({
                "control": { "item_selector": "ul.file_list li", "index": 2, "control_selector": "a" }
            }),
        };
        let c = d.control().unwrap();
        assert_eq!(c.index, 2);
        assert_eq!(c.item_selector, "ul.file_list li");
    }

    #[test]
    fn test_error_type_names() {
        assert_eq!(
            HarvestError::InvalidInput("x".into()).error_type(),
            "InvalidInputError"
        );
        assert_eq!(
            HarvestError::DownloadTimeout { waited_ms: 5 }.error_type(),
            "DownloadTimeoutError"
        );
        assert_eq!(
            HarvestError::HttpStatus { status: 404, url: "u".into() }.to_string(),
            "HTTP 404 from u"
        );
    }
}
