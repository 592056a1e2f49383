//! Harvester configuration. Every field has a default so partial TOML files work.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub portal: PortalSettings,
    pub http: HttpSettings,
    pub browser: BrowserSettings,
    pub bulk: BulkSettings,
    pub alternate: AlternateSettings,
    pub download: DownloadSettings,
}

/// Target portal endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSettings {
    /// Page URLs must be on this domain or one of its subdomains.
    pub domain: String,
    /// File-listing endpoint answering with the `payload` envelope.
    pub catalog_endpoint: String,
    /// File-listing endpoint answering with the `data.files` / `data.data` envelope.
    pub generic_catalog_endpoint: String,
    /// Direct-download URL; `{atcflNo}` is replaced with the record's file token.
    pub download_url_template: String,
    pub search_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_service_key: Option<String>,
    pub referer: String,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            domain: "archives.go.kr".to_string(),
            catalog_endpoint: "https://www.archives.go.kr/next/newsearch/selectMedFileList.do"
                .to_string(),
            generic_catalog_endpoint: "https://www.archives.go.kr/next/newsearch/getFileList.do"
                .to_string(),
            download_url_template:
                "https://www.archives.go.kr/next/newsearch/fileDownload.do?atcflNo={atcflNo}"
                    .to_string(),
            search_endpoint: "https://www.archives.go.kr/next/newsearch/searchApi.do".to_string(),
            search_service_key: None,
            referer: "https://www.archives.go.kr/".to_string(),
        }
    }
}

/// Shared HTTP header set and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub accept_language: String,
    pub request_timeout_ms: u64,
    pub download_timeout_ms: u64,
    /// Static headers sent with every portal request.
    pub extra_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            request_timeout_ms: 30_000,
            download_timeout_ms: 60_000,
            extra_headers: BTreeMap::new(),
            cookie: None,
        }
    }
}

impl HttpSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }
}

/// Primary (CDP) browser session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chromium_path: Option<PathBuf>,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub navigation_timeout_ms: u64,
    /// Pause after navigation before touching the page.
    pub settle_ms: u64,
    pub file_list_timeout_ms: u64,
    /// Containers whose presence means the file list has rendered.
    pub file_list_selectors: Vec<String>,
    pub scroll_steps: u32,
    pub scroll_delay_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chromium_path: None,
            headless: true,
            window_width: 1920,
            window_height: 1080,
            navigation_timeout_ms: 30_000,
            settle_ms: 2_000,
            file_list_timeout_ms: 10_000,
            file_list_selectors: vec![
                "ul.file_list".to_string(),
                "ul.file-list".to_string(),
                ".file_area".to_string(),
                ".attach_list".to_string(),
            ],
            scroll_steps: 5,
            scroll_delay_ms: 500,
        }
    }
}

/// Bulk-download completion polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkSettings {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub quiet_period_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1_000,
            quiet_period_ms: 2_000,
            max_wait_ms: 60_000,
        }
    }
}

/// Alternate (WebDriver) backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlternateSettings {
    pub webdriver_url: String,
    pub title_timeout_ms: u64,
    pub settle_ms: u64,
}

impl Default for AlternateSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            title_timeout_ms: 15_000,
            settle_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub directory: PathBuf,
    /// Pause between successful downloads.
    pub inter_download_delay_ms: u64,
    /// Prefix for generated names: `<prefix>_<timestamp>.<ext>`.
    pub fallback_prefix: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./downloads"),
            inter_download_delay_ms: 1_000,
            fallback_prefix: "asset".to_string(),
        }
    }
}

impl HarvestConfig {
    /// Apply `ARCHIVE_HARVEST_*` environment overrides for secrets and endpoints.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(cookie) = lookup("ARCHIVE_HARVEST_COOKIE").filter(|v| !v.is_empty()) {
            self.http.cookie = Some(cookie);
        }
        if let Some(key) = lookup("ARCHIVE_HARVEST_SERVICE_KEY").filter(|v| !v.is_empty()) {
            self.portal.search_service_key = Some(key);
        }
        if let Some(url) = lookup("ARCHIVE_HARVEST_WEBDRIVER_URL").filter(|v| !v.is_empty()) {
            self.alternate.webdriver_url = url;
        }
        if let Some(path) = lookup("ARCHIVE_HARVEST_CHROMIUM").filter(|v| !v.is_empty()) {
            self.browser.chromium_path = Some(PathBuf::from(path));
        }
    }
}
