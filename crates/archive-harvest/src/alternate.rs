//! Alternate automation backend over the WebDriver protocol.
//!
//! Loads the page, waits for a title, clicks the bulk-download control and
//! waits a fixed settle period. It reports one coarse outcome and never
//! enumerates files.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use thirtyfour::{ChromeCapabilities, ChromiumLikeCapabilities};
use url::Url;

use crate::browser::ContextProfile;
use crate::bulk::{BULK_CONTROL_SELECTORS, BULK_TEXT_SYNONYMS};
use crate::config::{AlternateSettings, BrowserSettings};
use crate::types::{AlternateReport, HarvestError, HarvestResult};

const TITLE_POLL: Duration = Duration::from_millis(250);

/// A second automation driver for load + bulk trigger.
#[async_trait]
pub trait AlternateBackend: Send + Sync {
    async fn run(&self, page: &Url, download_dir: &Path, headless: bool) -> HarvestResult<AlternateReport>;
}

fn wd_err(context: &str, e: WebDriverError) -> HarvestError {
    HarvestError::AutomationSession(format!("{context}: {e}"))
}

/// Drives Chrome through a running WebDriver server (chromedriver).
pub struct WebDriverBackend {
    settings: AlternateSettings,
    window: (u32, u32),
    profile: ContextProfile,
}

impl WebDriverBackend {
    pub fn new(settings: AlternateSettings, browser: &BrowserSettings, profile: ContextProfile) -> Self {
        Self {
            settings,
            window: (browser.window_width, browser.window_height),
            profile,
        }
    }

    fn capabilities(&self, download_dir: &Path, headless: bool) -> WebDriverResult<ChromeCapabilities> {
        let mut caps = DesiredCapabilities::chrome();
        if headless {
            caps.add_arg("--headless=new")?;
        }
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        caps.add_arg("--disable-blink-features=AutomationControlled")?;
        caps.add_arg(&format!("--window-size={},{}", self.window.0, self.window.1))?;
        caps.add_arg(&format!("--user-agent={}", self.profile.user_agent))?;
        caps.add_experimental_option("excludeSwitches", json!(["enable-automation"]))?;
        caps.add_experimental_option(
            "prefs",
            json!({
                "download.default_directory": download_dir.display().to_string(),
                "download.prompt_for_download": false,
                "download.directory_upgrade": true,
                "safebrowsing.enabled": true,
            }),
        )?;
        Ok(caps)
    }

    async fn drive(&self, driver: &WebDriver, page: &Url) -> HarvestResult<AlternateReport> {
        let devtools = ChromeDevTools::new(driver.handle.clone());
        devtools
            .execute_cdp_with_params(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": self.profile.init_script }),
            )
            .await
            .map_err(|e| wd_err("failed to install init script", e))?;
        devtools
            .execute_cdp_with_params(
                "Network.setUserAgentOverride",
                json!({
                    "userAgent": self.profile.user_agent,
                    "acceptLanguage": self.profile.accept_language,
                    "platform": self.profile.platform,
                }),
            )
            .await
            .map_err(|e| wd_err("failed to override user agent", e))?;

        driver
            .goto(page.as_str())
            .await
            .map_err(|e| wd_err("navigation failed", e))?;
        let page_title = self.wait_for_title(driver).await;

        let (control, element) = locate(driver).await?;
        let click_method = click(driver, &element).await?;

        tracing::info!(%control, click_method, "alternate backend triggered bulk download");
        tokio::time::sleep(Duration::from_millis(self.settings.settle_ms)).await;

        Ok(AlternateReport {
            success: true,
            message: format!(
                "Bulk download triggered via {control} ({click_method} click); waited {}ms",
                self.settings.settle_ms
            ),
            page_title,
            control,
            click_method: click_method.to_string(),
            settle_ms: self.settings.settle_ms,
        })
    }

    /// Poll until the document has a title. Running out of time is not fatal.
    async fn wait_for_title(&self, driver: &WebDriver) -> Option<String> {
        let timeout = Duration::from_millis(self.settings.title_timeout_ms);
        let start = Instant::now();
        loop {
            if let Ok(title) = driver.title().await {
                if !title.trim().is_empty() {
                    return Some(title);
                }
            }
            if start.elapsed() >= timeout {
                tracing::warn!(waited_ms = self.settings.title_timeout_ms, "page title never appeared");
                return None;
            }
            tokio::time::sleep(TITLE_POLL).await;
        }
    }
}

#[async_trait]
impl AlternateBackend for WebDriverBackend {
    async fn run(&self, page: &Url, download_dir: &Path, headless: bool) -> HarvestResult<AlternateReport> {
        tokio::fs::create_dir_all(download_dir).await?;
        let dir = if download_dir.is_absolute() {
            download_dir.to_path_buf()
        } else {
            std::env::current_dir()?.join(download_dir)
        };

        let caps = self
            .capabilities(&dir, headless)
            .map_err(|e| wd_err("invalid capabilities", e))?;
        let driver = WebDriver::new(self.settings.webdriver_url.as_str(), caps)
            .await
            .map_err(|e| wd_err("failed to start WebDriver session", e))?;

        let result = self.drive(&driver, page).await;
        if let Err(e) = driver.quit().await {
            tracing::warn!(error = %e, "failed to quit WebDriver session");
        }
        result
    }
}

/// Selector cascade, then a text scan over every button.
async fn locate(driver: &WebDriver) -> HarvestResult<(String, WebElement)> {
    for selector in BULK_CONTROL_SELECTORS {
        if let Ok(found) = driver.find_all(By::Css(*selector)).await {
            if let Some(element) = found.into_iter().next() {
                return Ok((format!("selector:{selector}"), element));
            }
        }
    }

    let buttons = driver
        .find_all(By::Tag("button"))
        .await
        .map_err(|e| wd_err("failed to list buttons", e))?;
    let candidates = buttons.len();
    for button in buttons {
        let text = button.text().await.unwrap_or_default();
        if matches_bulk_text(&text) {
            return Ok((format!("text:{}", text.trim()), button));
        }
    }

    Err(HarvestError::ControlNotFound { candidates })
}

async fn click(driver: &WebDriver, element: &WebElement) -> HarvestResult<&'static str> {
    match element.click().await {
        Ok(()) => Ok("direct"),
        Err(direct) => {
            tracing::warn!(error = %direct, "direct click failed, trying scripted click");
            let arg = element
                .to_json()
                .map_err(|e| wd_err("failed to reference element", e))?;
            driver
                .execute("arguments[0].click();", vec![arg])
                .await
                .map_err(|e| wd_err("scripted click failed", e))?;
            Ok("scripted")
        }
    }
}

/// True when `text` contains a bulk synonym. ASCII synonyms must be whole words.
pub fn matches_bulk_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    BULK_TEXT_SYNONYMS.iter().any(|syn| {
        if syn.is_ascii() {
            words.contains(syn)
        } else {
            lower.contains(syn)
        }
    })
}
