//! Chromium-based sessions using chromiumoxide.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::{ContextProfile, NavigationResult, PageSession, SessionFactory};
use crate::config::BrowserSettings;
use crate::types::{HarvestError, HarvestResult};

fn session_err(context: &str, e: impl std::fmt::Display) -> HarvestError {
    HarvestError::AutomationSession(format!("{context}: {e}"))
}

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Configured path (config file or ARCHIVE_HARVEST_CHROMIUM)
    if let Some(p) = explicit {
        if p.exists() {
            return Some(p.to_path_buf());
        }
    }

    // 2. ~/.archive-harvest/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".archive-harvest/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".archive-harvest/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".archive-harvest/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".archive-harvest/chromium/chrome-linux64/chrome"),
                home.join(".archive-harvest/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches a dedicated Chromium process per session.
pub struct ChromiumSessionFactory {
    settings: BrowserSettings,
}

impl ChromiumSessionFactory {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self, headless: bool) -> HarvestResult<BrowserConfig> {
        let chrome_path = find_chromium(self.settings.chromium_path.as_deref()).ok_or_else(|| {
            HarvestError::AutomationSession(
                "Chromium not found. Set ARCHIVE_HARVEST_CHROMIUM or browser.chromium_path".into(),
            )
        })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(self.settings.window_width, self.settings.window_height)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-blink-features=AutomationControlled");

        builder = if headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };

        builder
            .build()
            .map_err(|e| session_err("failed to build browser config", e))
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn launch(&self, headless: bool) -> HarvestResult<Box<dyn PageSession>> {
        let config = self.browser_config(headless)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| session_err("failed to launch Chromium", e))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => {
                let mut browser = browser;
                let _ = browser.close().await;
                handler.abort();
                return Err(session_err("failed to create page", e));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler,
        }))
    }
}

/// One Chromium process with its single page.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn apply_profile(&mut self, profile: &ContextProfile) -> HarvestResult<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(
                profile.init_script.clone(),
            ))
            .await
            .map_err(|e| session_err("failed to install init script", e))?;

        let ua = SetUserAgentOverrideParams::builder()
            .user_agent(profile.user_agent.clone())
            .accept_language(profile.accept_language.clone())
            .platform(profile.platform.clone())
            .build()
            .map_err(|e| session_err("invalid user agent override", e))?;
        self.page
            .execute(ua)
            .await
            .map_err(|e| session_err("failed to override user agent", e))?;

        self.page
            .execute(EnableParams::default())
            .await
            .map_err(|e| session_err("failed to enable network domain", e))?;
        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(
                profile.headers_json(),
            )))
            .await
            .map_err(|e| session_err("failed to set extra headers", e))?;

        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(profile.viewport_width),
                i64::from(profile.viewport_height),
                1.0,
                false,
            ))
            .await
            .map_err(|e| session_err("failed to set viewport", e))?;

        Ok(())
    }

    async fn navigate(&mut self, url: &str, timeout: Duration) -> HarvestResult<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(timeout, self.page.goto(url)).await;

        match result {
            Ok(Ok(_)) => {
                let _ = tokio::time::timeout(timeout, self.page.wait_for_navigation()).await;

                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms: start.elapsed().as_millis() as u64,
                })
            }
            Ok(Err(e)) => Err(session_err("navigation failed", e)),
            Err(_) => Err(HarvestError::AutomationSession(format!(
                "navigation timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn evaluate(&self, script: &str) -> HarvestResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| session_err("JS execution failed", e))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn html(&self) -> HarvestResult<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .map_err(|e| session_err("failed to get HTML", e))?;

        result
            .into_value()
            .map_err(|e| session_err("failed to convert HTML result", format!("{e:?}")))
    }

    async fn current_url(&self) -> HarvestResult<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| session_err("failed to get URL", e))?
            .unwrap_or_default();
        Ok(url)
    }

    async fn click(&self, selector: &str) -> HarvestResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| session_err("element not found", e))?;
        element
            .click()
            .await
            .map_err(|e| session_err("click failed", e))?;
        Ok(())
    }

    async fn set_download_dir(&self, dir: &Path) -> HarvestResult<()> {
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(dir.display().to_string())
            .build()
            .map_err(|e| session_err("invalid download behavior", e))?;
        self.browser
            .execute(params)
            .await
            .map_err(|e| session_err("failed to set download directory", e))?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> HarvestResult<()> {
        let ChromiumSession {
            mut browser,
            page,
            handler,
        } = *self;
        let _ = page.close().await;
        let closed = browser.close().await;
        let _ = browser.wait().await;
        handler.abort();
        closed
            .map(|_| ())
            .map_err(|e| session_err("failed to close browser", e))
    }
}
