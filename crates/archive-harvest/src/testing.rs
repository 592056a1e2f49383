//! In-memory browser and backend fakes for unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::alternate::AlternateBackend;
use crate::browser::{js_string, ContextProfile, NavigationResult, PageSession, SessionFactory};
use crate::types::{AlternateReport, HarvestError, HarvestResult};

const FILE_LIST_CHECK: &str = ".some(s => document.querySelector(s) !== null)";

#[derive(Debug, Default)]
struct Log {
    calls: Vec<String>,
    launches: usize,
    download_dir: Option<PathBuf>,
}

/// Shared record of what sessions were asked to do.
#[derive(Debug, Clone, Default)]
pub struct FakeState(Arc<Mutex<Log>>);

impl FakeState {
    fn with<R>(&self, f: impl FnOnce(&mut Log) -> R) -> R {
        let mut log = self.0.lock().unwrap();
        f(&mut log)
    }

    fn record(&self, call: impl Into<String>) {
        self.with(|log| log.calls.push(call.into()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|log| log.calls.clone())
    }

    pub fn launches(&self) -> usize {
        self.with(|log| log.launches)
    }

    pub fn closed(&self) -> bool {
        self.calls().iter().any(|c| c == "close")
    }

    pub fn profile_applied_before_navigation(&self) -> bool {
        let calls = self.calls();
        let profile = calls.iter().position(|c| c == "apply_profile");
        let nav = calls.iter().position(|c| c.starts_with("navigate:"));
        matches!((profile, nav), (Some(p), Some(n)) if p < n)
    }
}

/// A page whose script results are canned by substring match.
#[derive(Debug, Clone)]
pub struct FakePage {
    html: String,
    responses: Vec<(String, Value)>,
    fail_navigation: bool,
    fail_direct_click: bool,
    downloads: Vec<(String, Vec<u8>)>,
    location: Option<String>,
    redirect: Option<String>,
    state: FakeState,
}

impl FakePage {
    pub fn new(html: &str) -> Self {
        Self {
            html: html.to_string(),
            responses: vec![(FILE_LIST_CHECK.to_string(), Value::Bool(true))],
            fail_navigation: false,
            fail_direct_click: false,
            downloads: Vec::new(),
            location: None,
            redirect: None,
            state: FakeState::default(),
        }
    }

    fn respond(mut self, needle: impl Into<String>, value: Value) -> Self {
        self.responses.push((needle.into(), value));
        self
    }

    pub fn without_file_list(mut self) -> Self {
        self.responses.retain(|(needle, _)| needle != FILE_LIST_CHECK);
        self
    }

    pub fn failing_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }

    /// Scripts move the page to `url` once it has loaded.
    pub fn redirected_to(mut self, url: &str) -> Self {
        self.redirect = Some(url.to_string());
        self
    }

    pub fn failing_direct_click(mut self) -> Self {
        self.fail_direct_click = true;
        self
    }

    /// An element matching `selector` exists.
    pub fn with_element(self, selector: &str) -> Self {
        let check = format!("document.querySelector({}) !== null", js_string(selector));
        self.respond(check, Value::Bool(true))
    }

    /// A control labelled with a bulk synonym exists.
    pub fn with_text_control(self) -> Self {
        self.respond("data-harvest-bulk", Value::Bool(true))
    }

    /// In-page item controls can be located.
    pub fn with_item_controls(self) -> Self {
        self.respond("data-harvest-target", Value::Bool(true))
    }

    pub fn with_scripted_click(self) -> Self {
        self.respond("el.click();", Value::Bool(true))
    }

    pub fn with_clickables(self, elements: Value) -> Self {
        self.respond("tagName.toLowerCase()", elements)
    }

    /// Every successful direct click drops these files into the download directory.
    pub fn downloads_on_click(mut self, files: &[(&str, &str)]) -> Self {
        self.downloads = files
            .iter()
            .map(|(name, body)| (name.to_string(), body.as_bytes().to_vec()))
            .collect();
        self
    }

    pub fn state(&self) -> FakeState {
        self.state.clone()
    }

    fn write_downloads(&self) {
        let Some(dir) = self.state.with(|log| log.download_dir.clone()) else {
            return;
        };
        for (name, body) in &self.downloads {
            std::fs::write(dir.join(name), body).unwrap();
        }
    }
}

#[async_trait]
impl PageSession for FakePage {
    async fn apply_profile(&mut self, _profile: &ContextProfile) -> HarvestResult<()> {
        self.state.record("apply_profile");
        Ok(())
    }

    async fn navigate(&mut self, url: &str, _timeout: Duration) -> HarvestResult<NavigationResult> {
        self.state.record(format!("navigate:{url}"));
        if self.fail_navigation {
            return Err(HarvestError::AutomationSession(
                "navigation timed out after 0ms".into(),
            ));
        }
        self.location = Some(url.to_string());
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 1,
        })
    }

    async fn evaluate(&self, script: &str) -> HarvestResult<Value> {
        self.state.record("evaluate");
        Ok(self
            .responses
            .iter()
            .rev()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null))
    }

    async fn html(&self) -> HarvestResult<String> {
        Ok(self.html.clone())
    }

    async fn current_url(&self) -> HarvestResult<String> {
        Ok(self
            .redirect
            .clone()
            .or_else(|| self.location.clone())
            .unwrap_or_else(|| "about:blank".into()))
    }

    async fn click(&self, selector: &str) -> HarvestResult<()> {
        self.state.record(format!("click:{selector}"));
        if self.fail_direct_click {
            return Err(HarvestError::AutomationSession("element not interactable".into()));
        }
        self.write_downloads();
        Ok(())
    }

    async fn set_download_dir(&self, dir: &Path) -> HarvestResult<()> {
        self.state
            .with(|log| log.download_dir = Some(dir.to_path_buf()));
        Ok(())
    }

    async fn close(self: Box<Self>) -> HarvestResult<()> {
        self.state.record("close");
        Ok(())
    }
}

/// Hands out clones of one fake page.
pub struct FakeFactory {
    page: FakePage,
    fail_launch: bool,
}

impl FakeFactory {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            fail_launch: false,
        }
    }

    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    pub fn state(&self) -> FakeState {
        self.page.state()
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn launch(&self, _headless: bool) -> HarvestResult<Box<dyn PageSession>> {
        self.page.state.with(|log| log.launches += 1);
        if self.fail_launch {
            return Err(HarvestError::AutomationSession("Chromium not found".into()));
        }
        Ok(Box::new(self.page.clone()))
    }
}

/// Alternate backend with a fixed outcome.
pub struct FakeAlternate {
    fail: Option<String>,
    calls: AtomicUsize,
}

impl FakeAlternate {
    pub fn succeeding() -> Self {
        Self {
            fail: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            fail: Some(error.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlternateBackend for FakeAlternate {
    async fn run(&self, _page: &Url, _download_dir: &Path, _headless: bool) -> HarvestResult<AlternateReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.fail {
            return Err(HarvestError::AutomationSession(error.clone()));
        }
        Ok(AlternateReport {
            success: true,
            message: "Bulk download triggered".into(),
            page_title: Some("기록물 상세".into()),
            control: "selector:#btnAllDown".into(),
            click_method: "direct".into(),
            settle_ms: 0,
        })
    }
}
