//! Browser session abstraction.
//!
//! Defines the `SessionFactory` and `PageSession` traits that abstract over
//! the automation engine (currently Chromium via chromiumoxide), and the
//! declarative [`ContextProfile`] applied to every session before it navigates.

pub mod chromium;
pub mod profile;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::HarvestResult;

pub use chromium::{find_chromium, ChromiumSessionFactory};
pub use profile::{ContextProfile, STEALTH_INIT_SCRIPT};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Launches one browser session per invocation.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Start a fresh browser with a single blank page.
    async fn launch(&self, headless: bool) -> HarvestResult<Box<dyn PageSession>>;
}

/// A single page in a browser owned by one invocation.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Apply anti-detection scripts, user agent, headers and viewport.
    /// Must run before the first navigation.
    async fn apply_profile(&mut self, profile: &ContextProfile) -> HarvestResult<()>;
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> HarvestResult<NavigationResult>;
    /// Evaluate a JavaScript expression and return its JSON value (`Null` for undefined).
    async fn evaluate(&self, script: &str) -> HarvestResult<serde_json::Value>;
    /// Full rendered HTML.
    async fn html(&self) -> HarvestResult<String>;
    /// Where the page is now, after any script-driven redirect.
    async fn current_url(&self) -> HarvestResult<String>;
    /// Native (input-event) click on the first element matching `selector`.
    async fn click(&self, selector: &str) -> HarvestResult<()>;
    /// Save browser-initiated downloads into `dir`.
    async fn set_download_dir(&self, dir: &Path) -> HarvestResult<()>;
    /// Close the page and the browser behind it.
    async fn close(self: Box<Self>) -> HarvestResult<()>;
}

/// Quote a string as a JavaScript string literal.
pub fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
