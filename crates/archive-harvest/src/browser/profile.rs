//! Declarative browser-context configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::HarvestConfig;

/// Hides the usual automation tells before any page script runs.
pub const STEALTH_INIT_SCRIPT: &str = r#"
(() => {
  Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
  Object.defineProperty(navigator, 'plugins', {
    get: () => [
      { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
      { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' },
      { name: 'Native Client', filename: 'internal-nacl-plugin' }
    ]
  });
  Object.defineProperty(navigator, 'languages', { get: () => ['ko-KR', 'ko', 'en-US', 'en'] });
  window.chrome = window.chrome || { runtime: {} };
  const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
  if (originalQuery) {
    window.navigator.permissions.query = (parameters) =>
      parameters && parameters.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission })
        : originalQuery(parameters);
  }
})();
"#;

/// Everything a session needs to look like an ordinary desktop browser.
/// Applied once, before the first navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextProfile {
    pub user_agent: String,
    pub accept_language: String,
    pub platform: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub extra_headers: BTreeMap<String, String>,
    pub init_script: String,
}

impl ContextProfile {
    pub fn from_config(config: &HarvestConfig) -> Self {
        let mut extra_headers = config.http.extra_headers.clone();
        extra_headers.insert(
            "Accept-Language".to_string(),
            config.http.accept_language.clone(),
        );
        extra_headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
                .to_string(),
        );
        extra_headers.insert("Upgrade-Insecure-Requests".to_string(), "1".to_string());

        Self {
            user_agent: config.http.user_agent.clone(),
            accept_language: config.http.accept_language.clone(),
            platform: "Win32".to_string(),
            viewport_width: config.browser.window_width,
            viewport_height: config.browser.window_height,
            extra_headers,
            init_script: STEALTH_INIT_SCRIPT.to_string(),
        }
    }

    /// Headers as a JSON object, the shape CDP expects.
    pub fn headers_json(&self) -> Value {
        let map: Map<String, Value> = self
            .extra_headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_config() {
        let mut cfg = HarvestConfig::default();
        cfg.http
            .extra_headers
            .insert("X-Test".to_string(), "1".to_string());
        let profile = ContextProfile::from_config(&cfg);

        assert_eq!(profile.user_agent, cfg.http.user_agent);
        assert!(profile.init_script.contains("webdriver"));
        let headers = profile.headers_json();
        assert_eq!(headers["X-Test"], "1");
        assert_eq!(headers["Accept-Language"], cfg.http.accept_language.as_str());
    }
}
