//! reqwest client construction and the portal header set.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_LANGUAGE, COOKIE, REFERER};

use crate::config::{HttpSettings, PortalSettings};

/// Build a client carrying the configured user agent and timeout.
pub fn build_client(http: &HttpSettings, timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(http.user_agent.clone())
        .build()
        .unwrap_or_default()
}

/// Headers a real browser would send to the portal, plus configured extras.
///
/// Values that are not valid header text are skipped.
pub fn portal_headers(http: &HttpSettings, portal: &PortalSettings) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(v) = HeaderValue::from_str(&http.accept_language) {
        headers.insert(ACCEPT_LANGUAGE, v);
    }
    if let Ok(v) = HeaderValue::from_str(&portal.referer) {
        headers.insert(REFERER, v);
    }
    if let Some(cookie) = &http.cookie {
        match HeaderValue::from_str(cookie) {
            Ok(v) => {
                headers.insert(COOKIE, v);
            }
            Err(_) => tracing::warn!("Configured cookie is not a valid header value; ignoring"),
        }
    }
    for (name, value) in &http.extra_headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => {
                headers.insert(n, v);
            }
            _ => tracing::warn!("Skipping invalid extra header {name}"),
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portal_headers_include_cookie_and_extras() {
        let mut http = HttpSettings::default();
        http.cookie = Some("JSESSIONID=abc".to_string());
        http.extra_headers
            .insert("X-Portal-Token".to_string(), "t0k".to_string());
        http.extra_headers
            .insert("bad header".to_string(), "v".to_string());

        let headers = portal_headers(&http, &PortalSettings::default());
        assert_eq!(headers.get(COOKIE).unwrap(), "JSESSIONID=abc");
        assert_eq!(headers.get("x-portal-token").unwrap(), "t0k");
        assert!(headers.get(REFERER).is_some());
        assert_eq!(headers.len(), 4);
    }
}
