//! Page reference validation and `medSeq` extraction.

use url::Url;

use crate::types::{HarvestError, HarvestResult};

/// Query parameter carrying the portal's item identifier.
pub const MED_SEQ_PARAM: &str = "medSeq";

/// A validated page on the target portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef {
    pub url: Url,
    /// Absent when the page carries no identifier; the catalog path is skipped then.
    pub med_seq: Option<String>,
}

/// Validate that `input` is an http(s) URL on `portal_domain` (or a subdomain of it)
/// and pull out its `medSeq`.
pub fn resolve(input: &str, portal_domain: &str) -> HarvestResult<PageRef> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(HarvestError::InvalidInput("pageUrl is required".to_string()));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| HarvestError::InvalidInput(format!("not a valid URL: {trimmed} ({e})")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(HarvestError::InvalidInput(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| HarvestError::InvalidInput(format!("URL has no host: {trimmed}")))?
        .to_ascii_lowercase();

    if !host_matches(&host, portal_domain) {
        return Err(HarvestError::InvalidInput(format!(
            "host '{host}' is not part of {portal_domain}"
        )));
    }

    let med_seq = url
        .query_pairs()
        .find(|(k, _)| k == MED_SEQ_PARAM)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty());

    Ok(PageRef { url, med_seq })
}

fn host_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}
