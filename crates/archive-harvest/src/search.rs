//! Text-search passthrough.
//!
//! Parameters are forwarded verbatim; the response is returned raw together
//! with a count summary read from whichever envelope the endpoint used.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{HttpSettings, PortalSettings};
use crate::types::{HarvestError, HarvestResult};

/// One search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub search_value: String,
    pub category: String,
    pub page_no: String,
    pub num_of_rows: String,
}

impl SearchQuery {
    pub fn new(search_value: impl Into<String>) -> Self {
        Self {
            search_value: search_value.into(),
            category: "0".to_string(),
            page_no: "1".to_string(),
            num_of_rows: "100".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSummary {
    pub total_count: Option<u64>,
    pub returned_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub raw: Value,
    pub summary: SearchSummary,
}

#[derive(Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    endpoint: String,
    service_key: Option<String>,
}

impl SearchClient {
    pub fn new(http: &HttpSettings, portal: &PortalSettings) -> Self {
        Self {
            client: crate::http::build_client(http, http.request_timeout()),
            endpoint: portal.search_endpoint.clone(),
            service_key: portal.search_service_key.clone(),
        }
    }

    pub async fn search(&self, query: &SearchQuery) -> HarvestResult<SearchResponse> {
        if query.search_value.trim().is_empty() {
            return Err(HarvestError::InvalidInput("searchValue is required".into()));
        }

        let mut params = vec![
            ("searchValue", query.search_value.as_str()),
            ("category", query.category.as_str()),
            ("pageNo", query.page_no.as_str()),
            ("numOfRows", query.num_of_rows.as_str()),
        ];
        if let Some(key) = &self.service_key {
            params.push(("serviceKey", key.as_str()));
        }

        let response = self.client.get(&self.endpoint).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::HttpStatus {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        let raw: Value = response.json().await?;
        let summary = summarize(&raw);
        tracing::debug!(?summary, "search completed");
        Ok(SearchResponse { raw, summary })
    }
}

/// Read counts from the flat or the `response.body` envelope.
pub fn summarize(raw: &Value) -> SearchSummary {
    let body = raw.pointer("/response/body").unwrap_or(raw);

    let total_count = ["totalCount", "total_count", "total"]
        .iter()
        .find_map(|k| body.get(*k).or_else(|| raw.get(*k)))
        .and_then(as_count);

    let items = body
        .pointer("/items/item")
        .or_else(|| body.get("items"))
        .or_else(|| raw.get("items"))
        .or_else(|| raw.get("result"));
    let returned_count = match items {
        Some(Value::Array(a)) => a.len(),
        Some(Value::Object(_)) => 1,
        _ => 0,
    };

    SearchSummary {
        total_count,
        returned_count,
    }
}

fn as_count(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, key: Option<&str>) -> SearchClient {
        let portal = PortalSettings {
            search_endpoint: format!("{}/search", server.uri()),
            search_service_key: key.map(str::to_string),
            ..Default::default()
        };
        SearchClient::new(&HttpSettings::default(), &portal)
    }

    #[test]
    fn test_summarize_nested_envelope() {
        let raw = json!({
            "response": { "body": { "totalCount": "42", "items": { "item": [{}, {}, {}] } } }
        });
        assert_eq!(
            summarize(&raw),
            SearchSummary {
                total_count: Some(42),
                returned_count: 3
            }
        );
    }

    #[test]
    fn test_summarize_flat_and_single_item() {
        let flat = json!({ "totalCount": 7, "items": [{}, {}] });
        assert_eq!(summarize(&flat).total_count, Some(7));
        assert_eq!(summarize(&flat).returned_count, 2);

        let single = json!({ "response": { "body": { "totalCount": 1, "items": { "item": { "title": "x" } } } } });
        assert_eq!(summarize(&single).returned_count, 1);

        assert_eq!(summarize(&json!({})), SearchSummary::default());
    }

    #[tokio::test]
    async fn test_search_forwards_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("searchValue", "독립운동"))
            .and(query_param("category", "0"))
            .and(query_param("pageNo", "1"))
            .and(query_param("numOfRows", "100"))
            .and(query_param("serviceKey", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalCount": 120, "items": [{ "title": "a" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client_for(&server, Some("k"))
            .search(&SearchQuery::new("독립운동"))
            .await
            .unwrap();
        assert_eq!(resp.summary.total_count, Some(120));
        assert_eq!(resp.summary.returned_count, 1);
        assert_eq!(resp.raw["items"][0]["title"], "a");
    }

    #[tokio::test]
    async fn test_search_non_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .search(&SearchQuery::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_empty_search_value_rejected() {
        let server = MockServer::start().await;
        let err = client_for(&server, None)
            .search(&SearchQuery::new("  "))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "InvalidInputError");
    }
}
