use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::FeedError;
use crate::settings::{Category, FeedSettings};

pub const ISSUER_COMPANY: &str = "Issuer Company";
pub const OPEN_DATE: &str = "Open Date";
pub const CLOSE_DATE: &str = "Close Date";
pub const LISTING_DATE: &str = "Listing Date";
pub const ISSUE_PRICE: &str = "Issue Price (Rs)";
pub const ISSUE_SIZE: &str = "Issue Size (Rs Cr.)";
pub const LOT_SIZE: &str = "Lot Size";
pub const EXCHANGE: &str = "Exchange";

/// One row of `reportTableData`, keyed by column name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct RowRecord(Map<String, Value>);

impl RowRecord {
    /// Cell as text. Numbers use their JSON text; `null` and missing read as `None`.
    pub fn cell(&self, column: &str) -> Option<String> {
        match self.0.get(column)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }
}

impl<const N: usize> From<[(&str, &str); N]> for RowRecord {
    fn from(cells: [(&str, &str); N]) -> Self {
        RowRecord(
            cells
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(rename = "reportTableData", default)]
    report_table_data: Vec<RowRecord>,
}

/// HTTP client for the IPO report feed.
#[derive(Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    settings: FeedSettings,
}

impl FeedClient {
    pub fn new(settings: FeedSettings) -> Self {
        FeedClient {
            http: reqwest::Client::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub fn category_url(&self, category: &Category) -> String {
        let s = &self.settings;
        format!(
            "{}/{}/1/{}/{}/{}/0/0?search=&v={}",
            s.base_url.trim_end_matches('/'),
            category.id,
            s.month(),
            s.year,
            s.financial_year,
            s.version
        )
    }

    pub async fn fetch_rows(&self, category: &Category) -> Result<Vec<RowRecord>, FeedError> {
        let url = self.category_url(category);
        info!("Fetching data from {} - {}", category.name, url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| FeedError::Request {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let body = response.bytes().await.map_err(|source| FeedError::Request {
            url: url.clone(),
            source,
        })?;
        let parsed: FeedResponse =
            serde_json::from_slice(&body).map_err(|source| FeedError::Decode { url, source })?;
        Ok(parsed.report_table_data)
    }

    /// Fetch every category, logging and skipping the ones that fail.
    pub async fn fetch_all(&self, categories: &[Category]) -> Vec<(Category, Vec<RowRecord>)> {
        let mut out = Vec::with_capacity(categories.len());
        for category in categories {
            match self.fetch_rows(category).await {
                Ok(rows) => out.push((category.clone(), rows)),
                Err(e) => warn!("Error fetching data from {}: {}", category.name, e),
            }
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn test_settings(base_url: &str) -> FeedSettings {
        FeedSettings {
            base_url: base_url.to_string(),
            month: Some(2),
            ..FeedSettings::default()
        }
    }

    #[test]
    fn url_template() {
        let client = FeedClient::new(test_settings("https://feed.example/data-read/"));
        assert_eq!(
            client.category_url(&Category::new("SME IPOs", 84)),
            "https://feed.example/data-read/84/1/2/2025/2024-25/0/0?search=&v=21-28"
        );
    }

    #[test]
    fn cells_render_numbers_and_skip_nulls() {
        let row: RowRecord = serde_json::from_str(
            r#"{"Lot Size": 600, "Exchange": "NSE SME", "Issue Price (Rs)": null}"#,
        )
        .unwrap();
        assert_eq!(row.cell(LOT_SIZE).as_deref(), Some("600"));
        assert_eq!(row.cell(EXCHANGE).as_deref(), Some("NSE SME"));
        assert_eq!(row.cell(ISSUE_PRICE), None);
        assert_eq!(row.cell(ISSUE_SIZE), None);
    }

    #[tokio::test]
    async fn fetches_report_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/82/1/2/2025/2024-25/0/0"))
            .and(query_param("v", "21-28"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "reportTableData": [
                    {"Issuer Company": "<a href=\"https://x/y\">Acme Corp</a>", "Exchange": "BSE"},
                    {"Issuer Company": "Plain Ltd"}
                ]
            })))
            .mount(&server)
            .await;

        let client = FeedClient::new(test_settings(&server.uri()));
        let rows = client.fetch_rows(&Category::new("All IPOs", 82)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].cell(ISSUER_COMPANY).as_deref(), Some("Plain Ltd"));
    }

    #[tokio::test]
    async fn missing_table_reads_as_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;
        let client = FeedClient::new(test_settings(&server.uri()));
        let rows = client.fetch_rows(&Category::new("All IPOs", 82)).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let client = FeedClient::new(test_settings(&server.uri()));
        let err = client
            .fetch_rows(&Category::new("All IPOs", 82))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn fetch_all_skips_failed_categories() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/83/1/2/2025/2024-25/0/0"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"reportTableData\": []}"))
            .mount(&server)
            .await;

        let client = FeedClient::new(test_settings(&server.uri()));
        let fetched = client
            .fetch_all(&[Category::new("All IPOs", 82), Category::new("Mainline IPOs", 83)])
            .await;
        let names: Vec<&str> = fetched.iter().map(|(c, _)| c.name.as_str()).collect();
        assert_eq!(names, vec!["All IPOs"]);
    }
}
