//! JSON-over-HTTP catalog client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CatalogConfig;

use super::{Catalog, CatalogError, SearchCriteria};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    locations: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PathsRequest<'a> {
    locations: &'a [String],
}

#[derive(Debug, Deserialize)]
struct PathsResponse {
    #[serde(default)]
    urls: Vec<String>,
}

/// Catalog backed by a JSON search service.
///
/// `GET {url}/search?<criteria>&page=N&page_size=M` returns
/// `{"locations": [...]}`; `POST {url}/paths` with `{"locations": [...]}`
/// returns `{"urls": [...]}`.
pub struct HttpCatalog {
    client: Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CatalogError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    async fn check(response: Response) -> Result<Response, CatalogError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(CatalogError::ApiError(format!(
            "HTTP {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )))
    }
}

fn map_request_error(e: reqwest::Error) -> CatalogError {
    if e.is_timeout() {
        CatalogError::Timeout
    } else if e.is_connect() {
        CatalogError::ConnectionFailed(e.to_string())
    } else {
        CatalogError::ApiError(e.to_string())
    }
}

/// Build the search URL, percent-encoding every criteria value.
fn build_search_url(base: &str, criteria: &SearchCriteria, page: u32, page_size: usize) -> String {
    let mut url = format!("{}/search?page={}&page_size={}", base, page, page_size);
    for (key, value) in criteria.to_query_pairs() {
        url.push('&');
        url.push_str(&urlencoding::encode(&key));
        url.push('=');
        url.push_str(&urlencoding::encode(&value));
    }
    url
}

#[async_trait]
impl Catalog for HttpCatalog {
    fn name(&self) -> &str {
        "http"
    }

    async fn search(
        &self,
        criteria: &SearchCriteria,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<String>, CatalogError> {
        let url = build_search_url(&self.base_url, criteria, page, page_size);
        debug!(url = %url, "Querying catalog");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_request_error)?;
        let body: SearchResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CatalogError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(body.locations)
    }

    async fn image_urls(&self, locations: &[String]) -> Result<Vec<String>, CatalogError> {
        let response = self
            .client
            .post(format!("{}/paths", self.base_url))
            .json(&PathsRequest { locations })
            .send()
            .await
            .map_err(map_request_error)?;
        let body: PathsResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CatalogError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(body.urls)
    }
}
