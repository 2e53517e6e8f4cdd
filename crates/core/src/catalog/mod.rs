//! Imagery catalog abstraction.
//!
//! The catalog is an external service queried page by page with search
//! criteria. Each page lists image locations; a second call maps those
//! locations to download URLs.

mod http;
mod types;

pub use http::HttpCatalog;
pub use types::{BoundingBox, CatalogError, SearchCriteria};

use async_trait::async_trait;
use tracing::debug;

/// Paged imagery catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// One page of image locations matching `criteria`. Pages start at 1.
    async fn search(
        &self,
        criteria: &SearchCriteria,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<String>, CatalogError>;

    /// Map image locations to download URLs.
    async fn image_urls(&self, locations: &[String]) -> Result<Vec<String>, CatalogError>;
}

/// Walk every page of the search and collect all download URLs.
///
/// Stops at the first page whose length differs from `page_size`.
pub async fn collect_image_urls(
    catalog: &dyn Catalog,
    criteria: &SearchCriteria,
    page_size: usize,
) -> Result<Vec<String>, CatalogError> {
    let mut urls = Vec::new();
    let mut page = 1;

    loop {
        let locations = catalog.search(criteria, page, page_size).await?;
        debug!(
            catalog = catalog.name(),
            page,
            count = locations.len(),
            "Fetched catalog page"
        );

        if !locations.is_empty() {
            urls.extend(catalog.image_urls(&locations).await?);
        }

        if locations.len() != page_size {
            break;
        }
        page += 1;
    }

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCatalog;

    fn locations(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}-{}", prefix, i)).collect()
    }

    #[tokio::test]
    async fn test_collect_stops_on_short_page() {
        let catalog = MockCatalog::new();
        catalog.push_page(locations("a", 3)).await;
        catalog.push_page(locations("b", 3)).await;
        catalog.push_page(locations("c", 1)).await;
        catalog.push_page(locations("never", 3)).await;

        let urls = collect_image_urls(&catalog, &SearchCriteria::default(), 3)
            .await
            .unwrap();

        assert_eq!(urls.len(), 7);
        assert_eq!(urls[0], "http://images.test/a-0.tif");
        assert_eq!(catalog.requested_pages().await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_collect_exact_multiple_reads_trailing_empty_page() {
        let catalog = MockCatalog::new();
        catalog.push_page(locations("a", 2)).await;

        let urls = collect_image_urls(&catalog, &SearchCriteria::default(), 2)
            .await
            .unwrap();

        assert_eq!(urls.len(), 2);
        assert_eq!(catalog.requested_pages().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_collect_empty_catalog() {
        let catalog = MockCatalog::new();
        let urls = collect_image_urls(&catalog, &SearchCriteria::default(), 100)
            .await
            .unwrap();
        assert!(urls.is_empty());
    }

    #[tokio::test]
    async fn test_collect_propagates_errors() {
        let catalog = MockCatalog::new();
        catalog
            .set_next_error(CatalogError::ApiError("HTTP 500".to_string()))
            .await;

        let err = collect_image_urls(&catalog, &SearchCriteria::default(), 100)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_criteria_query_pairs() {
        let mut criteria = SearchCriteria {
            target: Some("moon".to_string()),
            bounds: Some(BoundingBox {
                min_lat: -10.0,
                max_lat: 10.0,
                west_lon: 20.5,
                east_lon: 30.0,
            }),
            ..Default::default()
        };
        criteria
            .extra
            .insert("resolution".to_string(), "100".to_string());

        let pairs = criteria.to_query_pairs();
        assert_eq!(pairs[0], ("target".to_string(), "moon".to_string()));
        assert!(pairs.contains(&("west_lon".to_string(), "20.5".to_string())));
        assert_eq!(
            pairs.last().unwrap(),
            &("resolution".to_string(), "100".to_string())
        );
    }
}
