//! Mock catalog for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::catalog::{Catalog, CatalogError, SearchCriteria};

/// Mock implementation of the [`Catalog`] trait.
///
/// Pages are served in the order they were pushed; pages past the last
/// pushed one are empty. Each location `loc` maps to
/// `http://images.test/{loc}.tif`.
///
/// # Example
///
/// ```rust,ignore
/// let catalog = MockCatalog::new();
/// catalog.push_page(vec!["M1".into(), "M2".into()]).await;
///
/// let urls = collect_image_urls(&catalog, &criteria, 100).await?;
/// assert_eq!(catalog.requested_pages().await, vec![1]);
/// ```
#[derive(Debug, Default)]
pub struct MockCatalog {
    pages: Arc<RwLock<Vec<Vec<String>>>>,
    requested_pages: Arc<RwLock<Vec<u32>>>,
    searches: Arc<RwLock<Vec<SearchCriteria>>>,
    next_error: Arc<RwLock<Option<CatalogError>>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a page of locations.
    pub async fn push_page(&self, locations: Vec<String>) {
        self.pages.write().await.push(locations);
    }

    /// Make the next search call fail with `error`.
    pub async fn set_next_error(&self, error: CatalogError) {
        *self.next_error.write().await = Some(error);
    }

    /// Page numbers requested so far, in call order.
    pub async fn requested_pages(&self) -> Vec<u32> {
        self.requested_pages.read().await.clone()
    }

    /// Criteria of every search call.
    pub async fn recorded_searches(&self) -> Vec<SearchCriteria> {
        self.searches.read().await.clone()
    }

    /// URL the mock returns for `location`.
    pub fn url_for(location: &str) -> String {
        format!("http://images.test/{}.tif", location)
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(
        &self,
        criteria: &SearchCriteria,
        page: u32,
        _page_size: usize,
    ) -> Result<Vec<String>, CatalogError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        self.requested_pages.write().await.push(page);
        self.searches.write().await.push(criteria.clone());

        let pages = self.pages.read().await;
        Ok(pages
            .get(page.saturating_sub(1) as usize)
            .cloned()
            .unwrap_or_default())
    }

    async fn image_urls(&self, locations: &[String]) -> Result<Vec<String>, CatalogError> {
        Ok(locations.iter().map(|loc| Self::url_for(loc)).collect())
    }
}
