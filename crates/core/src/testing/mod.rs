//! Testing utilities and mock implementations for end-to-end tests.
//!
//! Mocks stand in for every external collaborator of the pipeline so the
//! workflow can be driven without a catalog service, network or compute
//! cluster.
//!
//! # Example
//!
//! ```rust,ignore
//! use mosaic_core::testing::{MockCatalog, MockComputeCluster, MockDownloader};
//!
//! let catalog = MockCatalog::new();
//! catalog.push_page(vec!["M1".into(), "M2".into()]).await;
//!
//! let cluster = MockComputeCluster::new();
//! cluster.set_status("mock-compute-1", ComputeStatus::Succeeded).await;
//! ```

mod mock_catalog;
mod mock_compute;
mod mock_downloader;
mod mock_publisher;

pub use mock_catalog::MockCatalog;
pub use mock_compute::MockComputeCluster;
pub use mock_downloader::MockDownloader;
pub use mock_publisher::MockPublisher;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::BTreeMap;
    use std::path::Path;

    use crate::catalog::{BoundingBox, SearchCriteria};

    /// Criteria for a small lunar search.
    pub fn lunar_criteria() -> SearchCriteria {
        SearchCriteria {
            target: Some("moon".to_string()),
            mission: Some("lro".to_string()),
            instrument: Some("lroc".to_string()),
            product_type: Some("edr".to_string()),
            bounds: Some(BoundingBox {
                min_lat: -10.0,
                max_lat: 10.0,
                west_lon: 20.0,
                east_lon: 40.0,
            }),
            extra: BTreeMap::new(),
        }
    }

    /// Locations `M0001`, `M0002`, ... up to `count`.
    pub fn locations(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("M{:04}", i)).collect()
    }

    /// Write a stub executable shell script and return its path.
    #[cfg(unix)]
    pub fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body))
            .unwrap_or_else(|e| panic!("failed to write {}: {}", path.display(), e));
        let mut perms = std::fs::metadata(&path)
            .unwrap_or_else(|e| panic!("failed to stat {}: {}", path.display(), e))
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms)
            .unwrap_or_else(|e| panic!("failed to chmod {}: {}", path.display(), e));
        path
    }
}
