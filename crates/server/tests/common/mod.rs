//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock pipeline collaborators injected, so the HTTP boundary can be
//! exercised without a catalog service, network or compute cluster.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceExt;

use mosaic_core::{
    config::{DatabaseConfig, ServerConfig},
    executor::{BuildVrtStage, ExecutableStage, TranslateStage},
    spawn_monitor_timer,
    testing::{MockCatalog, MockComputeCluster, MockDownloader, MockPublisher},
    ArtifactPublisher, Catalog, ComputeCluster, ComputeMonitor, Config, ImageFetcher,
    ImageStaging, Job, JobId, JobLayout, JobStore, ProcessChain, ProcessSupervisor,
    SqliteJobStore, WorkflowCoordinator, WorkflowParts,
};

/// Re-export fixtures for test convenience
pub use mosaic_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// Provides an in-process server with fully controllable mocks for:
/// - Catalog search (MockCatalog)
/// - Compute cluster (MockComputeCluster)
/// - Artifact publishing (MockPublisher)
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_generate() {
///     let fixture = TestFixture::new().await;
///     fixture.catalog.push_page(fixtures::locations(2)).await;
///
///     let response = fixture.post("/api/v1/generate", json!({
///         "criteria": { "target": "moon" }
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock catalog - configure search result pages
    pub catalog: Arc<MockCatalog>,
    /// Mock compute cluster - control compute outcomes
    pub cluster: Arc<MockComputeCluster>,
    /// Mock publisher - records uploads and hands out links
    pub publisher: Arc<MockPublisher>,
    /// Job store backing the server
    pub store: Arc<SqliteJobStore>,
    /// Coordinator behind the generate endpoint
    pub coordinator: Arc<WorkflowCoordinator>,
    shutdown_tx: broadcast::Sender<()>,
    /// Temporary directory for the test database and staging areas
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path();
        let db_path = root.join("test.db");

        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            ..Default::default()
        };

        let store =
            Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));
        let layout = JobLayout::new(root.join("staging"));
        std::fs::create_dir_all(layout.staging_root()).expect("Failed to create staging root");

        // Create mocks
        let catalog = Arc::new(MockCatalog::new());
        let cluster = Arc::new(MockComputeCluster::new());
        let publisher = Arc::new(MockPublisher::new());

        let cache_dir = root.join("cache");
        std::fs::create_dir_all(&cache_dir).expect("Failed to create cache dir");
        let downloader = Arc::new(MockDownloader::new(&cache_dir));
        downloader.set_auto_complete(true);
        let fetcher = Arc::new(ImageFetcher::new(downloader));
        fetcher.start();

        let staging = ImageStaging::new(root.join("pics"), "part-000000");

        let supervisor = Arc::new(ProcessSupervisor::new(Duration::from_millis(20)));
        supervisor.start();
        let stages: Vec<Arc<dyn ExecutableStage>> = vec![
            Arc::new(BuildVrtStage::new("true", layout.clone())),
            Arc::new(TranslateStage::new("true", layout)),
        ];
        let (chain_tx, chain_rx) = mpsc::unbounded_channel();
        let chain = Arc::new(ProcessChain::new(stages, supervisor, chain_tx));
        chain.start();

        let (compute_tx, compute_rx) = mpsc::unbounded_channel();
        let monitor = Arc::new(ComputeMonitor::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::clone(&cluster) as Arc<dyn ComputeCluster>,
            staging.clone(),
            compute_tx,
        ));
        let (shutdown_tx, _) = broadcast::channel(1);
        spawn_monitor_timer(monitor, Duration::from_millis(20), shutdown_tx.subscribe());

        let coordinator = Arc::new(WorkflowCoordinator::new(
            WorkflowParts {
                store: Arc::clone(&store) as Arc<dyn JobStore>,
                catalog: Arc::clone(&catalog) as Arc<dyn Catalog>,
                fetcher,
                staging,
                cluster: Arc::clone(&cluster) as Arc<dyn ComputeCluster>,
                chain,
                publisher: Arc::clone(&publisher) as Arc<dyn ArtifactPublisher>,
                page_size: 100,
            },
            chain_rx,
            compute_rx,
        ));
        coordinator.start();

        // Create app state with mocks
        let state = Arc::new(mosaic_server::state::AppState::new(
            config,
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::clone(&coordinator),
            Arc::clone(&publisher) as Arc<dyn ArtifactPublisher>,
        ));

        // Create router
        let router = mosaic_server::api::create_router(state);

        Self {
            router,
            catalog,
            cluster,
            publisher,
            store,
            coordinator,
            shutdown_tx,
            temp_dir,
        }
    }

    /// Load a job straight from the store.
    pub fn job(&self, id: &JobId) -> Job {
        self.store
            .load(id)
            .expect("Failed to load job")
            .expect("Job not found")
    }

    /// Poll the store until `predicate` holds for the job.
    pub async fn wait_for_job(&self, id: &JobId, predicate: impl Fn(&Job) -> bool) -> Job {
        for _ in 0..250 {
            let job = self.job(id);
            if predicate(&job) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Job {} never reached the expected state", id);
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

impl Drop for TestFixture {
    fn drop(&mut self) {
        self.coordinator.stop();
        let _ = self.shutdown_tx.send(());
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
