use std::sync::Arc;

use mosaic_core::{
    ArtifactPublisher, Config, JobStore, SanitizedConfig, WorkflowCoordinator, WorkflowStatus,
};

/// Shared application state
pub struct AppState {
    config: Config,
    job_store: Arc<dyn JobStore>,
    coordinator: Arc<WorkflowCoordinator>,
    publisher: Arc<dyn ArtifactPublisher>,
}

impl AppState {
    pub fn new(
        config: Config,
        job_store: Arc<dyn JobStore>,
        coordinator: Arc<WorkflowCoordinator>,
        publisher: Arc<dyn ArtifactPublisher>,
    ) -> Self {
        Self {
            config,
            job_store,
            coordinator,
            publisher,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn job_store(&self) -> &dyn JobStore {
        self.job_store.as_ref()
    }

    pub fn coordinator(&self) -> &WorkflowCoordinator {
        self.coordinator.as_ref()
    }

    pub fn publisher(&self) -> &dyn ArtifactPublisher {
        self.publisher.as_ref()
    }

    pub fn workflow_status(&self) -> WorkflowStatus {
        self.coordinator.status()
    }
}
