//! Job API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use mosaic_core::{Job, JobId, JobStatus, SearchCriteria, WorkflowError};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a mosaic job
#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    /// Catalog search criteria
    pub criteria: SearchCriteria,
    /// Output format of the final artifact (default: gtiff)
    pub output_format: Option<String>,
}

/// Response for a started job
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub tracking_id: String,
}

/// Response for a status query
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// `running` for every running status, otherwise the terminal status
    pub status: String,
    /// Exact status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Short-lived artifact URL, only for completed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl StatusResponse {
    fn not_found() -> Self {
        Self {
            status: "not_found".to_string(),
            phase: None,
            reason: Some("Unknown job id".to_string()),
            link: None,
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(JobErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a job and start its workflow
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> Response {
    match state
        .coordinator()
        .submit(body.criteria, body.output_format.as_deref())
    {
        Ok(job) => (
            StatusCode::CREATED,
            Json(GenerateResponse {
                tracking_id: job.id.to_string(),
            }),
        )
            .into_response(),
        Err(e @ WorkflowError::JobAlreadyRunning(_)) => {
            warn!("Rejected generate request: {}", e);
            error_response(StatusCode::CONFLICT, e)
        }
        Err(e @ WorkflowError::NotRunning) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, e)
        }
        Err(e) => {
            error!("Failed to start job: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// Get the status of a job
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(job_id) = id.parse::<JobId>() else {
        return (StatusCode::NOT_FOUND, Json(StatusResponse::not_found())).into_response();
    };

    match state.job_store().load(&job_id) {
        Ok(Some(job)) => Json(status_of(&state, &job).await).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(StatusResponse::not_found())).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn status_of(state: &AppState, job: &Job) -> StatusResponse {
    let link = if job.status() == JobStatus::Completed {
        match state.publisher().access_url(job).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("No access URL for job {}: {}", job.id, e);
                None
            }
        }
    } else {
        None
    };

    StatusResponse {
        status: job.status().display_name().to_string(),
        phase: Some(job.status()),
        reason: job.fail_reason().map(str::to_string),
        link,
    }
}
