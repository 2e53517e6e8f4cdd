//! Job types and state machine.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::JobError;

/// Stable identifier of a job. Used as the key of every per-job map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| JobError::InvalidId(s.to_string()))
    }
}

/// Where a job currently is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    QueryingCatalog,
    RunningCompute,
    RunningPostProcess,
    Failed,
    Completed,
    Killed,
}

impl JobStatus {
    /// Every status that counts as "running" for the single-job rule.
    pub const RUNNING: [JobStatus; 3] = [
        JobStatus::QueryingCatalog,
        JobStatus::RunningCompute,
        JobStatus::RunningPostProcess,
    ];

    /// Storage name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::QueryingCatalog => "querying_catalog",
            JobStatus::RunningCompute => "running_compute",
            JobStatus::RunningPostProcess => "running_post_process",
            JobStatus::Failed => "failed",
            JobStatus::Completed => "completed",
            JobStatus::Killed => "killed",
        }
    }

    /// Name shown to API clients. All running statuses collapse to "running".
    pub fn display_name(&self) -> &'static str {
        if self.is_running() {
            "running"
        } else {
            self.as_str()
        }
    }

    pub fn is_running(&self) -> bool {
        Self::RUNNING.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_running()
    }

    /// Whether the state machine has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (QueryingCatalog, RunningCompute)
                | (QueryingCatalog, Failed)
                | (RunningCompute, RunningPostProcess)
                | (RunningCompute, Failed)
                | (RunningPostProcess, Completed)
                | (RunningPostProcess, Failed)
                | (QueryingCatalog, Killed)
                | (RunningCompute, Killed)
                | (RunningPostProcess, Killed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "querying_catalog" => Ok(JobStatus::QueryingCatalog),
            "running_compute" => Ok(JobStatus::RunningCompute),
            "running_post_process" => Ok(JobStatus::RunningPostProcess),
            "failed" => Ok(JobStatus::Failed),
            "completed" => Ok(JobStatus::Completed),
            "killed" => Ok(JobStatus::Killed),
            other => Err(JobError::Database(format!("unknown job status: {}", other))),
        }
    }
}

/// Requested output encoding of the final artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputFormat(String);

impl OutputFormat {
    pub const DEFAULT: &'static str = "gtiff";

    /// Resolve an optional user-supplied format, falling back to the default
    /// when missing or blank.
    pub fn resolve(requested: Option<&str>) -> Self {
        match requested.map(str::trim) {
            Some(format) if !format.is_empty() => Self(format.to_string()),
            _ => Self::default(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File extension of artifacts in this format.
    ///
    /// `gtiff` is the only irregular mapping; every other format is its own
    /// extension.
    pub fn extension(&self) -> &str {
        if self.0.eq_ignore_ascii_case(Self::DEFAULT) {
            "tiff"
        } else {
            &self.0
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One end-to-end pipeline run.
///
/// Status only changes through the transition methods, each of which checks
/// the edge against [`JobStatus::can_transition_to`]. Equality and hashing
/// use the id alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    status: JobStatus,
    compute_job_id: Option<String>,
    fail_reason: Option<String>,
    pub output_format: OutputFormat,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a job in `QueryingCatalog` with a fresh id.
    pub fn new(output_format: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::QueryingCatalog,
            compute_job_id: None,
            fail_reason: None,
            output_format: OutputFormat::resolve(output_format),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a job from stored columns. Only stores should call this.
    pub fn restore(
        id: JobId,
        status: JobStatus,
        compute_job_id: Option<String>,
        fail_reason: Option<String>,
        output_format: OutputFormat,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status,
            compute_job_id,
            fail_reason,
            output_format,
            created_at,
            updated_at,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn compute_job_id(&self) -> Option<&str> {
        self.compute_job_id.as_deref()
    }

    pub fn fail_reason(&self) -> Option<&str> {
        self.fail_reason.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// `QueryingCatalog -> RunningCompute`, recording the external compute id.
    pub fn start_compute(&mut self, compute_job_id: impl Into<String>) -> Result<(), JobError> {
        self.transition(JobStatus::RunningCompute)?;
        self.compute_job_id = Some(compute_job_id.into());
        Ok(())
    }

    /// `RunningCompute -> RunningPostProcess`.
    pub fn start_post_process(&mut self) -> Result<(), JobError> {
        self.transition(JobStatus::RunningPostProcess)
    }

    /// `RunningPostProcess -> Completed`.
    pub fn complete(&mut self) -> Result<(), JobError> {
        self.transition(JobStatus::Completed)
    }

    /// Any running status `-> Failed` with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), JobError> {
        self.transition(JobStatus::Failed)?;
        self.fail_reason = Some(reason.into());
        Ok(())
    }

    /// Any running status `-> Killed`. Reserved for the recovery sweep.
    pub fn kill(&mut self) -> Result<(), JobError> {
        self.transition(JobStatus::Killed)
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), JobError> {
        if !self.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl Hash for Job {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_job_is_querying_catalog() {
        let job = Job::new(None);
        assert_eq!(job.status(), JobStatus::QueryingCatalog);
        assert!(job.is_running());
        assert!(job.compute_job_id().is_none());
        assert!(job.fail_reason().is_none());
    }

    #[test]
    fn test_default_output_format_maps_to_tiff() {
        let job = Job::new(None);
        assert_eq!(job.output_format.as_str(), "gtiff");
        assert_eq!(job.output_format.extension(), "tiff");

        let blank = Job::new(Some("  "));
        assert_eq!(blank.output_format.as_str(), "gtiff");
    }

    #[test]
    fn test_gtiff_mapping_ignores_case() {
        let format = OutputFormat::resolve(Some("GTiff"));
        assert_eq!(format.as_str(), "GTiff");
        assert_eq!(format.extension(), "tiff");
    }

    #[test]
    fn test_regular_formats_map_to_themselves() {
        assert_eq!(OutputFormat::resolve(Some("png")).extension(), "png");
        assert_eq!(OutputFormat::resolve(Some("jpeg")).extension(), "jpeg");
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = Job::new(None);
        job.start_compute("job_42").unwrap();
        assert_eq!(job.status(), JobStatus::RunningCompute);
        assert_eq!(job.compute_job_id(), Some("job_42"));

        job.start_post_process().unwrap();
        assert_eq!(job.status(), JobStatus::RunningPostProcess);

        job.complete().unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.status().is_terminal());
    }

    #[test]
    fn test_fail_records_reason() {
        let mut job = Job::new(None);
        job.fail("No images for search criteria").unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.fail_reason(), Some("No images for search criteria"));
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut job = Job::new(None);
        let err = job.complete().unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition {
                from: JobStatus::QueryingCatalog,
                to: JobStatus::Completed,
                ..
            }
        ));
        assert_eq!(job.status(), JobStatus::QueryingCatalog);

        assert!(job.start_post_process().is_err());

        job.fail("boom").unwrap();
        assert!(job.fail("again").is_err());
        assert!(job.kill().is_err());
        assert_eq!(job.fail_reason(), Some("boom"));
    }

    #[test]
    fn test_compute_id_set_only_once() {
        let mut job = Job::new(None);
        job.start_compute("first").unwrap();
        assert!(job.start_compute("second").is_err());
        assert_eq!(job.compute_job_id(), Some("first"));
    }

    #[test]
    fn test_kill_from_every_running_status() {
        let mut querying = Job::new(None);
        querying.kill().unwrap();

        let mut computing = Job::new(None);
        computing.start_compute("c").unwrap();
        computing.kill().unwrap();

        let mut post = Job::new(None);
        post.start_compute("c").unwrap();
        post.start_post_process().unwrap();
        post.kill().unwrap();

        for job in [querying, computing, post] {
            assert_eq!(job.status(), JobStatus::Killed);
        }
    }

    #[test]
    fn test_terminal_statuses_have_no_edges() {
        let all = [
            JobStatus::QueryingCatalog,
            JobStatus::RunningCompute,
            JobStatus::RunningPostProcess,
            JobStatus::Failed,
            JobStatus::Completed,
            JobStatus::Killed,
        ];
        for from in [JobStatus::Failed, JobStatus::Completed, JobStatus::Killed] {
            for to in all {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(JobStatus::QueryingCatalog.display_name(), "running");
        assert_eq!(JobStatus::RunningCompute.display_name(), "running");
        assert_eq!(JobStatus::RunningPostProcess.display_name(), "running");
        assert_eq!(JobStatus::Failed.display_name(), "failed");
        assert_eq!(JobStatus::Completed.display_name(), "completed");
        assert_eq!(JobStatus::Killed.display_name(), "killed");
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            JobStatus::QueryingCatalog,
            JobStatus::RunningCompute,
            JobStatus::RunningPostProcess,
            JobStatus::Failed,
            JobStatus::Completed,
            JobStatus::Killed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_equality_uses_id_only() {
        let job = Job::new(None);
        let mut changed = job.clone();
        changed.fail("x").unwrap();
        assert_eq!(job, changed);

        let mut set = HashSet::new();
        set.insert(job.clone());
        assert!(set.contains(&changed));
        assert_ne!(job, Job::new(None));
    }

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!(matches!(
            "not-a-uuid".parse::<JobId>(),
            Err(JobError::InvalidId(_))
        ));
    }

    #[test]
    fn test_job_serializes_id_as_plain_string() {
        let job = Job::new(Some("png"));

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["id"], serde_json::json!(job.id.to_string()));
        assert_eq!(json["status"], "querying_catalog");

        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, job.id);
        assert_eq!(back.output_format.as_str(), "png");
    }
}
