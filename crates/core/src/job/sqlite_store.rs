//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{Job, JobError, JobId, JobStatus, JobStore, OutputFormat};

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        let conn = Connection::open(path).map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                compute_job_id TEXT,
                fail_reason TEXT,
                output_format TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            "#,
        )
        .map_err(|e| JobError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, JobError> {
        self.conn
            .lock()
            .map_err(|_| JobError::Database("connection mutex poisoned".to_string()))
    }

    fn row_to_job(row: &Row<'_>) -> rusqlite::Result<RawJob> {
        Ok(RawJob {
            id: row.get(0)?,
            status: row.get(1)?,
            compute_job_id: row.get(2)?,
            fail_reason: row.get(3)?,
            output_format: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

/// Column values before parsing into domain types.
struct RawJob {
    id: String,
    status: String,
    compute_job_id: Option<String>,
    fail_reason: Option<String>,
    output_format: String,
    created_at: String,
    updated_at: String,
}

impl RawJob {
    fn into_job(self) -> Result<Job, JobError> {
        Ok(Job::restore(
            self.id.parse()?,
            self.status.parse()?,
            self.compute_job_id,
            self.fail_reason,
            OutputFormat::resolve(Some(&self.output_format)),
            parse_timestamp(&self.created_at)?,
            parse_timestamp(&self.updated_at)?,
        ))
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, JobError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JobError::Database(format!("bad timestamp {}: {}", value, e)))
}

const SELECT_COLUMNS: &str =
    "SELECT id, status, compute_job_id, fail_reason, output_format, created_at, updated_at FROM jobs";

impl JobStore for SqliteJobStore {
    fn add(&self, job: &Job) -> Result<(), JobError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO jobs (id, status, compute_job_id, fail_reason, output_format, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                job.id.to_string(),
                job.status().as_str(),
                job.compute_job_id(),
                job.fail_reason(),
                job.output_format.as_str(),
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| JobError::Database(e.to_string()))?;
        Ok(())
    }

    fn update(&self, job: &Job) -> Result<(), JobError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE jobs SET status = ?2, compute_job_id = ?3, fail_reason = ?4,
                 output_format = ?5, updated_at = ?6 WHERE id = ?1",
                params![
                    job.id.to_string(),
                    job.status().as_str(),
                    job.compute_job_id(),
                    job.fail_reason(),
                    job.output_format.as_str(),
                    job.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| JobError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(JobError::NotFound(job.id));
        }
        Ok(())
    }

    fn load(&self, id: &JobId) -> Result<Option<Job>, JobError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id.to_string()],
                Self::row_to_job,
            )
            .optional()
            .map_err(|e| JobError::Database(e.to_string()))?;

        raw.map(RawJob::into_job).transpose()
    }

    fn find_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, JobError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "{} WHERE status IN ({}) ORDER BY created_at ASC",
            SELECT_COLUMNS, placeholders
        );

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| JobError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(
                params_from_iter(statuses.iter().map(|s| s.as_str())),
                Self::row_to_job,
            )
            .map_err(|e| JobError::Database(e.to_string()))?;

        let mut jobs = Vec::new();
        for raw in rows {
            let raw = raw.map_err(|e| JobError::Database(e.to_string()))?;
            jobs.push(raw.into_job()?);
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> SqliteJobStore {
        SqliteJobStore::in_memory().unwrap()
    }

    #[test]
    fn test_add_and_load() {
        let store = create_test_store();
        let job = Job::new(Some("png"));
        store.add(&job).unwrap();

        let loaded = store.load(&job.id).unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.status(), JobStatus::QueryingCatalog);
        assert_eq!(loaded.output_format.as_str(), "png");
        assert!(loaded.compute_job_id().is_none());
    }

    #[test]
    fn test_load_missing_returns_none() {
        let store = create_test_store();
        assert!(store.load(&JobId::new()).unwrap().is_none());
    }

    #[test]
    fn test_add_duplicate_fails() {
        let store = create_test_store();
        let job = Job::new(None);
        store.add(&job).unwrap();
        assert!(matches!(store.add(&job), Err(JobError::Database(_))));
    }

    #[test]
    fn test_update_overwrites_all_fields() {
        let store = create_test_store();
        let mut job = Job::new(None);
        store.add(&job).unwrap();

        job.start_compute("compute-7").unwrap();
        store.update(&job).unwrap();
        let loaded = store.load(&job.id).unwrap().unwrap();
        assert_eq!(loaded.status(), JobStatus::RunningCompute);
        assert_eq!(loaded.compute_job_id(), Some("compute-7"));

        job.fail("cluster exploded").unwrap();
        store.update(&job).unwrap();
        let loaded = store.load(&job.id).unwrap().unwrap();
        assert_eq!(loaded.status(), JobStatus::Failed);
        assert_eq!(loaded.fail_reason(), Some("cluster exploded"));
        assert_eq!(loaded.compute_job_id(), Some("compute-7"));
    }

    #[test]
    fn test_update_unknown_job_is_not_found() {
        let store = create_test_store();
        let job = Job::new(None);
        assert!(matches!(store.update(&job), Err(JobError::NotFound(id)) if id == job.id));
    }

    #[test]
    fn test_find_by_status() {
        let store = create_test_store();

        let querying = Job::new(None);
        store.add(&querying).unwrap();

        let mut computing = Job::new(None);
        computing.start_compute("c").unwrap();
        store.add(&computing).unwrap();

        let mut failed = Job::new(None);
        failed.fail("x").unwrap();
        store.add(&failed).unwrap();

        let running = store.find_running().unwrap();
        assert_eq!(running.len(), 2);
        assert!(running.contains(&querying));
        assert!(running.contains(&computing));

        let compute_only = store
            .find_by_status(&[JobStatus::RunningCompute])
            .unwrap();
        assert_eq!(compute_only, vec![computing]);

        assert!(store.find_by_status(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.db");

        let job = Job::new(Some("jpeg"));
        {
            let store = SqliteJobStore::new(&path).unwrap();
            store.add(&job).unwrap();
        }

        let store = SqliteJobStore::new(&path).unwrap();
        let loaded = store.load(&job.id).unwrap().unwrap();
        assert_eq!(loaded.output_format.extension(), "jpeg");
    }
}
