//! Persistence handle for job rows.
//!
//! `PostgresJobQueue` claims work with `FOR UPDATE SKIP LOCKED` so several
//! runners can share one table. `MemoryJobQueue` has the same semantics for
//! tests and local runs.
//!
//! A claim is a lease: the runner renews it while the job runs, and a job
//! whose lease expired (its worker crashed or was killed) is claimed again
//! like a pending one.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use std::sync::Mutex;
use uuid::Uuid;

use super::job::{Job, JobPayload, JobResult, JobStatus, JobType};
use crate::common::JobId;

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Moves up to `limit` pending jobs scheduled at or before `now`, plus
    /// processing jobs with an expired lease, to `processing` under a fresh
    /// lease. Oldest schedule first.
    async fn claim_ready(&self, worker_id: &str, limit: i64, now: DateTime<Utc>) -> Result<Vec<Job>>;

    /// Renews the lease of a job `worker_id` still holds.
    async fn extend_lease(&self, id: JobId, worker_id: &str, now: DateTime<Utc>) -> Result<()>;

    async fn mark_completed(&self, id: JobId, result: &JobResult) -> Result<()>;

    async fn mark_failed(&self, id: JobId, error: &str, partial: Option<&JobResult>) -> Result<()>;

    /// Returns a claimed job to `pending` so another run can pick it up.
    async fn release(&self, id: JobId) -> Result<()>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>>;
}

// ============================================================================
// Postgres
// ============================================================================

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    payload: serde_json::Value,
    status: JobStatus,
    scheduled_for: DateTime<Utc>,
    created_at: DateTime<Utc>,
    attempts: i32,
    result: Option<serde_json::Value>,
    error_message: Option<String>,
    worker_id: Option<String>,
    lease_expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> Result<Self> {
        let payload = JobPayload::from_parts(&row.job_type, row.payload)?;
        let result = row
            .result
            .map(serde_json::from_value::<JobResult>)
            .transpose()
            .with_context(|| format!("Failed to decode result of job {}", row.id))?;

        Ok(Job {
            id: JobId::from_uuid(row.id),
            payload,
            status: row.status,
            scheduled_for: row.scheduled_for,
            created_at: row.created_at,
            attempts: row.attempts,
            result,
            error_message: row.error_message,
            worker_id: row.worker_id,
            lease_expires_at: row.lease_expires_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, job_type, payload, status, scheduled_for, created_at, attempts, result, \
                           error_message, worker_id, lease_expires_at";

/// How long a claim stays valid without renewal.
pub fn default_lease_duration() -> Duration {
    Duration::minutes(10)
}

#[derive(Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
    lease_duration: Duration,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease_duration: default_lease_duration(),
        }
    }

    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn insert(&self, job: &Job) -> Result<()> {
        let body = job.payload.body().context("Failed to encode job payload")?;
        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, payload, status, scheduled_for, created_at, attempts)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id)
        .bind(job.job_type().as_str())
        .bind(body)
        .bind(job.status)
        .bind(job.scheduled_for)
        .bind(job.created_at)
        .bind(job.attempts)
        .execute(&self.pool)
        .await
        .context("Failed to insert job")?;
        Ok(())
    }

    async fn claim_ready(&self, worker_id: &str, limit: i64, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'processing',
                worker_id = $1,
                attempts = attempts + 1,
                lease_expires_at = $4,
                started_at = $3,
                updated_at = $3
            WHERE id IN (
                SELECT id FROM jobs
                WHERE (status = 'pending' AND scheduled_for <= $3)
                   OR (status = 'processing' AND lease_expires_at < $3)
                ORDER BY scheduled_for, created_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        );

        let rows: Vec<JobRow> = sqlx::query_as(&sql)
            .bind(worker_id)
            .bind(limit)
            .bind(now)
            .bind(now + self.lease_duration)
            .fetch_all(&self.pool)
            .await
            .context("Failed to claim jobs")?;

        let mut jobs: Vec<Job> = rows
            .into_iter()
            .map(Job::try_from)
            .collect::<Result<_>>()?;
        jobs.sort_by_key(|j| (j.scheduled_for, j.created_at));
        Ok(jobs)
    }

    async fn extend_lease(&self, id: JobId, worker_id: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = $3, updated_at = $2
            WHERE id = $1 AND status = 'processing' AND worker_id = $4
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(now + self.lease_duration)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .context("Failed to extend job lease")?;
        Ok(())
    }

    async fn mark_completed(&self, id: JobId, result: &JobResult) -> Result<()> {
        let result = serde_json::to_value(result).context("Failed to encode job result")?;
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed', result = $2, error_message = NULL,
                lease_expires_at = NULL, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(result)
        .execute(&self.pool)
        .await
        .context("Failed to mark job completed")?;
        Ok(())
    }

    async fn mark_failed(&self, id: JobId, error: &str, partial: Option<&JobResult>) -> Result<()> {
        let partial = partial
            .map(serde_json::to_value)
            .transpose()
            .context("Failed to encode partial job result")?;
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', error_message = $2, result = $3,
                lease_expires_at = NULL, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(partial)
        .execute(&self.pool)
        .await
        .context("Failed to mark job failed")?;
        Ok(())
    }

    async fn release(&self, id: JobId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', worker_id = NULL, lease_expires_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to release job")?;
        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load job")?;
        row.map(Job::try_from).transpose()
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug)]
pub struct MemoryJobQueue {
    jobs: Mutex<Vec<Job>>,
    lease_duration: Duration,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            lease_duration: default_lease_duration(),
        }
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    /// Snapshot of every job in insertion order.
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn jobs_of_type(&self, job_type: JobType) -> Vec<Job> {
        self.jobs()
            .into_iter()
            .filter(|j| j.job_type() == job_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<F: FnOnce(&mut Job)>(&self, id: JobId, f: F) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| anyhow!("job {} not found", id))?;
        f(job);
        Ok(())
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn insert(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(anyhow!("job {} already exists", job.id));
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn claim_ready(&self, worker_id: &str, limit: i64, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());

        let mut ready: Vec<usize> = jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.is_claimable(now))
            .map(|(i, _)| i)
            .collect();
        ready.sort_by_key(|&i| (jobs[i].scheduled_for, jobs[i].created_at));
        ready.truncate(limit);

        Ok(ready
            .into_iter()
            .map(|i| {
                let job = &mut jobs[i];
                job.status = JobStatus::Processing;
                job.worker_id = Some(worker_id.to_string());
                job.lease_expires_at = Some(now + self.lease_duration);
                job.attempts += 1;
                job.clone()
            })
            .collect())
    }

    async fn extend_lease(&self, id: JobId, worker_id: &str, now: DateTime<Utc>) -> Result<()> {
        let lease_duration = self.lease_duration;
        self.update(id, |job| {
            if job.status == JobStatus::Processing && job.worker_id.as_deref() == Some(worker_id) {
                job.lease_expires_at = Some(now + lease_duration);
            }
        })
    }

    async fn mark_completed(&self, id: JobId, result: &JobResult) -> Result<()> {
        self.update(id, |job| {
            job.status = JobStatus::Completed;
            job.result = Some(result.clone());
            job.error_message = None;
            job.lease_expires_at = None;
        })
    }

    async fn mark_failed(&self, id: JobId, error: &str, partial: Option<&JobResult>) -> Result<()> {
        self.update(id, |job| {
            job.status = JobStatus::Failed;
            job.error_message = Some(error.to_string());
            job.result = partial.cloned();
            job.lease_expires_at = None;
        })
    }

    async fn release(&self, id: JobId) -> Result<()> {
        self.update(id, |job| {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                job.lease_expires_at = None;
            }
        })
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.jobs().into_iter().find(|j| j.id == id))
    }
}
