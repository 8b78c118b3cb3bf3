//! Job creation and retry scheduling.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::job::{Job, JobPayload};
use super::queue::JobQueue;
use crate::domains::images::models::RateLimitedImageBatch;
use crate::kernel::Clock;

/// Minutes to wait before retry number `n` (1-based).
pub const BACKOFF_SCHEDULE_MINUTES: [i64; 4] = [15, 30, 60, 120];

/// Highest attempt number the backoff table covers.
pub const MAX_RETRY_ATTEMPTS: u32 = BACKOFF_SCHEDULE_MINUTES.len() as u32;

/// Backoff delay for `attempt`, or `None` once the table is exhausted.
pub fn backoff_delay(attempt: u32) -> Option<Duration> {
    let index = usize::try_from(attempt.checked_sub(1)?).ok()?;
    BACKOFF_SCHEDULE_MINUTES
        .get(index)
        .map(|minutes| Duration::minutes(*minutes))
}

#[derive(Clone)]
pub struct JobService {
    queue: Arc<dyn JobQueue>,
    clock: Arc<dyn Clock>,
}

impl JobService {
    pub fn new(queue: Arc<dyn JobQueue>, clock: Arc<dyn Clock>) -> Self {
        Self { queue, clock }
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// When retry `attempt` should run, counted from `now`. `None` means the
    /// caller must give up.
    pub fn calculate_retry_time(attempt: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        backoff_delay(attempt).map(|delay| now + delay)
    }

    /// [`Self::calculate_retry_time`] against the service clock.
    pub fn retry_time(&self, attempt: u32) -> Option<DateTime<Utc>> {
        Self::calculate_retry_time(attempt, self.clock.now())
    }

    /// Persists a new pending job. `scheduled_for = None` means now.
    pub async fn create_job(&self, payload: JobPayload, scheduled_for: Option<DateTime<Utc>>) -> Result<Job> {
        let now = self.clock.now();
        let job = Job::pending(payload, scheduled_for.unwrap_or(now), now);
        self.queue.insert(&job).await?;

        debug!(
            job_id = %job.id,
            job_type = %job.job_type(),
            scheduled_for = %job.scheduled_for,
            "job created"
        );
        Ok(job)
    }

    /// Enqueues an image retry job for `batch` at `scheduled_for`.
    pub async fn schedule_image_retry(
        &self,
        batch: RateLimitedImageBatch,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Job> {
        self.create_job(JobPayload::ImageRetry(batch), Some(scheduled_for))
            .await
    }
}
