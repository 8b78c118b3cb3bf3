//! Job runner: the worker pool that drains the queue.
//!
//! ```text
//! JobRunner
//!     │
//!     ├─► claim_ready (JobQueue)
//!     ├─► resolve executor (JobExecutorRegistry)
//!     ├─► execute with JobContext (progress, cancellation, events)
//!     │     └─► extend_lease every heartbeat while it runs
//!     └─► mark completed / failed, or release on cancellation
//! ```
//!
//! At most `max_concurrent_jobs` jobs run at once, bounded by a semaphore.
//! The heartbeat must be well under the queue's lease duration, or a slow
//! job gets claimed a second time.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::JobError;
use super::executor::JobContext;
use super::job::{Job, JobPayload, JobResult};
use super::progress::ProgressReporter;
use super::queue::JobQueue;
use super::registry::SharedJobRegistry;
use crate::common::JobId;
use crate::domains::reviews::models::ReviewEnrichmentPayload;
use crate::kernel::WorkerDeps;

#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    /// Jobs allowed to run at the same time.
    pub max_concurrent_jobs: usize,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// How often a running job's lease is renewed.
    pub heartbeat_interval: Duration,
    pub worker_id: String,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            poll_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(60),
            worker_id: format!("runner-{}", Uuid::new_v4()),
        }
    }
}

/// How a single job run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    Released,
}

pub struct JobRunner {
    queue: Arc<dyn JobQueue>,
    registry: SharedJobRegistry,
    deps: Arc<WorkerDeps>,
    config: JobRunnerConfig,
    shutdown: CancellationToken,
    slots: Arc<Semaphore>,
}

impl JobRunner {
    pub fn new(queue: Arc<dyn JobQueue>, registry: SharedJobRegistry, deps: Arc<WorkerDeps>) -> Self {
        Self::with_config(queue, registry, deps, JobRunnerConfig::default())
    }

    pub fn with_config(
        queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        deps: Arc<WorkerDeps>,
        config: JobRunnerConfig,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            queue,
            registry,
            deps,
            config,
            shutdown: CancellationToken::new(),
            slots,
        }
    }

    /// Cancelling this token stops polling and cancels running jobs.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn pool_size(&self) -> usize {
        self.config.max_concurrent_jobs.max(1)
    }

    /// Runs until the shutdown token is cancelled, then waits for in-flight
    /// jobs to settle.
    pub async fn run(self) -> Result<()> {
        let runner = Arc::new(self);
        info!(
            worker_id = %runner.config.worker_id,
            max_concurrent_jobs = runner.pool_size(),
            poll_interval_ms = runner.config.poll_interval.as_millis() as u64,
            registered = ?runner.registry.registered_types(),
            "job runner starting"
        );

        loop {
            let permit = tokio::select! {
                _ = runner.shutdown.cancelled() => break,
                permit = runner.slots.clone().acquire_owned() => permit?,
            };

            let now = runner.deps.clock.now();
            let mut jobs = match runner.queue.claim_ready(&runner.config.worker_id, 1, now).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    drop(permit);
                    runner.idle(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let Some(job) = jobs.pop() else {
                drop(permit);
                runner.idle(runner.config.poll_interval).await;
                continue;
            };

            let worker = runner.clone();
            tokio::spawn(async move {
                worker.process_job(job).await;
                drop(permit);
            });
        }

        info!(worker_id = %runner.config.worker_id, "job runner draining");
        let pool = u32::try_from(runner.pool_size()).unwrap_or(u32::MAX);
        let _drained = runner.slots.acquire_many(pool).await?;
        info!(worker_id = %runner.config.worker_id, "job runner stopped");
        Ok(())
    }

    /// Runs until Ctrl+C.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let shutdown = self.shutdown_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received shutdown signal");
            }
            shutdown.cancel();
        });
        self.run().await
    }

    async fn idle(&self, duration: Duration) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }

    /// Claims one batch of ready jobs (up to the pool size), runs them
    /// concurrently and returns their outcomes.
    pub async fn run_once(&self) -> Result<Vec<JobOutcome>> {
        let now = self.deps.clock.now();
        let limit = i64::try_from(self.pool_size()).unwrap_or(i64::MAX);
        let jobs = self
            .queue
            .claim_ready(&self.config.worker_id, limit, now)
            .await?;
        if !jobs.is_empty() {
            debug!(count = jobs.len(), "claimed jobs");
        }
        Ok(join_all(jobs.into_iter().map(|job| self.process_job(job))).await)
    }

    /// Runs a claimed job and records how it ended.
    pub async fn process_job(&self, job: Job) -> JobOutcome {
        let job_id = job.id;
        let job_type = job.job_type();

        let executor = match self.registry.get(job_type) {
            Ok(executor) => executor,
            Err(e) => {
                error!(job_id = %job_id, job_type = %job_type, error = %e, "cannot run job");
                self.persist_failure(&job, &e).await;
                return JobOutcome::Failed;
            }
        };

        let progress = ProgressReporter::from_callback(move |update| {
            debug!(
                job_id = %job_id,
                total = ?update.total_items,
                processed = ?update.processed_items,
                failed = ?update.failed_items,
                "job progress"
            );
        });
        let ctx = JobContext::new(job_id, self.deps.clone())
            .with_progress(progress)
            .with_cancellation(self.shutdown.child_token());

        debug!(job_id = %job_id, job_type = %job_type, executor = executor.name(), "executing job");

        let run = AssertUnwindSafe(executor.execute_payload(job.payload.clone(), &ctx)).catch_unwind();
        tokio::pin!(run);
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval.max(Duration::from_secs(1)));
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; the claim itself set the lease.
        heartbeat.tick().await;
        let run = loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                _ = heartbeat.tick() => self.renew_lease(job_id).await,
            }
        };

        match run {
            Ok(Ok(result)) => {
                info!(job_id = %job_id, job_type = %job_type, "job completed");
                if let Err(e) = self.queue.mark_completed(job_id, &result).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job as completed");
                }
                self.chain_continuous(&job, &result).await;
                JobOutcome::Completed
            }
            Ok(Err(JobError::Cancelled)) => {
                info!(job_id = %job_id, job_type = %job_type, "job cancelled, releasing");
                if let Err(e) = self.queue.release(job_id).await {
                    error!(job_id = %job_id, error = %e, "failed to release job");
                }
                JobOutcome::Released
            }
            Ok(Err(e)) => {
                warn!(job_id = %job_id, job_type = %job_type, error = %e, "job failed");
                self.persist_failure(&job, &e).await;
                JobOutcome::Failed
            }
            Err(_) => {
                error!(job_id = %job_id, job_type = %job_type, "executor panicked");
                self.persist_failure(&job, &JobError::system("executor panicked"))
                    .await;
                JobOutcome::Failed
            }
        }
    }

    async fn renew_lease(&self, job_id: JobId) {
        let now = self.deps.clock.now();
        match self.queue.extend_lease(job_id, &self.config.worker_id, now).await {
            Ok(()) => debug!(job_id = %job_id, "job lease renewed"),
            Err(e) => warn!(job_id = %job_id, error = %e, "failed to renew job lease"),
        }
    }

    async fn persist_failure(&self, job: &Job, error: &JobError) {
        if let Err(e) = self
            .queue
            .mark_failed(job.id, &error.to_string(), error.partial())
            .await
        {
            error!(job_id = %job.id, error = %e, "failed to mark job as failed");
        }
    }

    /// Enqueues the next continuous review job when the finished one says
    /// more eligible candidates remain.
    async fn chain_continuous(&self, job: &Job, result: &JobResult) {
        let (JobPayload::ReviewEnrichment(payload), Some(review)) =
            (&job.payload, result.as_review_enrichment())
        else {
            return;
        };
        if !payload.continuous || !review.should_continue {
            return;
        }

        let next = JobPayload::ReviewEnrichment(ReviewEnrichmentPayload::continuous(payload.batch_size));
        match self.deps.jobs.create_job(next, None).await {
            Ok(next_job) => {
                info!(job_id = %job.id, next_job_id = %next_job.id, "chained continuous review enrichment")
            }
            Err(e) => error!(job_id = %job.id, error = %e, "failed to chain continuous review enrichment"),
        }
    }
}
