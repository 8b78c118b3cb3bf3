//! Executor contract and the per-run context handed to executors.
//!
//! Every pipeline implements [`JobExecutor`] for exactly one payload type.
//! The registry stores executors behind [`DynJobExecutor`], which checks the
//! payload variant before the typed `execute` is ever called.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::error::JobError;
use super::events::EventSeverity;
use super::job::{JobPayload, JobPayloadKind, JobResult, JobType};
use super::progress::ProgressReporter;
use crate::common::JobId;
use crate::kernel::WorkerDeps;

#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    type Payload: JobPayloadKind;
    type Output: Into<JobResult> + Send;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Runs one job. Per-item failures belong in the output; only systemic
    /// failures and cancellation are returned as errors.
    async fn execute(&self, payload: Self::Payload, ctx: &JobContext) -> Result<Self::Output, JobError>;
}

/// Object-safe view of a [`JobExecutor`].
#[async_trait]
pub trait DynJobExecutor: Send + Sync {
    fn job_type(&self) -> JobType;

    fn name(&self) -> &'static str;

    async fn execute_payload(&self, payload: JobPayload, ctx: &JobContext) -> Result<JobResult, JobError>;
}

#[async_trait]
impl<E: JobExecutor> DynJobExecutor for E {
    fn job_type(&self) -> JobType {
        <E::Payload as JobPayloadKind>::JOB_TYPE
    }

    fn name(&self) -> &'static str {
        JobExecutor::name(self)
    }

    async fn execute_payload(&self, payload: JobPayload, ctx: &JobContext) -> Result<JobResult, JobError> {
        let expected = <E::Payload as JobPayloadKind>::JOB_TYPE;
        let typed = <E::Payload as JobPayloadKind>::extract(payload).map_err(|other| {
            JobError::PayloadMismatch {
                expected,
                actual: other.job_type(),
            }
        })?;
        self.execute(typed, ctx).await.map(Into::into)
    }
}

/// Everything an executor may touch while running one job.
#[derive(Clone)]
pub struct JobContext {
    job_id: JobId,
    deps: Arc<WorkerDeps>,
    progress: ProgressReporter,
    cancellation: CancellationToken,
}

impl JobContext {
    pub fn new(job_id: JobId, deps: Arc<WorkerDeps>) -> Self {
        Self {
            job_id,
            deps,
            progress: ProgressReporter::noop(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn deps(&self) -> &WorkerDeps {
        &self.deps
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Appends a job-scoped event. A failing event store is logged and
    /// otherwise ignored; it never fails the job.
    pub async fn log_event(
        &self,
        event: &str,
        message: impl AsRef<str>,
        data: serde_json::Value,
        severity: EventSeverity,
    ) {
        if let Err(e) = self
            .deps
            .events
            .log_event(self.job_id, event, message.as_ref(), data, severity)
            .await
        {
            warn!(job_id = %self.job_id, event, error = %e, "failed to record job event");
        }
    }
}
