//! Executor registry.
//!
//! Maps each `JobType` to the executor that runs it. The registry is built
//! once at startup and handed to the `JobRunner`; there is no global
//! instance.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use super::error::JobError;
use super::executor::{DynJobExecutor, JobContext, JobExecutor};
use super::job::{Job, JobResult, JobType};

pub type SharedJobRegistry = Arc<JobExecutorRegistry>;

#[derive(Default)]
pub struct JobExecutorRegistry {
    executors: HashMap<JobType, Arc<dyn DynJobExecutor>>,
}

impl JobExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Registers `executor` for the job type of its payload. A second
    /// registration for the same type replaces the first.
    pub fn register<E: JobExecutor>(&mut self, executor: E) -> &mut Self {
        let executor: Arc<dyn DynJobExecutor> = Arc::new(executor);
        let job_type = executor.job_type();
        if let Some(previous) = self.executors.insert(job_type, executor) {
            warn!(
                job_type = %job_type,
                replaced = previous.name(),
                "executor registered twice, keeping the latest"
            );
        }
        self
    }

    /// Looks up the executor for `job_type`. Asking for a type nobody
    /// registered is a configuration error.
    pub fn get(&self, job_type: JobType) -> Result<Arc<dyn DynJobExecutor>, JobError> {
        self.executors
            .get(&job_type)
            .cloned()
            .ok_or(JobError::UnregisteredJobType(job_type))
    }

    pub fn has(&self, job_type: JobType) -> bool {
        self.executors.contains_key(&job_type)
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.executors.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Resolves and runs the executor for `job`.
    pub async fn execute(&self, job: &Job, ctx: &JobContext) -> Result<JobResult, JobError> {
        let executor = self.get(job.job_type())?;
        executor.execute_payload(job.payload.clone(), ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    use crate::common::ContractorId;
    use crate::domains::images::models::{ImageRetryResult, RateLimitedImageBatch};
    use crate::domains::profiles::models::ProfileEnrichmentPayload;
    use crate::kernel::jobs::JobPayload;
    use crate::kernel::test_dependencies::TestDependencies;

    struct CountingImageExecutor;

    #[async_trait]
    impl JobExecutor for CountingImageExecutor {
        type Payload = RateLimitedImageBatch;
        type Output = ImageRetryResult;

        fn name(&self) -> &'static str {
            "counting_image"
        }

        async fn execute(&self, batch: RateLimitedImageBatch, _ctx: &JobContext) -> Result<ImageRetryResult, JobError> {
            Ok(ImageRetryResult::completed(batch.contractor_id, batch.images.len(), batch.images.len(), 0))
        }
    }

    fn image_job() -> Job {
        let batch = RateLimitedImageBatch {
            contractor_id: ContractorId::new(),
            images: vec![],
            attempt_number: 1,
        };
        Job::pending(JobPayload::ImageRetry(batch), Utc::now(), Utc::now())
    }

    #[test]
    fn registers_under_payload_job_type() {
        let mut registry = JobExecutorRegistry::new();
        registry.register(CountingImageExecutor);

        assert!(registry.has(JobType::ImageRetry));
        assert!(!registry.has(JobType::ReviewEnrichment));
        assert_eq!(registry.registered_types(), vec![JobType::ImageRetry]);
    }

    #[test]
    fn get_unregistered_type_fails() {
        let registry = JobExecutorRegistry::new();
        let err = registry.get(JobType::ProfileEnrichment).err().unwrap();
        assert!(matches!(err, JobError::UnregisteredJobType(JobType::ProfileEnrichment)));
    }

    #[tokio::test]
    async fn execute_dispatches_to_registered_executor() {
        let test = TestDependencies::new();
        let mut registry = JobExecutorRegistry::new();
        registry.register(CountingImageExecutor);

        let job = image_job();
        let result = registry.execute(&job, &test.context(job.id)).await.unwrap();
        assert_eq!(result.job_type(), JobType::ImageRetry);
    }

    #[tokio::test]
    async fn mismatched_payload_never_reaches_executor() {
        let test = TestDependencies::new();
        let executor: Arc<dyn DynJobExecutor> = Arc::new(CountingImageExecutor);
        let payload = JobPayload::ProfileEnrichment(ProfileEnrichmentPayload {
            contractor_ids: vec![ContractorId::new()],
        });

        let err = executor
            .execute_payload(payload, &test.context(crate::common::JobId::new()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobError::PayloadMismatch {
                expected: JobType::ImageRetry,
                actual: JobType::ProfileEnrichment
            }
        ));
    }
}
