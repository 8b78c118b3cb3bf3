//! Image retry: resumes one rate-limited batch of reviewer photos.

use async_trait::async_trait;
use serde_json::json;

use super::models::{ImageRetryResult, RateLimitedImageBatch};
use super::retry::{decide_after_rate_limit, RetryDecision};
use crate::kernel::jobs::{EventSeverity, JobContext, JobError, JobExecutor, JobType, MAX_RETRY_ATTEMPTS};
use crate::kernel::DownloadError;

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageRetryExecutor;

impl ImageRetryExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobExecutor for ImageRetryExecutor {
    type Payload = RateLimitedImageBatch;
    type Output = ImageRetryResult;

    fn name(&self) -> &'static str {
        "image_retry"
    }

    async fn execute(&self, batch: RateLimitedImageBatch, ctx: &JobContext) -> Result<ImageRetryResult, JobError> {
        if !(1..=MAX_RETRY_ATTEMPTS).contains(&batch.attempt_number) {
            return Err(JobError::InvalidPayload {
                job_type: JobType::ImageRetry.to_string(),
                message: format!(
                    "attempt_number {} outside 1..={}",
                    batch.attempt_number, MAX_RETRY_ATTEMPTS
                ),
            });
        }

        let deps = ctx.deps();
        let contractor_id = batch.contractor_id;
        let total = batch.images.len();
        ctx.progress().set_total(total);

        if total == 0 {
            return Ok(ImageRetryResult::completed(contractor_id, 0, 0, 0));
        }

        match deps.image_downloader.download_photos(contractor_id, &batch.images).await {
            Ok(report) => {
                deps.reviews
                    .record_stored_images(&report.downloaded)
                    .await
                    .map_err(JobError::Persistence)?;

                for _ in &report.downloaded {
                    ctx.progress().item_done(false);
                }
                for _ in &report.failed {
                    ctx.progress().item_done(true);
                }

                let result =
                    ImageRetryResult::completed(contractor_id, total, report.downloaded.len(), report.failed.len());
                ctx.log_event(
                    "image_retry_completed",
                    format!("{} of {} images downloaded on attempt {}", result.downloaded, total, batch.attempt_number),
                    json!({
                        "contractor_id": contractor_id,
                        "attempt_number": batch.attempt_number,
                        "downloaded": result.downloaded,
                        "failed": result.failed,
                    }),
                    EventSeverity::Info,
                )
                .await;
                Ok(result)
            }
            Err(DownloadError::RateLimited {
                remaining,
                downloaded,
                failed,
            }) => {
                deps.reviews
                    .record_stored_images(&downloaded)
                    .await
                    .map_err(JobError::Persistence)?;
                for _ in &downloaded {
                    ctx.progress().item_done(false);
                }
                for _ in &failed {
                    ctx.progress().item_done(true);
                }

                let mut result = ImageRetryResult::completed(contractor_id, total, downloaded.len(), failed.len());
                result.remaining_images = Some(remaining.clone());

                match decide_after_rate_limit(batch.attempt_number, deps.clock.now()) {
                    RetryDecision::Requeue {
                        next_attempt,
                        scheduled_for,
                    } => {
                        let next = RateLimitedImageBatch {
                            contractor_id,
                            images: remaining,
                            attempt_number: next_attempt,
                        };
                        let deferred = next.images.len();
                        let job = match deps.jobs.schedule_image_retry(next, scheduled_for).await {
                            Ok(job) => job,
                            Err(e) => {
                                return Err(JobError::system_with_partial(
                                    format!("failed to schedule image retry: {:#}", e),
                                    result,
                                ))
                            }
                        };

                        result.requeued_for_retry = true;
                        result.next_attempt = Some(next_attempt);
                        result.retry_job_id = Some(job.id);
                        ctx.log_event(
                            "image_retry_requeued",
                            format!("rate limited again, {} images moved to attempt {}", deferred, next_attempt),
                            json!({
                                "contractor_id": contractor_id,
                                "attempt_number": batch.attempt_number,
                                "next_attempt": next_attempt,
                                "remaining": deferred,
                                "retry_job_id": job.id,
                                "scheduled_for": scheduled_for,
                            }),
                            EventSeverity::Warning,
                        )
                        .await;
                    }
                    RetryDecision::Abandon { attempts_made } => {
                        result.abandoned = true;
                        ctx.log_event(
                            "image_retry_abandoned",
                            format!(
                                "giving up after {} attempts, {} images keep their original url",
                                attempts_made,
                                result.remaining_images.as_ref().map_or(0, Vec::len)
                            ),
                            json!({
                                "contractor_id": contractor_id,
                                "attempts_made": attempts_made,
                                "remaining_images": result.remaining_images,
                            }),
                            EventSeverity::Error,
                        )
                        .await;
                    }
                }
                Ok(result)
            }
            Err(DownloadError::Other(e)) => {
                ctx.log_event(
                    "image_retry_failed",
                    format!("image download failed: {:#}", e),
                    json!({"contractor_id": contractor_id, "attempt_number": batch.attempt_number}),
                    EventSeverity::Error,
                )
                .await;
                Err(JobError::system(format!("image download failed: {:#}", e)))
            }
        }
    }
}
