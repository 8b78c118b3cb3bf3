//! Rate-limit retry chain for reviewer photos.
//!
//! A chain starts when a download hits a rate limit during review
//! enrichment: the remaining images go into an attempt 1 retry job. Each
//! retry job that is throttled again either hands the new remainder to the
//! next attempt or, once the backoff schedule is exhausted, gives up.

use chrono::{DateTime, Utc};
use serde_json::json;

use super::models::{ImagePhaseSummary, RateLimitedImageBatch, ReviewImageRef};
use crate::common::ContractorId;
use crate::domains::reviews::models::StoredReview;
use crate::kernel::jobs::{EventSeverity, JobContext, JobService, MAX_RETRY_ATTEMPTS};
use crate::kernel::DownloadError;

/// What to do with images left over after a rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Requeue {
        next_attempt: u32,
        scheduled_for: DateTime<Utc>,
    },
    Abandon {
        attempts_made: u32,
    },
}

/// Decision for a retry job running `current_attempt` that was throttled
/// again. The next attempt waits the delay of the current one.
pub fn decide_after_rate_limit(current_attempt: u32, now: DateTime<Utc>) -> RetryDecision {
    let next_attempt = current_attempt.saturating_add(1);
    if next_attempt > MAX_RETRY_ATTEMPTS {
        return RetryDecision::Abandon {
            attempts_made: current_attempt,
        };
    }
    match JobService::calculate_retry_time(current_attempt, now) {
        Some(scheduled_for) => RetryDecision::Requeue {
            next_attempt,
            scheduled_for,
        },
        None => RetryDecision::Abandon {
            attempts_made: current_attempt,
        },
    }
}

/// First link of a chain, started from a non-retry download.
pub fn initial_retry(now: DateTime<Utc>) -> RetryDecision {
    match JobService::calculate_retry_time(1, now) {
        Some(scheduled_for) => RetryDecision::Requeue {
            next_attempt: 1,
            scheduled_for,
        },
        None => RetryDecision::Abandon { attempts_made: 0 },
    }
}

/// Image URLs of freshly inserted reviews, as download references.
pub fn image_refs(reviews: &[StoredReview]) -> Vec<ReviewImageRef> {
    reviews
        .iter()
        .flat_map(|review| {
            review.image_urls.iter().map(move |url| ReviewImageRef {
                review_id: review.id,
                original_url: url.clone(),
            })
        })
        .collect()
}

/// Downloads `images` for one contractor inside a review enrichment run.
///
/// Never fails: a rate limit defers the remainder to an attempt 1 retry job
/// and any other problem is reported in the summary. The caller's review
/// outcome is unaffected either way.
pub async fn download_or_defer(
    ctx: &JobContext,
    contractor_id: ContractorId,
    images: Vec<ReviewImageRef>,
) -> ImagePhaseSummary {
    let mut summary = ImagePhaseSummary {
        attempted: images.len(),
        ..Default::default()
    };
    if images.is_empty() {
        return summary;
    }

    let deps = ctx.deps();
    match deps.image_downloader.download_photos(contractor_id, &images).await {
        Ok(report) => {
            summary.downloaded = report.downloaded.len();
            summary.failed = report.failed.len();
            if let Err(e) = deps.reviews.record_stored_images(&report.downloaded).await {
                summary.error = Some(format!("failed to record stored images: {:#}", e));
            }
        }
        Err(DownloadError::RateLimited {
            remaining,
            downloaded,
            failed,
        }) => {
            summary.downloaded = downloaded.len();
            summary.failed = failed.len();
            summary.deferred = remaining.len();
            if let Err(e) = deps.reviews.record_stored_images(&downloaded).await {
                summary.error = Some(format!("failed to record stored images: {:#}", e));
            }

            let RetryDecision::Requeue {
                next_attempt,
                scheduled_for,
            } = initial_retry(deps.clock.now())
            else {
                return summary;
            };

            let batch = RateLimitedImageBatch {
                contractor_id,
                images: remaining,
                attempt_number: next_attempt,
            };
            match deps.jobs.schedule_image_retry(batch, scheduled_for).await {
                Ok(job) => {
                    summary.retry_job_id = Some(job.id);
                    ctx.log_event(
                        "image_download_rate_limited",
                        format!("{} images deferred to retry attempt {}", summary.deferred, next_attempt),
                        json!({
                            "contractor_id": contractor_id,
                            "downloaded": summary.downloaded,
                            "deferred": summary.deferred,
                            "retry_job_id": job.id,
                            "scheduled_for": scheduled_for,
                        }),
                        EventSeverity::Warning,
                    )
                    .await;
                }
                Err(e) => {
                    summary.error = Some(format!("failed to schedule image retry: {:#}", e));
                }
            }
        }
        Err(DownloadError::Other(e)) => {
            summary.failed = images.len();
            summary.error = Some(format!("{:#}", e));
        }
    }

    summary
}
