use serde::{Deserialize, Serialize};

use crate::common::{ContractorId, JobId, ReviewId};

/// A reviewer photo still pointing at its external URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewImageRef {
    pub review_id: ReviewId,
    pub original_url: String,
}

/// Images deferred by a rate limit, waiting for a retry job.
///
/// `attempt_number` starts at 1 for the first retry job and grows by one per
/// requeue, up to the end of the backoff schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitedImageBatch {
    pub contractor_id: ContractorId,
    pub images: Vec<ReviewImageRef>,
    pub attempt_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedImage {
    pub review_id: ReviewId,
    pub original_url: String,
    pub stored_url: String,
}

/// Outcome of a download run that was not cut short by a rate limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: Vec<DownloadedImage>,
    pub failed: Vec<ReviewImageRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRetryResult {
    pub contractor_id: ContractorId,
    pub total_images: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// Images still not downloaded after a renewed rate limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_images: Option<Vec<ReviewImageRef>>,
    pub requeued_for_retry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_job_id: Option<JobId>,
    /// True when the retry chain ended with images left behind.
    pub abandoned: bool,
}

impl ImageRetryResult {
    pub fn completed(contractor_id: ContractorId, total_images: usize, downloaded: usize, failed: usize) -> Self {
        Self {
            contractor_id,
            total_images,
            downloaded,
            failed,
            remaining_images: None,
            requeued_for_retry: false,
            next_attempt: None,
            retry_job_id: None,
            abandoned: false,
        }
    }
}

/// What happened to the images of one candidate during review enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImagePhaseSummary {
    pub attempted: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// Images handed to a retry job after a rate limit.
    pub deferred: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
