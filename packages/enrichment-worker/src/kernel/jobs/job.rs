//! Job model: type tag, status, typed payload and typed result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use typed_builder::TypedBuilder;

use super::error::JobError;
use crate::common::JobId;
use crate::domains::images::models::{ImageRetryResult, RateLimitedImageBatch};
use crate::domains::profiles::models::{ProfileEnrichmentPayload, ProfileEnrichmentResult};
use crate::domains::reviews::models::{ReviewEnrichmentPayload, ReviewEnrichmentResult};

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ProfileEnrichment,
    ReviewEnrichment,
    ImageRetry,
}

impl JobType {
    pub const ALL: [JobType; 3] = [
        JobType::ProfileEnrichment,
        JobType::ReviewEnrichment,
        JobType::ImageRetry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ProfileEnrichment => "profile_enrichment",
            JobType::ReviewEnrichment => "review_enrichment",
            JobType::ImageRetry => "image_retry",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| JobError::InvalidPayload {
                job_type: s.to_string(),
                message: "unknown job type".to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

// ============================================================================
// Payload and result
// ============================================================================

/// Payload of a job. The variant is the job type, so a row can never carry a
/// payload that disagrees with its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job_type", content = "payload", rename_all = "snake_case")]
pub enum JobPayload {
    ProfileEnrichment(ProfileEnrichmentPayload),
    ReviewEnrichment(ReviewEnrichmentPayload),
    ImageRetry(RateLimitedImageBatch),
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::ProfileEnrichment(_) => JobType::ProfileEnrichment,
            JobPayload::ReviewEnrichment(_) => JobType::ReviewEnrichment,
            JobPayload::ImageRetry(_) => JobType::ImageRetry,
        }
    }

    /// Rebuilds a payload from the separate type and payload columns of a row.
    pub fn from_parts(job_type: &str, payload: serde_json::Value) -> Result<Self, JobError> {
        let job_type: JobType = job_type.parse()?;
        serde_json::from_value(serde_json::json!({
            "job_type": job_type.as_str(),
            "payload": payload,
        }))
        .map_err(|e| JobError::InvalidPayload {
            job_type: job_type.to_string(),
            message: e.to_string(),
        })
    }

    /// The payload body without the type tag.
    pub fn body(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            JobPayload::ProfileEnrichment(p) => serde_json::to_value(p),
            JobPayload::ReviewEnrichment(p) => serde_json::to_value(p),
            JobPayload::ImageRetry(p) => serde_json::to_value(p),
        }
    }
}

/// A payload type that belongs to exactly one job type.
pub trait JobPayloadKind: Sized + Send + 'static {
    const JOB_TYPE: JobType;

    /// Takes the typed payload out of a `JobPayload`, handing the payload
    /// back untouched when it belongs to another job type.
    fn extract(payload: JobPayload) -> Result<Self, JobPayload>;
}

impl JobPayloadKind for ProfileEnrichmentPayload {
    const JOB_TYPE: JobType = JobType::ProfileEnrichment;

    fn extract(payload: JobPayload) -> Result<Self, JobPayload> {
        match payload {
            JobPayload::ProfileEnrichment(p) => Ok(p),
            other => Err(other),
        }
    }
}

impl JobPayloadKind for ReviewEnrichmentPayload {
    const JOB_TYPE: JobType = JobType::ReviewEnrichment;

    fn extract(payload: JobPayload) -> Result<Self, JobPayload> {
        match payload {
            JobPayload::ReviewEnrichment(p) => Ok(p),
            other => Err(other),
        }
    }
}

impl JobPayloadKind for RateLimitedImageBatch {
    const JOB_TYPE: JobType = JobType::ImageRetry;

    fn extract(payload: JobPayload) -> Result<Self, JobPayload> {
        match payload {
            JobPayload::ImageRetry(p) => Ok(p),
            other => Err(other),
        }
    }
}

/// Outcome of one `execute` call, persisted by the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job_type", content = "result", rename_all = "snake_case")]
pub enum JobResult {
    ProfileEnrichment(ProfileEnrichmentResult),
    ReviewEnrichment(ReviewEnrichmentResult),
    ImageRetry(ImageRetryResult),
}

impl JobResult {
    pub fn job_type(&self) -> JobType {
        match self {
            JobResult::ProfileEnrichment(_) => JobType::ProfileEnrichment,
            JobResult::ReviewEnrichment(_) => JobType::ReviewEnrichment,
            JobResult::ImageRetry(_) => JobType::ImageRetry,
        }
    }

    pub fn as_review_enrichment(&self) -> Option<&ReviewEnrichmentResult> {
        match self {
            JobResult::ReviewEnrichment(r) => Some(r),
            _ => None,
        }
    }
}

impl From<ProfileEnrichmentResult> for JobResult {
    fn from(result: ProfileEnrichmentResult) -> Self {
        JobResult::ProfileEnrichment(result)
    }
}

impl From<ReviewEnrichmentResult> for JobResult {
    fn from(result: ReviewEnrichmentResult) -> Self {
        JobResult::ReviewEnrichment(result)
    }
}

impl From<ImageRetryResult> for JobResult {
    fn from(result: ImageRetryResult) -> Self {
        JobResult::ImageRetry(result)
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = JobId::new())]
    pub id: JobId,

    pub payload: JobPayload,

    #[builder(default)]
    pub status: JobStatus,

    pub scheduled_for: DateTime<Utc>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,

    /// Number of times the job has been claimed.
    #[builder(default = 0)]
    pub attempts: i32,

    #[builder(default, setter(strip_option))]
    pub result: Option<JobResult>,

    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,

    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,

    /// While processing, the claim is only valid until this instant. A run
    /// whose worker stops renewing it becomes claimable again.
    #[builder(default, setter(strip_option))]
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A pending job scheduled at `scheduled_for`.
    pub fn pending(payload: JobPayload, scheduled_for: DateTime<Utc>, created_at: DateTime<Utc>) -> Self {
        Job::builder()
            .payload(payload)
            .scheduled_for(scheduled_for)
            .created_at(created_at)
            .build()
    }

    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_for <= now
    }

    /// Processing, but its worker let the lease run out.
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing && self.lease_expires_at.is_some_and(|until| until < now)
    }

    /// Ready to run, or abandoned by a worker that went away.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.is_ready(now) || self.lease_expired(now)
    }
}
