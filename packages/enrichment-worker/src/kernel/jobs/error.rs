use thiserror::Error;

use super::job::{JobResult, JobType};

/// Errors that end a job run.
///
/// Per-item problems never show up here; executors record them in their
/// result. Only configuration mistakes, bad payloads, systemic failures and
/// cancellation abort a job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("no executor registered for job type '{0}'")]
    UnregisteredJobType(JobType),

    #[error("executor for '{expected}' was handed a '{actual}' payload")]
    PayloadMismatch { expected: JobType, actual: JobType },

    #[error("invalid payload for job type '{job_type}': {message}")]
    InvalidPayload { job_type: String, message: String },

    /// Infrastructure failure. Carries whatever the executor had accumulated
    /// before it gave up.
    #[error("system failure: {message}")]
    SystemFailure {
        message: String,
        partial: Option<Box<JobResult>>,
    },

    #[error("job cancelled")]
    Cancelled,

    #[error("persistence error: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl JobError {
    pub fn system(message: impl Into<String>) -> Self {
        JobError::SystemFailure {
            message: message.into(),
            partial: None,
        }
    }

    pub fn system_with_partial(message: impl Into<String>, partial: impl Into<JobResult>) -> Self {
        JobError::SystemFailure {
            message: message.into(),
            partial: Some(Box::new(partial.into())),
        }
    }

    /// Partial result attached to a system failure, if any.
    pub fn partial(&self) -> Option<&JobResult> {
        match self {
            JobError::SystemFailure { partial, .. } => partial.as_deref(),
            _ => None,
        }
    }
}
