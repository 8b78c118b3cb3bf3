//! Background job kernel.
//!
//! - [`job`]: job rows, typed payloads and results
//! - [`executor`]: the executor contract and per-run context
//! - [`registry`]: job type to executor lookup
//! - [`service`]: job creation and backoff schedule
//! - [`queue`]: job persistence (Postgres and in-memory)
//! - [`events`]: job-scoped event log
//! - [`progress`]: monotonic progress reporting
//! - [`runner`]: the worker pool

pub mod error;
pub mod events;
pub mod executor;
pub mod job;
pub mod progress;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod service;

pub use error::JobError;
pub use events::{BaseEventLogger, EventSeverity, JobEvent, MemoryEventLogger, PostgresEventLogger, TracingEventLogger};
pub use executor::{DynJobExecutor, JobContext, JobExecutor};
pub use job::{Job, JobPayload, JobPayloadKind, JobResult, JobStatus, JobType};
pub use progress::{ProgressReporter, ProgressUpdate};
pub use queue::{default_lease_duration, JobQueue, MemoryJobQueue, PostgresJobQueue};
pub use registry::{JobExecutorRegistry, SharedJobRegistry};
pub use runner::{JobOutcome, JobRunner, JobRunnerConfig};
pub use service::{backoff_delay, JobService, BACKOFF_SCHEDULE_MINUTES, MAX_RETRY_ATTEMPTS};
