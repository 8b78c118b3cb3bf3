pub mod executor;
pub mod models;
pub mod retry;

pub use executor::ImageRetryExecutor;
pub use retry::{decide_after_rate_limit, download_or_defer, initial_retry, RetryDecision};
