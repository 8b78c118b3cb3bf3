use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domains::profiles::ProfileEnrichmentConfig;
use crate::domains::reviews::ReviewEnrichmentConfig;
use crate::kernel::jobs::JobRunnerConfig;

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub reviews_api_base_url: String,
    pub reviews_api_login: String,
    pub reviews_api_password: String,
    pub image_storage_dir: String,
    pub worker_concurrency: usize,
    pub worker_poll_interval_secs: u64,
    pub job_lease_secs: u64,
    pub review_poll_timeout_secs: u64,
    pub review_poll_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            reviews_api_base_url: env::var("REVIEWS_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.dataforseo.com".to_string()),
            reviews_api_login: env::var("REVIEWS_API_LOGIN").context("REVIEWS_API_LOGIN must be set")?,
            reviews_api_password: env::var("REVIEWS_API_PASSWORD")
                .context("REVIEWS_API_PASSWORD must be set")?,
            image_storage_dir: env::var("IMAGE_STORAGE_DIR")
                .unwrap_or_else(|_| "./data/review-images".to_string()),
            worker_concurrency: parse_or("WORKER_CONCURRENCY", 1)?,
            worker_poll_interval_secs: parse_or("WORKER_POLL_INTERVAL_SECS", 5)?,
            job_lease_secs: parse_or("JOB_LEASE_SECS", 600)?,
            review_poll_timeout_secs: parse_or("REVIEW_POLL_TIMEOUT_SECS", 300)?,
            review_poll_interval_secs: parse_or("REVIEW_POLL_INTERVAL_SECS", 10)?,
        })
    }

    pub fn runner_config(&self) -> JobRunnerConfig {
        JobRunnerConfig {
            max_concurrent_jobs: self.worker_concurrency.max(1),
            poll_interval: Duration::from_secs(self.worker_poll_interval_secs),
            heartbeat_interval: Duration::from_secs((self.job_lease_secs / 4).max(1)),
            ..Default::default()
        }
    }

    /// How long a claimed job stays claimed without a heartbeat.
    pub fn job_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.job_lease_secs.max(1)).unwrap_or(i64::MAX))
    }

    pub fn review_config(&self) -> ReviewEnrichmentConfig {
        ReviewEnrichmentConfig {
            poll_timeout: Duration::from_secs(self.review_poll_timeout_secs),
            poll_interval: Duration::from_secs(self.review_poll_interval_secs),
            ..Default::default()
        }
    }

    pub fn profile_config(&self) -> ProfileEnrichmentConfig {
        ProfileEnrichmentConfig::default()
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}
