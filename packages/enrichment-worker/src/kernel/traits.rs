// Trait definitions for the external collaborators executors call into.
//
// These are INFRASTRUCTURE traits only. What to crawl, what to extract and
// how to react to outcomes lives in the domain executors.
//
// Naming convention: Base* for trait names (e.g., BaseAI, BaseCrawlerEngine)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::common::ContractorId;
use crate::domains::images::models::{DownloadReport, DownloadedImage, ReviewImageRef};

// =============================================================================
// Crawler
// =============================================================================

/// Result of crawling one website. A failed crawl of one site is an ordinary
/// outcome, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlOutcome {
    pub success: bool,
    pub content: String,
    pub pages_crawled: u32,
    pub blocked_by_bot_protection: bool,
    pub error: Option<String>,
}

impl CrawlOutcome {
    pub fn succeeded(content: impl Into<String>, pages_crawled: u32) -> Self {
        Self {
            success: true,
            content: content.into(),
            pages_crawled,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn bot_blocked(reason: impl Into<String>) -> Self {
        Self {
            blocked_by_bot_protection: true,
            error: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// The crawler itself is broken. Aborts the whole job.
#[derive(Debug, Clone, Error)]
pub enum CrawlerFault {
    #[error("crawler failed to start: {0}")]
    Launch(String),

    #[error("crawler session crashed: {0}")]
    Crashed(String),
}

#[async_trait]
pub trait BaseCrawlerEngine: Send + Sync {
    /// Opens a session owned exclusively by the caller.
    async fn launch(&self) -> Result<Box<dyn BaseCrawlSession>, CrawlerFault>;
}

#[async_trait]
pub trait BaseCrawlSession: Send {
    async fn crawl(&mut self, url: &str) -> Result<CrawlOutcome, CrawlerFault>;

    /// Releases the session. Called exactly once, on every exit path.
    async fn close(&mut self);
}

// =============================================================================
// AI
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Raw JSON answer from a structured completion plus what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredCompletion {
    pub content: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
}

#[async_trait]
pub trait BaseAI: Send + Sync {
    /// Generate output conforming to `schema`, returned as a JSON string.
    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: serde_json::Value,
    ) -> Result<StructuredCompletion>;
}

// =============================================================================
// Reviews API
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewTaskSpec {
    pub contractor_id: ContractorId,
    pub place_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedReviewTask {
    pub contractor_id: ContractorId,
    /// Set when the API accepted the task.
    pub task_id: Option<String>,
    pub error: Option<String>,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalReview {
    pub external_review_id: String,
    pub rating: Option<f64>,
    pub text: Option<String>,
    pub author_name: Option<String>,
    pub author_photo_url: Option<String>,
    pub review_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub owner_response: Option<String>,
    pub image_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedReviews {
    pub task_id: String,
    pub reviews: Vec<ExternalReview>,
    pub cost: f64,
}

#[async_trait]
pub trait BaseReviewsApi: Send + Sync {
    /// Submits all tasks in one call. Returns one entry per spec; refused
    /// tasks come back without a task id.
    async fn submit_tasks(&self, tasks: &[ReviewTaskSpec]) -> Result<Vec<SubmittedReviewTask>>;

    /// Ids of tasks that finished and can be fetched.
    async fn poll_ready(&self) -> Result<Vec<String>>;

    async fn fetch_result(&self, task_id: &str) -> Result<FetchedReviews>;
}

// =============================================================================
// Image downloader
// =============================================================================

#[derive(Debug, Error)]
pub enum DownloadError {
    /// The image host throttled us. Carries what is left to download along
    /// with what was settled before the throttle.
    #[error("rate limited with {} images remaining", remaining.len())]
    RateLimited {
        remaining: Vec<ReviewImageRef>,
        downloaded: Vec<DownloadedImage>,
        failed: Vec<ReviewImageRef>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait BaseImageDownloader: Send + Sync {
    async fn download_photos(
        &self,
        contractor_id: ContractorId,
        images: &[ReviewImageRef],
    ) -> Result<DownloadReport, DownloadError>;
}
