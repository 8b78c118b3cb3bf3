//! Dependency container handed to every executor.

use std::sync::Arc;

use typed_builder::TypedBuilder;

use super::jobs::{BaseEventLogger, JobService};
use super::{BaseAI, BaseCrawlerEngine, BaseImageDownloader, BaseReviewsApi, Clock};
use crate::domains::profiles::repository::BaseProfileRepository;
use crate::domains::reviews::repository::BaseReviewRepository;

#[derive(Clone, TypedBuilder)]
pub struct WorkerDeps {
    pub jobs: JobService,
    pub events: Arc<dyn BaseEventLogger>,
    pub crawler: Arc<dyn BaseCrawlerEngine>,
    pub ai: Arc<dyn BaseAI>,
    pub reviews_api: Arc<dyn BaseReviewsApi>,
    pub image_downloader: Arc<dyn BaseImageDownloader>,
    pub profiles: Arc<dyn BaseProfileRepository>,
    pub reviews: Arc<dyn BaseReviewRepository>,
    pub clock: Arc<dyn Clock>,
}
