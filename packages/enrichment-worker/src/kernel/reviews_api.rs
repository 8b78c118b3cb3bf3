//! `BaseReviewsApi` backed by the `reviews-client` crate.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reviews_client::{ReviewTaskRequest, ReviewsClient};

use super::{BaseReviewsApi, ExternalReview, FetchedReviews, ReviewTaskSpec, SubmittedReviewTask};
use crate::common::ContractorId;

/// Reviews requested per place.
const DEFAULT_REVIEW_DEPTH: u32 = 50;

pub struct ReviewsApiAdapter {
    client: ReviewsClient,
    depth: u32,
}

impl ReviewsApiAdapter {
    pub fn new(client: ReviewsClient) -> Self {
        Self {
            client,
            depth: DEFAULT_REVIEW_DEPTH,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }
}

fn to_external(item: reviews_client::ReviewItem) -> ExternalReview {
    ExternalReview {
        external_review_id: item.review_id,
        rating: item.rating.and_then(|r| r.value),
        text: item.review_text,
        author_name: item.profile_name,
        author_photo_url: item.profile_image_url,
        review_url: item.review_url,
        published_at: item.timestamp,
        owner_response: item.owner_answer,
        image_urls: item
            .images
            .unwrap_or_default()
            .into_iter()
            .map(|i| i.image_url)
            .collect(),
    }
}

#[async_trait]
impl BaseReviewsApi for ReviewsApiAdapter {
    async fn submit_tasks(&self, tasks: &[ReviewTaskSpec]) -> Result<Vec<SubmittedReviewTask>> {
        let requests: Vec<ReviewTaskRequest> = tasks
            .iter()
            .map(|t| {
                ReviewTaskRequest::new(&t.place_id, t.latitude, t.longitude, self.depth)
                    .with_tag(t.contractor_id.to_string())
            })
            .collect();

        let submitted = self
            .client
            .submit_tasks(&requests)
            .await
            .context("Reviews task submission failed")?;

        // The API echoes our tag; fall back to request order if it does not.
        Ok(submitted
            .into_iter()
            .enumerate()
            .filter_map(|(index, task)| {
                let contractor_id = task
                    .tag
                    .as_deref()
                    .and_then(|tag| tag.parse::<ContractorId>().ok())
                    .or_else(|| tasks.get(index).map(|t| t.contractor_id))?;
                Some(SubmittedReviewTask {
                    contractor_id,
                    task_id: task.accepted.then(|| task.task_id.clone()),
                    error: (!task.accepted).then(|| task.status_message.clone()),
                    cost: task.cost,
                })
            })
            .collect())
    }

    async fn poll_ready(&self) -> Result<Vec<String>> {
        let ready = self
            .client
            .tasks_ready()
            .await
            .context("Polling reviews tasks failed")?;
        Ok(ready.into_iter().map(|t| t.id).collect())
    }

    async fn fetch_result(&self, task_id: &str) -> Result<FetchedReviews> {
        let task = self
            .client
            .task_get(task_id)
            .await
            .with_context(|| format!("Fetching reviews task {} failed", task_id))?;

        Ok(FetchedReviews {
            task_id: task.task_id,
            cost: task.cost,
            reviews: task
                .results
                .into_iter()
                .flat_map(|r| r.items)
                .map(to_external)
                .collect(),
        })
    }
}
