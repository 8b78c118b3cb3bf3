//! Pure REST client for a task-based business reviews API.
//!
//! Reviews are fetched asynchronously: tasks are posted in a batch, the
//! caller polls the ready list, then fetches each finished task.
//!
//! # Example
//!
//! ```rust,ignore
//! use reviews_client::{ReviewsClient, ReviewTaskRequest};
//!
//! let client = ReviewsClient::new("https://api.example.com", "login", "password")?;
//! let submitted = client
//!     .submit_tasks(&[ReviewTaskRequest::new("ChIJ...", 44.97, -93.26, 50).with_tag("c-1")])
//!     .await?;
//! let ready = client.tasks_ready().await?;
//! for task in ready {
//!     let reviews = client.task_get(&task.id).await?;
//! }
//! ```

pub mod error;
pub mod types;

pub use error::{Result, ReviewsApiError};
pub use types::{
    ReadyTask, Rating, ReviewImage, ReviewItem, ReviewTaskRequest, ReviewsResult, SubmittedTask,
    TaskReviews,
};

use serde::de::DeserializeOwned;
use types::{ApiResponse, STATUS_OK};

const REVIEWS_PATH: &str = "v3/business_data/google/reviews";

pub struct ReviewsClient {
    client: reqwest::Client,
    base_url: String,
    login: String,
    password: String,
}

impl ReviewsClient {
    pub fn new(
        base_url: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ReviewsApiError::Config("base url is empty".into()));
        }
        let login = login.into();
        if login.is_empty() {
            return Err(ReviewsApiError::Config("login is empty".into()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            login,
            password: password.into(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, REVIEWS_PATH, endpoint)
    }

    async fn read_envelope<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<ApiResponse<T>> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ReviewsApiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let envelope: ApiResponse<T> = resp.json().await?;
        if envelope.status_code != STATUS_OK {
            return Err(ReviewsApiError::Api {
                status: status.as_u16(),
                message: format!("{} ({})", envelope.status_message, envelope.status_code),
            });
        }
        Ok(envelope)
    }

    /// Post a batch of review tasks in one call.
    ///
    /// Returns one entry per posted task in request order. A task the API
    /// refused comes back with `accepted = false` rather than as an error.
    pub async fn submit_tasks(&self, tasks: &[ReviewTaskRequest]) -> Result<Vec<SubmittedTask>> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let resp = self
            .client
            .post(self.url("task_post"))
            .basic_auth(&self.login, Some(&self.password))
            .json(tasks)
            .send()
            .await?;

        let envelope: ApiResponse<serde_json::Value> = Self::read_envelope(resp).await?;
        tracing::debug!(
            count = envelope.tasks.len(),
            cost = envelope.cost,
            "Reviews tasks posted"
        );

        Ok(envelope
            .tasks
            .into_iter()
            .map(|task| SubmittedTask {
                accepted: task.is_ok(),
                tag: task.tag().map(str::to_string),
                task_id: task.id,
                status_message: task.status_message,
                cost: task.cost,
            })
            .collect())
    }

    /// List the ids of tasks that have finished and can be fetched.
    pub async fn tasks_ready(&self) -> Result<Vec<ReadyTask>> {
        let resp = self
            .client
            .get(self.url("tasks_ready"))
            .basic_auth(&self.login, Some(&self.password))
            .send()
            .await?;

        let envelope: ApiResponse<ReadyTask> = Self::read_envelope(resp).await?;
        Ok(envelope
            .tasks
            .into_iter()
            .flat_map(|task| task.result.unwrap_or_default())
            .collect())
    }

    /// Fetch the reviews of a finished task.
    pub async fn task_get(&self, task_id: &str) -> Result<TaskReviews> {
        let resp = self
            .client
            .get(self.url(&format!("task_get/{}", task_id)))
            .basic_auth(&self.login, Some(&self.password))
            .send()
            .await?;

        let envelope: ApiResponse<ReviewsResult> = Self::read_envelope(resp).await?;
        let task = envelope
            .tasks
            .into_iter()
            .next()
            .ok_or_else(|| ReviewsApiError::TaskFailed {
                task_id: task_id.to_string(),
                status_code: 0,
                message: "response contained no task".into(),
            })?;

        if !task.is_ok() {
            return Err(ReviewsApiError::TaskFailed {
                task_id: task_id.to_string(),
                status_code: task.status_code,
                message: task.status_message,
            });
        }

        Ok(TaskReviews {
            tag: task.tag().map(str::to_string),
            task_id: task.id,
            cost: task.cost,
            results: task.result.unwrap_or_default(),
        })
    }
}
