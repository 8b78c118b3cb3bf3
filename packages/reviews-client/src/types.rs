use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status code the API uses for a fully successful call.
pub const STATUS_OK: u32 = 20000;
/// Status code returned for a task that was accepted and queued.
pub const STATUS_TASK_CREATED: u32 = 20100;
/// Status codes for tasks that are accepted but not finished yet.
pub const STATUS_TASK_IN_QUEUE: u32 = 40601;
pub const STATUS_TASK_HANDED: u32 = 40602;

/// One reviews task submission.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewTaskRequest {
    pub place_id: String,
    /// "lat,lng" pair, as the API expects it.
    pub location_coordinate: String,
    pub depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    /// Echoed back on every task so callers can correlate results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ReviewTaskRequest {
    pub fn new(place_id: impl Into<String>, latitude: f64, longitude: f64, depth: u32) -> Self {
        Self {
            place_id: place_id.into(),
            location_coordinate: format!("{},{}", latitude, longitude),
            depth,
            sort_by: Some("newest".to_string()),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Envelope wrapping every API response.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct ApiResponse<T> {
    pub status_code: u32,
    pub status_message: String,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub tasks: Vec<Task<T>>,
}

/// Per-task section of a response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct Task<T> {
    pub id: String,
    pub status_code: u32,
    pub status_message: String,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub data: Option<TaskData>,
    #[serde(default)]
    pub result: Option<Vec<T>>,
}

impl<T> Task<T> {
    pub fn is_ok(&self) -> bool {
        self.status_code == STATUS_OK || self.status_code == STATUS_TASK_CREATED
    }

    pub fn is_pending(&self) -> bool {
        self.status_code == STATUS_TASK_IN_QUEUE || self.status_code == STATUS_TASK_HANDED
    }

    pub fn tag(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.tag.as_deref())
    }
}

/// Echo of the request parameters attached to a task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskData {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub place_id: Option<String>,
}

/// Result of submitting one task.
#[derive(Debug, Clone)]
pub struct SubmittedTask {
    pub task_id: String,
    pub tag: Option<String>,
    pub accepted: bool,
    pub status_message: String,
    pub cost: f64,
}

/// Entry returned by the tasks_ready endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyTask {
    pub id: String,
    #[serde(default)]
    pub tag: Option<String>,
}

/// Result payload of a completed reviews task.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewsResult {
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub rating: Option<Rating>,
    #[serde(default)]
    pub reviews_count: Option<u32>,
    #[serde(default)]
    pub items: Vec<ReviewItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rating {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub votes_count: Option<u32>,
}

/// One review as delivered by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewItem {
    pub review_id: String,
    #[serde(default)]
    pub rating: Option<Rating>,
    #[serde(default)]
    pub review_text: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub review_url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner_answer: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<ReviewImage>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewImage {
    pub image_url: String,
    #[serde(default)]
    pub alt: Option<String>,
}

/// A completed task's reviews plus what the task cost.
#[derive(Debug, Clone)]
pub struct TaskReviews {
    pub task_id: String,
    pub tag: Option<String>,
    pub cost: f64,
    pub results: Vec<ReviewsResult>,
}
