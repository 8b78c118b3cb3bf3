use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReviewsApiError>;

#[derive(Debug, Error)]
pub enum ReviewsApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("task {task_id} failed ({status_code}): {message}")]
    TaskFailed {
        task_id: String,
        status_code: u32,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}
