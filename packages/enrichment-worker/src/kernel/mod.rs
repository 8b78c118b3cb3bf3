pub mod ai;
pub mod clock;
pub mod deps;
pub mod http_crawler;
pub mod image_downloader;
pub mod jobs;
pub mod reviews_api;
pub mod test_dependencies;
pub mod traits;

pub use ai::OpenAiClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use deps::WorkerDeps;
pub use http_crawler::HttpCrawlerEngine;
pub use image_downloader::HttpImageDownloader;
pub use reviews_api::ReviewsApiAdapter;
pub use traits::*;
