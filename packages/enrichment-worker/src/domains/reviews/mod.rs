pub mod executor;
pub mod models;
pub mod repository;
pub mod transform;

pub use executor::{ReviewEnrichmentConfig, ReviewEnrichmentExecutor};
pub use repository::{BaseReviewRepository, PostgresReviewRepository};
