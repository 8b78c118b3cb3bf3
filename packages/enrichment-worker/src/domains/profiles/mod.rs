pub mod executor;
pub mod extraction;
pub mod models;
pub mod repository;

pub use executor::{ProfileEnrichmentConfig, ProfileEnrichmentExecutor};
pub use repository::{BaseProfileRepository, PostgresProfileRepository};
