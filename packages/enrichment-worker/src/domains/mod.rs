//! Enrichment pipelines, one directory per job type.

pub mod images;
pub mod profiles;
pub mod reviews;
