//! Background enrichment worker.
//!
//! A job queue drained by [`kernel::jobs::JobRunner`], which dispatches each
//! job to the executor registered for its type:
//!
//! - profile enrichment: crawl contractor websites, extract profiles with AI
//! - review enrichment: fetch reviews from a task-based third-party API
//! - image retry: resume reviewer photo downloads after rate limiting

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::Config;
