//! Typed ids for the entities the worker touches.

pub use super::id::Id;

/// Marker for background job rows.
pub struct Job;

/// Marker for contractors (business profiles and review candidates).
pub struct Contractor;

/// Marker for taxonomy categories.
pub struct Category;

/// Marker for stored reviews.
pub struct Review;

pub type JobId = Id<Job>;
pub type ContractorId = Id<Contractor>;
pub type CategoryId = Id<Category>;
pub type ReviewId = Id<Review>;
