//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use enrichment_core::common::{ContractorId, ReviewId};
use enrichment_core::domains::images::models::{RateLimitedImageBatch, ReviewImageRef};
use enrichment_core::domains::profiles::models::EnrichmentCandidate;
use enrichment_core::domains::reviews::models::ReviewEnrichmentCandidate;
use enrichment_core::domains::reviews::ReviewEnrichmentConfig;

/// Review candidate with a place id and coordinates, never enriched.
pub fn review_candidate(company_name: &str, place_id: &str) -> ReviewEnrichmentCandidate {
    ReviewEnrichmentCandidate {
        id: ContractorId::new(),
        company_name: company_name.to_string(),
        place_id: Some(place_id.to_string()),
        latitude: Some(44.9778),
        longitude: Some(-93.2650),
        last_enriched_at: None,
        last_failed_at: None,
    }
}

pub fn enriched_at(mut candidate: ReviewEnrichmentCandidate, at: DateTime<Utc>) -> ReviewEnrichmentCandidate {
    candidate.last_enriched_at = Some(at);
    candidate
}

/// Polling config that gives up within a fraction of a second.
pub fn fast_review_config() -> ReviewEnrichmentConfig {
    ReviewEnrichmentConfig {
        poll_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

pub fn profile_candidate(company_name: &str, website: Option<&str>) -> EnrichmentCandidate {
    EnrichmentCandidate {
        id: ContractorId::new(),
        company_name: company_name.to_string(),
        website: website.map(str::to_string),
        description: None,
        city: Some("Minneapolis".to_string()),
        state: Some("MN".to_string()),
    }
}

pub fn image_refs(count: usize) -> Vec<ReviewImageRef> {
    let review_id = ReviewId::new();
    (1..=count)
        .map(|n| ReviewImageRef {
            review_id,
            original_url: format!("https://images.example.com/photo-{}.jpg", n),
        })
        .collect()
}

pub fn image_batch(images: usize, attempt_number: u32) -> RateLimitedImageBatch {
    RateLimitedImageBatch {
        contractor_id: ContractorId::new(),
        images: image_refs(images),
        attempt_number,
    }
}
