use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::{ContractorId, ReviewId};
use crate::domains::images::models::ImagePhaseSummary;

/// Days a candidate rests after a successful enrichment.
pub const REVIEW_COOLDOWN_DAYS: i64 = 30;

/// Hours a candidate is left alone after a failed enrichment when
/// candidates are selected automatically.
pub const FAILED_RETRY_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReviewEnrichmentPayload {
    #[serde(default)]
    pub contractor_ids: Vec<ContractorId>,
    /// Chain another job while eligible candidates remain.
    #[serde(default)]
    pub continuous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

impl ReviewEnrichmentPayload {
    pub fn for_contractors(contractor_ids: Vec<ContractorId>) -> Self {
        Self {
            contractor_ids,
            continuous: false,
            batch_size: None,
        }
    }

    /// Self-selecting payload used to chain continuous runs.
    pub fn continuous(batch_size: Option<usize>) -> Self {
        Self {
            contractor_ids: Vec::new(),
            continuous: true,
            batch_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewEnrichmentCandidate {
    pub id: ContractorId,
    pub company_name: String,
    pub place_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub last_enriched_at: Option<DateTime<Utc>>,
    pub last_failed_at: Option<DateTime<Utc>>,
}

/// Why a candidate was not sent to the reviews API.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NotFound,
    MissingPlaceId,
    MissingCoordinates,
    CooldownActive { eligible_at: DateTime<Utc> },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => f.write_str("candidate not found"),
            SkipReason::MissingPlaceId => f.write_str("missing external place id"),
            SkipReason::MissingCoordinates => f.write_str("missing coordinates"),
            SkipReason::CooldownActive { eligible_at } => {
                write!(f, "enriched within the last {} days, eligible again at {}", REVIEW_COOLDOWN_DAYS, eligible_at)
            }
        }
    }
}

/// Candidate that passed validation, with its required fields unwrapped.
#[derive(Debug, Clone, PartialEq)]
pub struct EligibleCandidate {
    pub id: ContractorId,
    pub company_name: String,
    pub place_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl ReviewEnrichmentCandidate {
    /// Eligible when the place id and both coordinates are present and the
    /// last successful enrichment, if any, is at least the cooldown old.
    pub fn eligibility(&self, now: DateTime<Utc>) -> Result<EligibleCandidate, SkipReason> {
        let place_id = self
            .place_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(SkipReason::MissingPlaceId)?;
        let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) else {
            return Err(SkipReason::MissingCoordinates);
        };
        if let Some(last) = self.last_enriched_at {
            let eligible_at = last + Duration::days(REVIEW_COOLDOWN_DAYS);
            if eligible_at > now {
                return Err(SkipReason::CooldownActive { eligible_at });
            }
        }

        Ok(EligibleCandidate {
            id: self.id,
            company_name: self.company_name.clone(),
            place_id: place_id.to_string(),
            latitude,
            longitude,
        })
    }

    /// Eligible and not failed within the retry window; the rule automatic
    /// selection uses.
    pub fn is_selectable(&self, now: DateTime<Utc>) -> bool {
        let recently_failed = self
            .last_failed_at
            .is_some_and(|at| at + Duration::hours(FAILED_RETRY_HOURS) > now);
        !recently_failed && self.eligibility(now).is_ok()
    }
}

/// Enrichment status written back to the candidate as the pipeline moves.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewStatusUpdate {
    Pending,
    Completed {
        review_count: usize,
        enriched_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl ReviewStatusUpdate {
    pub fn status_str(&self) -> &'static str {
        match self {
            ReviewStatusUpdate::Pending => "pending",
            ReviewStatusUpdate::Completed { .. } => "completed",
            ReviewStatusUpdate::Failed { .. } => "failed",
        }
    }
}

/// Review ready to be upserted, keyed by its external id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub external_review_id: String,
    pub rating: Option<f64>,
    pub text: Option<String>,
    pub author_name: Option<String>,
    pub author_photo_url: Option<String>,
    pub review_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub owner_response: Option<String>,
    pub image_urls: Vec<String>,
}

/// A review row as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReview {
    pub id: ReviewId,
    pub contractor_id: ContractorId,
    pub external_review_id: String,
    pub image_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertOutcome {
    /// Rows written, inserted or updated.
    pub saved: usize,
    /// Rows that did not exist before this upsert.
    pub inserted: Vec<StoredReview>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewItemStatus {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItemResult {
    pub contractor_id: ContractorId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub status: ReviewItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub reviews_fetched: usize,
    pub reviews_saved: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<ImagePhaseSummary>,
}

impl ReviewItemResult {
    pub fn skipped(contractor_id: ContractorId, reason: &SkipReason) -> Self {
        Self {
            contractor_id,
            company_name: None,
            status: ReviewItemStatus::Skipped,
            reason: Some(reason.to_string()),
            reviews_fetched: 0,
            reviews_saved: 0,
            images: None,
        }
    }

    pub fn failed(contractor_id: ContractorId, company_name: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            contractor_id,
            company_name,
            status: ReviewItemStatus::Failed,
            reason: Some(reason.into()),
            reviews_fetched: 0,
            reviews_saved: 0,
            images: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewEnrichmentResult {
    pub processed: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_reviews_fetched: usize,
    pub total_reviews_saved: usize,
    pub api_cost: f64,
    pub results: Vec<ReviewItemResult>,
    pub should_continue: bool,
}

impl ReviewEnrichmentResult {
    pub fn record(&mut self, item: ReviewItemResult) {
        self.processed += 1;
        match item.status {
            ReviewItemStatus::Success => self.successful += 1,
            ReviewItemStatus::Skipped => self.skipped += 1,
            ReviewItemStatus::Failed => self.failed += 1,
        }
        self.total_reviews_fetched += item.reviews_fetched;
        self.total_reviews_saved += item.reviews_saved;
        self.results.push(item);
    }
}
