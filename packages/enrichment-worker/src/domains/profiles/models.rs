use serde::{Deserialize, Serialize};

use crate::common::{CategoryId, ContractorId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEnrichmentPayload {
    pub contractor_ids: Vec<ContractorId>,
}

/// A business profile to enrich, loaded fresh for every job.
#[derive(Debug, Clone)]
pub struct EnrichmentCandidate {
    pub id: ContractorId,
    pub company_name: String,
    pub website: Option<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl EnrichmentCandidate {
    /// The website, if it is set to something non-blank.
    pub fn website_url(&self) -> Option<&str> {
        self.website
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
    }
}

/// Taxonomy entry a contractor can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileEnrichmentStatus {
    Enriched,
    NotApplicable,
    BotBlocked,
    Failed,
}

impl ProfileEnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileEnrichmentStatus::Enriched => "enriched",
            ProfileEnrichmentStatus::NotApplicable => "not_applicable",
            ProfileEnrichmentStatus::BotBlocked => "bot_blocked",
            ProfileEnrichmentStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileItemStatus {
    Success,
    NotApplicable,
    BotBlocked,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileItemResult {
    pub contractor_id: ContractorId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub status: ProfileItemStatus,
    pub pages_crawled: u32,
    pub tokens_used: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProfileItemResult {
    pub fn new(contractor_id: ContractorId, status: ProfileItemStatus) -> Self {
        Self {
            contractor_id,
            company_name: None,
            status,
            pages_crawled: 0,
            tokens_used: 0,
            categories: Vec::new(),
            error: None,
        }
    }

    pub fn company(mut self, name: &str) -> Self {
        self.company_name = Some(name.to_string());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileEnrichmentResult {
    pub processed: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bot_blocked: usize,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub results: Vec<ProfileItemResult>,
}

impl ProfileEnrichmentResult {
    /// Adds an item and bumps the matching counter.
    pub fn record(&mut self, item: ProfileItemResult) {
        self.processed += 1;
        match item.status {
            ProfileItemStatus::Success => self.successful += 1,
            ProfileItemStatus::NotApplicable | ProfileItemStatus::Skipped => self.skipped += 1,
            ProfileItemStatus::BotBlocked => self.bot_blocked += 1,
            ProfileItemStatus::Failed => self.failed += 1,
        }
        self.total_tokens += u64::from(item.tokens_used);
        self.results.push(item);
    }
}
