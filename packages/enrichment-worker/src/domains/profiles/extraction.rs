//! AI extraction of structured profile data from crawled website content.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::models::{Category, EnrichmentCandidate};
use crate::common::CategoryId;
use crate::kernel::BaseAI;

/// Crawled content beyond this many characters is not sent to the model.
const MAX_PROMPT_CONTENT_CHARS: usize = 40_000;

const SYSTEM_PROMPT: &str = "You extract factual business profile data for home-service \
contractors from their website content. Only report what the content states. Leave a field \
null or empty when the content does not say. Pick category slugs only from the provided list.";

/// Structured profile as returned by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedProfile {
    /// Two or three sentence summary of what the business does.
    pub description: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// Services offered, short phrases.
    #[serde(default)]
    pub services: Vec<String>,
    /// Cities, counties or regions served.
    #[serde(default)]
    pub service_areas: Vec<String>,
    pub year_established: Option<i32>,
    pub license_number: Option<String>,
    /// Slugs from the provided category list that fit the business.
    #[serde(default)]
    pub category_slugs: Vec<String>,
}

/// Result of one extraction. Failure is data, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    pub success: bool,
    pub result: Option<ExtractedProfile>,
    pub tokens_used: u32,
    pub cost_usd: f64,
    pub error: Option<String>,
}

impl ExtractionOutcome {
    fn failure(error: String, tokens_used: u32, cost_usd: f64) -> Self {
        Self {
            success: false,
            result: None,
            tokens_used,
            cost_usd,
            error: Some(error),
        }
    }
}

/// Runs profile extraction against one taxonomy, shared by every item in a
/// job.
pub struct ProfileExtractor<'a> {
    ai: &'a dyn BaseAI,
    taxonomy: &'a [Category],
    schema: serde_json::Value,
}

impl<'a> ProfileExtractor<'a> {
    pub fn new(ai: &'a dyn BaseAI, taxonomy: &'a [Category]) -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(ExtractedProfile))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
        Self { ai, taxonomy, schema }
    }

    pub fn taxonomy(&self) -> &'a [Category] {
        self.taxonomy
    }

    fn user_prompt(&self, candidate: &EnrichmentCandidate, website: &str, content: &str) -> String {
        let categories = self
            .taxonomy
            .iter()
            .map(|c| format!("- {}: {}", c.slug, c.name))
            .collect::<Vec<_>>()
            .join("\n");
        let mut cut = content.len().min(MAX_PROMPT_CONTENT_CHARS);
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }

        format!(
            "Company: {}\nWebsite: {}\nKnown location: {}, {}\n\nCategories:\n{}\n\nWebsite content:\n{}",
            candidate.company_name,
            website,
            candidate.city.as_deref().unwrap_or("unknown"),
            candidate.state.as_deref().unwrap_or("unknown"),
            categories,
            &content[..cut],
        )
    }

    pub async fn extract(&self, candidate: &EnrichmentCandidate, website: &str, content: &str) -> ExtractionOutcome {
        let prompt = self.user_prompt(candidate, website, content);
        let completion = match self
            .ai
            .generate_structured(SYSTEM_PROMPT, &prompt, self.schema.clone())
            .await
        {
            Ok(c) => c,
            Err(e) => return ExtractionOutcome::failure(format!("AI request failed: {:#}", e), 0, 0.0),
        };

        let tokens = completion.usage.total_tokens;
        match serde_json::from_str::<ExtractedProfile>(&completion.content) {
            Ok(profile) => ExtractionOutcome {
                success: true,
                result: Some(profile),
                tokens_used: tokens,
                cost_usd: completion.cost_usd,
                error: None,
            },
            Err(e) => ExtractionOutcome::failure(
                format!("AI response did not match schema: {}", e),
                tokens,
                completion.cost_usd,
            ),
        }
    }

    /// Taxonomy entries for the extracted slugs, ignoring unknown ones.
    pub fn resolve_categories(&self, slugs: &[String]) -> Vec<&'a Category> {
        let mut matched: Vec<&'a Category> = Vec::new();
        for slug in slugs {
            let slug = slug.trim().to_lowercase();
            if let Some(category) = self.taxonomy.iter().find(|c| c.slug == slug) {
                if !matched.iter().any(|m| m.id == category.id) {
                    matched.push(category);
                }
            }
        }
        matched
    }
}

/// The fallback category: `general-contractor` when present, otherwise the
/// first taxonomy entry.
pub fn default_category(taxonomy: &[Category]) -> Option<&Category> {
    taxonomy
        .iter()
        .find(|c| c.slug == DEFAULT_CATEGORY_SLUG)
        .or_else(|| taxonomy.first())
}

pub const DEFAULT_CATEGORY_SLUG: &str = "general-contractor";

pub fn category_ids(categories: &[&Category]) -> Vec<CategoryId> {
    categories.iter().map(|c| c.id).collect()
}
