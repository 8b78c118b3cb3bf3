//! Business profile enrichment: crawl each contractor's website and extract
//! structured profile data with the AI service.
//!
//! Items are processed one after another through a single crawler session.
//! Per-item problems (no website, bot protection, crawl or extraction
//! failure) are recorded in the result. A `CrawlerFault` aborts the job; the
//! items finished so far travel with the error as a partial result. The
//! session is closed on every exit path, panics included.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::json;

use super::extraction::{category_ids, default_category, ProfileExtractor};
use super::models::{
    Category, EnrichmentCandidate, ProfileEnrichmentPayload, ProfileEnrichmentResult, ProfileEnrichmentStatus,
    ProfileItemResult, ProfileItemStatus,
};
use crate::common::ContractorId;
use crate::kernel::jobs::{EventSeverity, JobContext, JobError, JobExecutor};
use crate::kernel::{BaseCrawlSession, CrawlerFault};

#[derive(Debug, Clone)]
pub struct ProfileEnrichmentConfig {
    pub max_batch_size: usize,
}

impl Default for ProfileEnrichmentConfig {
    fn default() -> Self {
        Self { max_batch_size: 10 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileEnrichmentExecutor {
    config: ProfileEnrichmentConfig,
}

enum LoopExit {
    Finished,
    Cancelled,
}

impl ProfileEnrichmentExecutor {
    pub fn new(config: ProfileEnrichmentConfig) -> Self {
        Self { config }
    }

    async fn process_all(
        &self,
        ids: &[ContractorId],
        session: &mut dyn BaseCrawlSession,
        extractor: &ProfileExtractor<'_>,
        run: &mut ProfileEnrichmentResult,
        ctx: &JobContext,
    ) -> Result<LoopExit, CrawlerFault> {
        for &id in ids {
            if ctx.is_cancelled() {
                return Ok(LoopExit::Cancelled);
            }

            let item = self.process_one(id, session, extractor, run, ctx).await?;
            let failed = matches!(item.status, ProfileItemStatus::Failed | ProfileItemStatus::BotBlocked);
            run.record(item);
            ctx.progress().item_done(failed);
        }
        Ok(LoopExit::Finished)
    }

    async fn process_one(
        &self,
        id: ContractorId,
        session: &mut dyn BaseCrawlSession,
        extractor: &ProfileExtractor<'_>,
        run: &mut ProfileEnrichmentResult,
        ctx: &JobContext,
    ) -> Result<ProfileItemResult, CrawlerFault> {
        let profiles = &ctx.deps().profiles;

        let candidate = match profiles.find_candidate(id).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                return Ok(ProfileItemResult::new(id, ProfileItemStatus::Skipped).error("candidate not found"));
            }
            Err(e) => {
                return Ok(ProfileItemResult::new(id, ProfileItemStatus::Failed)
                    .error(format!("failed to load candidate: {:#}", e)));
            }
        };

        let Some(website) = candidate.website_url().map(str::to_string) else {
            self.set_status(ctx, id, ProfileEnrichmentStatus::NotApplicable, None).await;
            return Ok(ProfileItemResult::new(id, ProfileItemStatus::NotApplicable)
                .company(&candidate.company_name));
        };

        let crawl = session.crawl(&website).await?;
        let mut item = ProfileItemResult::new(id, ProfileItemStatus::Failed).company(&candidate.company_name);
        item.pages_crawled = crawl.pages_crawled;

        if crawl.blocked_by_bot_protection {
            let reason = crawl.error.unwrap_or_else(|| "bot protection".to_string());
            if let Err(e) = profiles.flag_for_elevated_scraping(id, &reason).await {
                item.status = ProfileItemStatus::Failed;
                return Ok(item.error(format!("failed to flag for elevated scraping: {:#}", e)));
            }
            self.set_status(ctx, id, ProfileEnrichmentStatus::BotBlocked, Some(&reason)).await;
            ctx.log_event(
                "profile_bot_blocked",
                format!("{} is behind bot protection", candidate.company_name),
                json!({"contractor_id": id, "website": website, "reason": reason}),
                EventSeverity::Warning,
            )
            .await;
            item.status = ProfileItemStatus::BotBlocked;
            return Ok(item.error(reason));
        }

        if !crawl.success {
            let error = crawl.error.unwrap_or_else(|| "crawl failed".to_string());
            self.set_status(ctx, id, ProfileEnrichmentStatus::Failed, Some(&error)).await;
            return Ok(item.error(error));
        }

        let extraction = extractor.extract(&candidate, &website, &crawl.content).await;
        item.tokens_used = extraction.tokens_used;
        run.total_cost_usd += extraction.cost_usd;

        match extraction.result {
            Some(profile) if extraction.success => {
                let mut categories = extractor.resolve_categories(&profile.category_slugs);
                if categories.is_empty() {
                    categories.extend(default_category_of(extractor));
                }

                let saved = async {
                    profiles.save_extracted_profile(id, &profile).await?;
                    profiles.assign_categories(id, &category_ids(&categories)).await
                }
                .await;
                if let Err(e) = saved {
                    let error = format!("failed to save profile: {:#}", e);
                    self.set_status(ctx, id, ProfileEnrichmentStatus::Failed, Some(&error)).await;
                    return Ok(item.error(error));
                }

                self.set_status(ctx, id, ProfileEnrichmentStatus::Enriched, None).await;
                item.status = ProfileItemStatus::Success;
                item.categories = categories.iter().map(|c| c.slug.clone()).collect();
                Ok(item)
            }
            _ => {
                let error = extraction
                    .error
                    .unwrap_or_else(|| "extraction returned no result".to_string());
                self.assign_default_category(ctx, &candidate, extractor, &mut item).await;
                self.set_status(ctx, id, ProfileEnrichmentStatus::Failed, Some(&error)).await;
                Ok(item.error(error))
            }
        }
    }

    async fn assign_default_category(
        &self,
        ctx: &JobContext,
        candidate: &EnrichmentCandidate,
        extractor: &ProfileExtractor<'_>,
        item: &mut ProfileItemResult,
    ) {
        let Some(category) = default_category_of(extractor) else {
            return;
        };
        match ctx
            .deps()
            .profiles
            .assign_categories(candidate.id, &[category.id])
            .await
        {
            Ok(()) => item.categories = vec![category.slug.clone()],
            Err(e) => {
                ctx.log_event(
                    "profile_default_category_failed",
                    format!("could not assign default category to {}", candidate.company_name),
                    json!({"contractor_id": candidate.id, "error": format!("{:#}", e)}),
                    EventSeverity::Warning,
                )
                .await
            }
        }
    }

    async fn set_status(
        &self,
        ctx: &JobContext,
        id: ContractorId,
        status: ProfileEnrichmentStatus,
        error: Option<&str>,
    ) {
        if let Err(e) = ctx.deps().profiles.set_enrichment_status(id, status, error).await {
            ctx.log_event(
                "profile_status_update_failed",
                "could not record profile enrichment status",
                json!({"contractor_id": id, "status": status, "error": format!("{:#}", e)}),
                EventSeverity::Warning,
            )
            .await;
        }
    }
}

fn default_category_of<'a>(extractor: &ProfileExtractor<'a>) -> Option<&'a Category> {
    default_category(extractor.taxonomy())
}

#[async_trait]
impl JobExecutor for ProfileEnrichmentExecutor {
    type Payload = ProfileEnrichmentPayload;
    type Output = ProfileEnrichmentResult;

    fn name(&self) -> &'static str {
        "profile_enrichment"
    }

    async fn execute(
        &self,
        payload: ProfileEnrichmentPayload,
        ctx: &JobContext,
    ) -> Result<ProfileEnrichmentResult, JobError> {
        let mut ids = payload.contractor_ids;
        let requested = ids.len();
        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(*id));
        if ids.len() < requested {
            ctx.log_event(
                "profile_duplicate_ids_dropped",
                format!("{} duplicate contractor ids dropped", requested - ids.len()),
                json!({"requested": requested, "unique": ids.len()}),
                EventSeverity::Warning,
            )
            .await;
        }

        if ids.len() > self.config.max_batch_size {
            ctx.log_event(
                "profile_batch_truncated",
                format!("batch of {} capped at {}", ids.len(), self.config.max_batch_size),
                json!({"requested": ids.len(), "dropped": &ids[self.config.max_batch_size..]}),
                EventSeverity::Warning,
            )
            .await;
            ids.truncate(self.config.max_batch_size);
        }
        ctx.progress().set_total(ids.len());

        let deps = ctx.deps();
        let taxonomy = deps
            .profiles
            .load_taxonomy()
            .await
            .map_err(|e| JobError::system(format!("failed to load taxonomy: {:#}", e)))?;
        let extractor = ProfileExtractor::new(deps.ai.as_ref(), &taxonomy);

        let mut session = deps.crawler.launch().await.map_err(|fault| JobError::system(fault.to_string()))?;

        ctx.log_event(
            "profile_enrichment_started",
            format!("enriching {} profiles", ids.len()),
            json!({"contractor_ids": ids, "categories": taxonomy.len()}),
            EventSeverity::Info,
        )
        .await;

        let mut run = ProfileEnrichmentResult::default();
        let outcome = AssertUnwindSafe(self.process_all(&ids, session.as_mut(), &extractor, &mut run, ctx))
            .catch_unwind()
            .await;
        session.close().await;

        let summary = json!({
            "processed": run.processed,
            "successful": run.successful,
            "skipped": run.skipped,
            "failed": run.failed,
            "bot_blocked": run.bot_blocked,
            "total_tokens": run.total_tokens,
            "total_cost_usd": run.total_cost_usd,
        });

        match outcome {
            Ok(Ok(LoopExit::Finished)) => {
                ctx.log_event(
                    "profile_enrichment_completed",
                    format!("{} of {} profiles enriched", run.successful, run.processed),
                    summary,
                    EventSeverity::Info,
                )
                .await;
                Ok(run)
            }
            Ok(Ok(LoopExit::Cancelled)) => {
                ctx.log_event(
                    "profile_enrichment_cancelled",
                    "cancelled between items",
                    summary,
                    EventSeverity::Warning,
                )
                .await;
                Err(JobError::Cancelled)
            }
            Ok(Err(fault)) => {
                ctx.log_event(
                    "profile_enrichment_aborted",
                    format!("crawler failure: {}", fault),
                    summary,
                    EventSeverity::Error,
                )
                .await;
                Err(JobError::system_with_partial(fault.to_string(), run))
            }
            Err(_) => {
                ctx.log_event(
                    "profile_enrichment_aborted",
                    "executor panicked",
                    summary,
                    EventSeverity::Error,
                )
                .await;
                Err(JobError::system_with_partial("profile enrichment panicked", run))
            }
        }
    }
}
