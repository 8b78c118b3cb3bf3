//! Review enrichment: fetch third-party reviews for a batch of contractors.
//!
//! Phases run strictly in order: validate, submit, poll, fetch and save,
//! then build the result. Skipped candidates never reach the reviews API.
//! Per-candidate failures end up in the result; only an unusable candidate
//! store or cancellation ends the job early. Every write commits on its own,
//! so a run that dies halfway can simply be run again.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use super::models::{
    EligibleCandidate, ReviewEnrichmentCandidate, ReviewEnrichmentPayload, ReviewEnrichmentResult, ReviewItemResult,
    ReviewItemStatus, ReviewStatusUpdate, SkipReason,
};
use super::transform::to_new_reviews;
use crate::common::ContractorId;
use crate::domains::images::retry::{download_or_defer, image_refs};
use crate::kernel::jobs::{EventSeverity, JobContext, JobError, JobExecutor};
use crate::kernel::ReviewTaskSpec;

#[derive(Debug, Clone)]
pub struct ReviewEnrichmentConfig {
    /// How long submitted tasks may stay unfinished.
    pub poll_timeout: Duration,
    pub poll_interval: Duration,
    /// Batch size for self-selected runs without an explicit size.
    pub default_batch_size: usize,
    pub max_batch_size: usize,
}

impl Default for ReviewEnrichmentConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(10),
            default_batch_size: 10,
            max_batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReviewEnrichmentExecutor {
    config: ReviewEnrichmentConfig,
}

/// Where the batch's candidates come from.
enum CandidateSource {
    Ids(Vec<ContractorId>),
    Selected(Vec<ReviewEnrichmentCandidate>),
}

impl CandidateSource {
    fn len(&self) -> usize {
        match self {
            CandidateSource::Ids(ids) => ids.len(),
            CandidateSource::Selected(candidates) => candidates.len(),
        }
    }
}

impl ReviewEnrichmentExecutor {
    pub fn new(config: ReviewEnrichmentConfig) -> Self {
        Self { config }
    }

    async fn resolve_source(
        &self,
        payload: &ReviewEnrichmentPayload,
        ctx: &JobContext,
    ) -> Result<CandidateSource, JobError> {
        if payload.contractor_ids.is_empty() && payload.continuous {
            let limit = payload
                .batch_size
                .unwrap_or(self.config.default_batch_size)
                .clamp(1, self.config.max_batch_size);
            let deps = ctx.deps();
            let selected = deps
                .reviews
                .find_selectable_candidates(deps.clock.now(), limit)
                .await
                .map_err(|e| JobError::system(format!("failed to select candidates: {:#}", e)))?;
            return Ok(CandidateSource::Selected(selected));
        }

        let mut seen = HashSet::new();
        let mut ids: Vec<ContractorId> = payload
            .contractor_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        let duplicates = payload.contractor_ids.len() - ids.len();
        if duplicates > 0 {
            ctx.log_event(
                "review_duplicate_ids_dropped",
                format!("{} duplicate contractor ids dropped", duplicates),
                json!({"requested": payload.contractor_ids.len(), "unique": ids.len()}),
                EventSeverity::Warning,
            )
            .await;
        }

        if ids.len() > self.config.max_batch_size {
            ctx.log_event(
                "review_batch_truncated",
                format!("batch of {} capped at {}", ids.len(), self.config.max_batch_size),
                json!({"requested": ids.len(), "dropped": &ids[self.config.max_batch_size..]}),
                EventSeverity::Warning,
            )
            .await;
            ids.truncate(self.config.max_batch_size);
        }
        Ok(CandidateSource::Ids(ids))
    }

    /// Phase 1. Records skips and lookup failures, returns the rest.
    async fn validate(
        &self,
        source: CandidateSource,
        run: &mut ReviewEnrichmentResult,
        ctx: &JobContext,
    ) -> Result<Vec<EligibleCandidate>, JobError> {
        let deps = ctx.deps();
        let now = deps.clock.now();

        let candidates: Vec<Result<ReviewEnrichmentCandidate, ReviewItemResult>> = match source {
            CandidateSource::Selected(candidates) => candidates.into_iter().map(Ok).collect(),
            CandidateSource::Ids(ids) => {
                let mut loaded = Vec::with_capacity(ids.len());
                for id in ids {
                    if ctx.is_cancelled() {
                        return Err(JobError::Cancelled);
                    }
                    loaded.push(match deps.reviews.find_candidate(id).await {
                        Ok(Some(candidate)) => Ok(candidate),
                        Ok(None) => Err(ReviewItemResult::skipped(id, &SkipReason::NotFound)),
                        Err(e) => Err(ReviewItemResult::failed(
                            id,
                            None,
                            format!("failed to load candidate: {:#}", e),
                        )),
                    });
                }
                loaded
            }
        };

        let mut eligible = Vec::new();
        for candidate in candidates {
            match candidate {
                Ok(candidate) => match candidate.eligibility(now) {
                    Ok(ok) => eligible.push(ok),
                    Err(reason) => {
                        let mut item = ReviewItemResult::skipped(candidate.id, &reason);
                        item.company_name = Some(candidate.company_name);
                        record(run, item, ctx);
                    }
                },
                Err(item) => record(run, item, ctx),
            }
        }
        Ok(eligible)
    }

    /// Phase 2. Returns the task mapping for accepted submissions.
    async fn submit(
        &self,
        eligible: Vec<EligibleCandidate>,
        run: &mut ReviewEnrichmentResult,
        ctx: &JobContext,
    ) -> HashMap<String, EligibleCandidate> {
        let deps = ctx.deps();
        for candidate in &eligible {
            self.set_status(ctx, candidate.id, ReviewStatusUpdate::Pending).await;
        }

        let specs: Vec<ReviewTaskSpec> = eligible
            .iter()
            .map(|c| ReviewTaskSpec {
                contractor_id: c.id,
                place_id: c.place_id.clone(),
                latitude: c.latitude,
                longitude: c.longitude,
            })
            .collect();

        let submitted = match deps.reviews_api.submit_tasks(&specs).await {
            Ok(submitted) => submitted,
            Err(e) => {
                let error = format!("task submission failed: {:#}", e);
                ctx.log_event(
                    "review_submit_failed",
                    &error,
                    json!({"contractor_ids": eligible.iter().map(|c| c.id).collect::<Vec<_>>()}),
                    EventSeverity::Error,
                )
                .await;
                for candidate in eligible {
                    self.fail(run, ctx, candidate, error.clone()).await;
                }
                return HashMap::new();
            }
        };

        let mut by_contractor: HashMap<ContractorId, EligibleCandidate> =
            eligible.into_iter().map(|c| (c.id, c)).collect();
        let mut tasks = HashMap::new();

        for task in submitted {
            run.api_cost += task.cost;
            let Some(candidate) = by_contractor.remove(&task.contractor_id) else {
                continue;
            };
            match task.task_id {
                Some(task_id) => {
                    tasks.insert(task_id, candidate);
                }
                None => {
                    let error = task.error.unwrap_or_else(|| "task rejected by reviews API".to_string());
                    self.fail(run, ctx, candidate, error).await;
                }
            }
        }
        for (_, candidate) in by_contractor {
            self.fail(run, ctx, candidate, "no task returned by reviews API").await;
        }

        ctx.log_event(
            "review_tasks_submitted",
            format!("{} review tasks submitted", tasks.len()),
            json!({"task_ids": tasks.keys().collect::<Vec<_>>(), "api_cost": run.api_cost}),
            EventSeverity::Info,
        )
        .await;
        tasks
    }

    /// Phase 3. Polls until every task is ready or the timeout passes.
    /// Tasks still outstanding at the timeout are failed.
    async fn poll(
        &self,
        mut outstanding: HashMap<String, EligibleCandidate>,
        run: &mut ReviewEnrichmentResult,
        ctx: &JobContext,
    ) -> Result<Vec<(String, EligibleCandidate)>, JobError> {
        let deps = ctx.deps();
        let deadline = Instant::now() + self.config.poll_timeout;
        let mut ready = Vec::new();

        while !outstanding.is_empty() {
            match deps.reviews_api.poll_ready().await {
                Ok(ids) => {
                    for id in ids {
                        if let Some(candidate) = outstanding.remove(&id) {
                            ready.push((id, candidate));
                        }
                    }
                }
                Err(e) => {
                    ctx.log_event(
                        "review_poll_failed",
                        format!("polling reviews API failed: {:#}", e),
                        json!({"outstanding": outstanding.len()}),
                        EventSeverity::Warning,
                    )
                    .await;
                }
            }

            if outstanding.is_empty() || Instant::now() >= deadline {
                break;
            }

            tokio::select! {
                _ = ctx.cancellation_token().cancelled() => return Err(JobError::Cancelled),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        if !outstanding.is_empty() {
            ctx.log_event(
                "review_poll_timeout",
                format!("{} tasks still pending after {:?}", outstanding.len(), self.config.poll_timeout),
                json!({"task_ids": outstanding.keys().collect::<Vec<_>>()}),
                EventSeverity::Warning,
            )
            .await;
            for (_, candidate) in outstanding {
                self.fail(run, ctx, candidate, "polling timeout").await;
            }
        }

        Ok(ready)
    }

    /// Phase 4 for one ready task, including the image sub-phase.
    async fn fetch_and_save(
        &self,
        task_id: &str,
        candidate: EligibleCandidate,
        run: &mut ReviewEnrichmentResult,
        ctx: &JobContext,
    ) {
        let deps = ctx.deps();

        let fetched = match deps.reviews_api.fetch_result(task_id).await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.fail(run, ctx, candidate, format!("failed to fetch task {}: {:#}", task_id, e))
                    .await;
                return;
            }
        };
        run.api_cost += fetched.cost;

        let rows = to_new_reviews(&fetched.reviews);
        let outcome = match deps.reviews.upsert_reviews(candidate.id, &rows).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail(run, ctx, candidate, format!("failed to save reviews: {:#}", e))
                    .await;
                return;
            }
        };

        self.set_status(
            ctx,
            candidate.id,
            ReviewStatusUpdate::Completed {
                review_count: outcome.saved,
                enriched_at: deps.clock.now(),
            },
        )
        .await;

        let images = image_refs(&outcome.inserted);
        let images = if images.is_empty() {
            None
        } else {
            Some(download_or_defer(ctx, candidate.id, images).await)
        };

        record(
            run,
            ReviewItemResult {
                contractor_id: candidate.id,
                company_name: Some(candidate.company_name),
                status: ReviewItemStatus::Success,
                reason: None,
                reviews_fetched: fetched.reviews.len(),
                reviews_saved: outcome.saved,
                images,
            },
            ctx,
        );
    }

    async fn fail(
        &self,
        run: &mut ReviewEnrichmentResult,
        ctx: &JobContext,
        candidate: EligibleCandidate,
        error: impl Into<String>,
    ) {
        let error = error.into();
        self.set_status(
            ctx,
            candidate.id,
            ReviewStatusUpdate::Failed {
                error: error.clone(),
                failed_at: ctx.deps().clock.now(),
            },
        )
        .await;
        record(
            run,
            ReviewItemResult::failed(candidate.id, Some(candidate.company_name), error),
            ctx,
        );
    }

    async fn set_status(&self, ctx: &JobContext, id: ContractorId, update: ReviewStatusUpdate) {
        if let Err(e) = ctx.deps().reviews.update_enrichment_status(id, &update).await {
            ctx.log_event(
                "review_status_update_failed",
                "could not record review enrichment status",
                json!({"contractor_id": id, "status": update.status_str(), "error": format!("{:#}", e)}),
                EventSeverity::Warning,
            )
            .await;
        }
    }

    /// Phase 5 helper: any selectable candidate left after this batch.
    async fn more_work_remains(&self, ctx: &JobContext) -> bool {
        let deps = ctx.deps();
        match deps.reviews.find_selectable_candidates(deps.clock.now(), 1).await {
            Ok(next) => !next.is_empty(),
            Err(e) => {
                ctx.log_event(
                    "review_continuation_check_failed",
                    format!("could not look for more candidates: {:#}", e),
                    json!({}),
                    EventSeverity::Warning,
                )
                .await;
                false
            }
        }
    }
}

fn record(run: &mut ReviewEnrichmentResult, item: ReviewItemResult, ctx: &JobContext) {
    ctx.progress().item_done(item.status == ReviewItemStatus::Failed);
    run.record(item);
}

#[async_trait]
impl JobExecutor for ReviewEnrichmentExecutor {
    type Payload = ReviewEnrichmentPayload;
    type Output = ReviewEnrichmentResult;

    fn name(&self) -> &'static str {
        "review_enrichment"
    }

    async fn execute(
        &self,
        payload: ReviewEnrichmentPayload,
        ctx: &JobContext,
    ) -> Result<ReviewEnrichmentResult, JobError> {
        let source = self.resolve_source(&payload, ctx).await?;
        ctx.progress().set_total(source.len());

        ctx.log_event(
            "review_enrichment_started",
            format!("enriching reviews for {} contractors", source.len()),
            json!({"candidates": source.len(), "continuous": payload.continuous}),
            EventSeverity::Info,
        )
        .await;

        let mut run = ReviewEnrichmentResult::default();

        let eligible = self.validate(source, &mut run, ctx).await?;
        if !eligible.is_empty() {
            let tasks = self.submit(eligible, &mut run, ctx).await;
            let ready = self.poll(tasks, &mut run, ctx).await?;

            for (task_id, candidate) in ready {
                if ctx.is_cancelled() {
                    return Err(JobError::Cancelled);
                }
                self.fetch_and_save(&task_id, candidate, &mut run, ctx).await;
            }
        }

        if payload.continuous {
            run.should_continue = self.more_work_remains(ctx).await;
        }

        ctx.log_event(
            "review_enrichment_completed",
            format!("{} of {} contractors enriched", run.successful, run.processed),
            json!({
                "processed": run.processed,
                "successful": run.successful,
                "skipped": run.skipped,
                "failed": run.failed,
                "total_reviews_fetched": run.total_reviews_fetched,
                "total_reviews_saved": run.total_reviews_saved,
                "api_cost": run.api_cost,
                "should_continue": run.should_continue,
            }),
            EventSeverity::Info,
        )
        .await;

        Ok(run)
    }
}
