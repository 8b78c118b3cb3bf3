//! Review enrichment pipeline tests against in-memory collaborators.

mod common;

use chrono::Duration;
use enrichment_core::common::{ContractorId, JobId};
use enrichment_core::domains::reviews::models::{
    ReviewEnrichmentPayload, ReviewItemStatus, ReviewStatusUpdate,
};
use enrichment_core::domains::reviews::ReviewEnrichmentExecutor;
use enrichment_core::kernel::jobs::{JobError, JobExecutor, JobPayload, JobType, ProgressReporter};
use enrichment_core::kernel::test_dependencies::{
    mock_reviews, MockDownload, MockImageDownloader, MockReviewsApi, TestDependencies, MOCK_TASK_COST,
};
use tokio_util::sync::CancellationToken;

use crate::common::{enriched_at, fast_review_config, review_candidate};

fn executor() -> ReviewEnrichmentExecutor {
    ReviewEnrichmentExecutor::new(fast_review_config())
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn skips_ineligible_candidates_and_saves_reviews_for_eligible_one() {
    let test = TestDependencies::new()
        .mock_reviews_api(MockReviewsApi::new().with_reviews("place-c", mock_reviews("c", 5, 0)));
    let now = test.now();

    let mut missing_place = review_candidate("No Place Co", "unused");
    missing_place.place_id = None;
    let cooling_down = enriched_at(review_candidate("Recent Co", "place-b"), now - Duration::days(10));
    let eligible = review_candidate("Eligible Co", "place-c");

    let ids = vec![missing_place.id, cooling_down.id, eligible.id];
    test.reviews.insert_candidate(missing_place);
    test.reviews.insert_candidate(cooling_down);
    test.reviews.insert_candidate(eligible.clone());

    let result = executor()
        .execute(ReviewEnrichmentPayload::for_contractors(ids), &test.context(JobId::new()))
        .await
        .unwrap();

    assert_eq!(result.processed, 3);
    assert_eq!(result.successful, 1);
    assert_eq!(result.skipped, 2);
    assert_eq!(result.failed, 0);
    assert_eq!(result.total_reviews_fetched, 5);
    assert_eq!(result.total_reviews_saved, 5);
    assert!((result.api_cost - MOCK_TASK_COST).abs() < f64::EPSILON);
    assert!(!result.should_continue);

    let submitted = test.reviews_api.submitted_specs();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].place_id, "place-c");

    assert_eq!(test.reviews.reviews_for(eligible.id).len(), 5);
    assert!(matches!(
        test.reviews.last_status(eligible.id),
        Some(ReviewStatusUpdate::Completed { review_count: 5, .. })
    ));
}

#[tokio::test]
async fn skipped_candidates_cost_no_external_calls() {
    let test = TestDependencies::new();

    let mut missing_place = review_candidate("Blank Place Co", "place-a");
    missing_place.place_id = Some("   ".into());
    let mut missing_coords = review_candidate("Nowhere Co", "place-b");
    missing_coords.latitude = None;
    let unknown = ContractorId::new();

    let ids = vec![missing_place.id, missing_coords.id, unknown];
    test.reviews.insert_candidate(missing_place);
    test.reviews.insert_candidate(missing_coords);

    let result = executor()
        .execute(ReviewEnrichmentPayload::for_contractors(ids), &test.context(JobId::new()))
        .await
        .unwrap();

    assert_eq!(result.skipped, 3);
    assert_eq!(test.reviews_api.total_calls(), 0);
    assert!(test.images.calls().is_empty());

    let reasons: Vec<String> = result.results.iter().filter_map(|r| r.reason.clone()).collect();
    assert_eq!(
        reasons,
        vec!["missing external place id", "missing coordinates", "candidate not found"]
    );
}

#[tokio::test]
async fn duplicate_ids_are_submitted_once() {
    let test = TestDependencies::new()
        .mock_reviews_api(MockReviewsApi::new().with_reviews("place-a", mock_reviews("a", 2, 0)));
    let candidate = review_candidate("Acme Roofing", "place-a");
    test.reviews.insert_candidate(candidate.clone());

    let (progress, _updates) = ProgressReporter::channel();
    let ctx = test.context(JobId::new()).with_progress(progress.clone());
    let result = executor()
        .execute(
            ReviewEnrichmentPayload::for_contractors(vec![candidate.id, candidate.id, candidate.id]),
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(result.processed, 1);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.successful, 1);
    assert_eq!(test.reviews_api.submitted_specs().len(), 1);

    let snapshot = progress.snapshot();
    assert_eq!(snapshot.total_items, Some(1));
    assert_eq!(snapshot.processed_items, Some(1));
    assert!(test.events.has_event("review_duplicate_ids_dropped"));
}

#[tokio::test]
async fn rerun_within_cooldown_is_a_no_op() {
    let test = TestDependencies::new()
        .mock_reviews_api(MockReviewsApi::new().with_reviews("place-a", mock_reviews("a", 3, 0)));
    let candidate = review_candidate("Acme Roofing", "place-a");
    test.reviews.insert_candidate(candidate.clone());
    let payload = ReviewEnrichmentPayload::for_contractors(vec![candidate.id]);

    let first = executor()
        .execute(payload.clone(), &test.context(JobId::new()))
        .await
        .unwrap();
    assert_eq!(first.successful, 1);

    test.clock.advance(Duration::days(29));
    let second = executor()
        .execute(payload, &test.context(JobId::new()))
        .await
        .unwrap();

    assert_eq!(second.skipped, 1);
    assert_eq!(second.results[0].status, ReviewItemStatus::Skipped);
    assert!(second.results[0].reason.as_deref().unwrap().contains("eligible again"));
    assert_eq!(test.reviews_api.submit_calls(), 1);
    assert_eq!(test.reviews.review_count(), 3);
}

#[tokio::test]
async fn rerun_after_cooldown_does_not_duplicate_reviews() {
    let test = TestDependencies::new()
        .mock_reviews_api(MockReviewsApi::new().with_reviews("place-a", mock_reviews("a", 5, 1)));
    let candidate = review_candidate("Acme Roofing", "place-a");
    test.reviews.insert_candidate(candidate.clone());
    let payload = ReviewEnrichmentPayload::for_contractors(vec![candidate.id]);

    let first = executor()
        .execute(payload.clone(), &test.context(JobId::new()))
        .await
        .unwrap();
    assert_eq!(first.total_reviews_saved, 5);
    assert_eq!(first.results[0].images.as_ref().unwrap().downloaded, 5);

    test.clock.advance(Duration::days(31));
    let second = executor()
        .execute(payload, &test.context(JobId::new()))
        .await
        .unwrap();

    assert_eq!(second.successful, 1);
    assert_eq!(second.total_reviews_saved, 5);
    assert_eq!(test.reviews.review_count(), 5);
    // Nothing new was inserted, so no photos to fetch the second time.
    assert!(second.results[0].images.is_none());
    assert_eq!(test.images.calls().len(), 1);
}

// ============================================================================
// Submit, poll, fetch
// ============================================================================

#[tokio::test]
async fn submission_failure_fails_each_candidate_without_aborting() {
    let test = TestDependencies::new().mock_reviews_api(MockReviewsApi::new().failing_submit("503 upstream"));
    let a = review_candidate("A Co", "place-a");
    let b = review_candidate("B Co", "place-b");
    test.reviews.insert_candidate(a.clone());
    test.reviews.insert_candidate(b.clone());

    let result = executor()
        .execute(
            ReviewEnrichmentPayload::for_contractors(vec![a.id, b.id]),
            &test.context(JobId::new()),
        )
        .await
        .unwrap();

    assert_eq!(result.failed, 2);
    assert!(result
        .results
        .iter()
        .all(|r| r.reason.as_deref().unwrap().contains("submission failed")));
    assert_eq!(test.reviews_api.poll_calls(), 0);

    let history = test.reviews.status_history(a.id);
    assert_eq!(history[0], ReviewStatusUpdate::Pending);
    assert!(matches!(history[1], ReviewStatusUpdate::Failed { .. }));
    assert!(test.events.has_event("review_submit_failed"));
}

#[tokio::test]
async fn rejected_task_fails_only_that_candidate() {
    let test = TestDependencies::new().mock_reviews_api(
        MockReviewsApi::new()
            .with_reviews("place-a", mock_reviews("a", 2, 0))
            .rejecting("place-b"),
    );
    let a = review_candidate("A Co", "place-a");
    let b = review_candidate("B Co", "place-b");
    test.reviews.insert_candidate(a.clone());
    test.reviews.insert_candidate(b.clone());

    let result = executor()
        .execute(
            ReviewEnrichmentPayload::for_contractors(vec![a.id, b.id]),
            &test.context(JobId::new()),
        )
        .await
        .unwrap();

    assert_eq!(result.successful, 1);
    assert_eq!(result.failed, 1);
    let failed = result.results.iter().find(|r| r.contractor_id == b.id).unwrap();
    assert_eq!(failed.reason.as_deref(), Some("invalid place id"));
}

#[tokio::test]
async fn tasks_not_ready_by_timeout_fail_with_polling_timeout() {
    let test = TestDependencies::new().mock_reviews_api(
        MockReviewsApi::new()
            .with_reviews("place-a", mock_reviews("a", 2, 0))
            .never_ready("place-b"),
    );
    let a = review_candidate("A Co", "place-a");
    let b = review_candidate("B Co", "place-b");
    test.reviews.insert_candidate(a.clone());
    test.reviews.insert_candidate(b.clone());

    let result = executor()
        .execute(
            ReviewEnrichmentPayload::for_contractors(vec![a.id, b.id]),
            &test.context(JobId::new()),
        )
        .await
        .unwrap();

    assert_eq!(result.successful, 1);
    assert_eq!(result.failed, 1);
    let timed_out = result.results.iter().find(|r| r.contractor_id == b.id).unwrap();
    assert_eq!(timed_out.reason.as_deref(), Some("polling timeout"));
    assert!(test.reviews_api.poll_calls() > 1);
    assert_eq!(test.reviews_api.fetch_calls(), vec![MockReviewsApi::task_id_for("place-a")]);
    assert!(test.events.has_event("review_poll_timeout"));
}

#[tokio::test]
async fn fetch_failure_is_recorded_per_candidate() {
    let test = TestDependencies::new().mock_reviews_api(MockReviewsApi::new().failing_fetch("place-a"));
    let a = review_candidate("A Co", "place-a");
    test.reviews.insert_candidate(a.clone());

    let result = executor()
        .execute(ReviewEnrichmentPayload::for_contractors(vec![a.id]), &test.context(JobId::new()))
        .await
        .unwrap();

    assert_eq!(result.failed, 1);
    assert!(result.results[0].reason.as_deref().unwrap().starts_with("failed to fetch task"));
    assert!(matches!(test.reviews.last_status(a.id), Some(ReviewStatusUpdate::Failed { .. })));
}

// ============================================================================
// Image sub-phase
// ============================================================================

#[tokio::test]
async fn rate_limited_photos_are_deferred_without_failing_the_candidate() {
    let test = TestDependencies::new()
        .mock_reviews_api(MockReviewsApi::new().with_reviews("place-a", mock_reviews("a", 5, 2)))
        .mock_images(MockImageDownloader::new().then(MockDownload::RateLimitAfter(2)));
    let a = review_candidate("A Co", "place-a");
    test.reviews.insert_candidate(a.clone());

    let result = executor()
        .execute(ReviewEnrichmentPayload::for_contractors(vec![a.id]), &test.context(JobId::new()))
        .await
        .unwrap();

    assert_eq!(result.successful, 1);
    let item = &result.results[0];
    assert_eq!(item.status, ReviewItemStatus::Success);
    let images = item.images.as_ref().unwrap();
    assert_eq!(images.attempted, 10);
    assert_eq!(images.downloaded, 2);
    assert_eq!(images.deferred, 8);
    assert_eq!(test.reviews.stored_images().len(), 2);

    let retries = test.queue.jobs_of_type(JobType::ImageRetry);
    assert_eq!(retries.len(), 1);
    assert_eq!(images.retry_job_id, Some(retries[0].id));
    assert_eq!(retries[0].scheduled_for, test.now() + Duration::minutes(15));
    let JobPayload::ImageRetry(batch) = &retries[0].payload else {
        panic!("expected an image retry payload");
    };
    assert_eq!(batch.attempt_number, 1);
    assert_eq!(batch.contractor_id, a.id);
    assert_eq!(batch.images.len(), 8);
    assert!(test.events.has_event("image_download_rate_limited"));
}

#[tokio::test]
async fn photos_failed_before_a_rate_limit_are_counted_not_deferred() {
    let test = TestDependencies::new()
        .mock_reviews_api(MockReviewsApi::new().with_reviews("place-a", mock_reviews("a", 3, 2)))
        .mock_images(
            MockImageDownloader::new().then(MockDownload::RateLimitAfterFailures { downloaded: 1, failed: 2 }),
        );
    let a = review_candidate("A Co", "place-a");
    test.reviews.insert_candidate(a.clone());

    let result = executor()
        .execute(ReviewEnrichmentPayload::for_contractors(vec![a.id]), &test.context(JobId::new()))
        .await
        .unwrap();

    let images = result.results[0].images.as_ref().unwrap();
    assert_eq!(images.attempted, 6);
    assert_eq!(images.downloaded, 1);
    assert_eq!(images.failed, 2);
    assert_eq!(images.deferred, 3);
    assert_eq!(images.downloaded + images.failed + images.deferred, images.attempted);

    let retries = test.queue.jobs_of_type(JobType::ImageRetry);
    let JobPayload::ImageRetry(batch) = &retries[0].payload else {
        panic!("expected an image retry payload");
    };
    assert_eq!(batch.images.len(), 3);
}

#[tokio::test]
async fn other_download_errors_are_reported_but_reviews_stay_saved() {
    let test = TestDependencies::new()
        .mock_reviews_api(MockReviewsApi::new().with_reviews("place-a", mock_reviews("a", 2, 1)))
        .mock_images(MockImageDownloader::new().then(MockDownload::Fail("disk full".into())));
    let a = review_candidate("A Co", "place-a");
    test.reviews.insert_candidate(a.clone());

    let result = executor()
        .execute(ReviewEnrichmentPayload::for_contractors(vec![a.id]), &test.context(JobId::new()))
        .await
        .unwrap();

    assert_eq!(result.successful, 1);
    let images = result.results[0].images.as_ref().unwrap();
    assert_eq!(images.failed, 2);
    assert_eq!(images.error.as_deref(), Some("disk full"));
    assert!(test.queue.is_empty());
}

// ============================================================================
// Continuous mode and cancellation
// ============================================================================

#[tokio::test]
async fn continuous_mode_selects_batches_until_none_remain() {
    let test = TestDependencies::new();
    for place in ["place-a", "place-b", "place-c"] {
        test.reviews.insert_candidate(review_candidate(place, place));
    }

    let first = executor()
        .execute(ReviewEnrichmentPayload::continuous(Some(2)), &test.context(JobId::new()))
        .await
        .unwrap();
    assert_eq!(first.processed, 2);
    assert!(first.should_continue);

    let second = executor()
        .execute(ReviewEnrichmentPayload::continuous(Some(2)), &test.context(JobId::new()))
        .await
        .unwrap();
    assert_eq!(second.processed, 1);
    assert!(!second.should_continue);
}

#[tokio::test]
async fn continuous_selection_leaves_recent_failures_alone() {
    let test = TestDependencies::new().mock_reviews_api(MockReviewsApi::new().failing_fetch("place-a"));
    test.reviews.insert_candidate(review_candidate("A Co", "place-a"));

    let first = executor()
        .execute(ReviewEnrichmentPayload::continuous(None), &test.context(JobId::new()))
        .await
        .unwrap();
    assert_eq!(first.failed, 1);
    assert!(!first.should_continue);

    let second = executor()
        .execute(ReviewEnrichmentPayload::continuous(None), &test.context(JobId::new()))
        .await
        .unwrap();
    assert_eq!(second.processed, 0);
}

#[tokio::test]
async fn cancellation_stops_before_any_external_call() {
    let test = TestDependencies::new();
    let a = review_candidate("A Co", "place-a");
    test.reviews.insert_candidate(a.clone());

    let token = CancellationToken::new();
    token.cancel();
    let ctx = test.context(JobId::new()).with_cancellation(token);

    let err = executor()
        .execute(ReviewEnrichmentPayload::for_contractors(vec![a.id]), &ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::Cancelled));
    assert_eq!(test.reviews_api.total_calls(), 0);
}

#[tokio::test]
async fn empty_non_continuous_payload_does_nothing() {
    let test = TestDependencies::new();
    let result = executor()
        .execute(ReviewEnrichmentPayload::default(), &test.context(JobId::new()))
        .await
        .unwrap();
    assert_eq!(result.processed, 0);
    assert_eq!(test.reviews_api.total_calls(), 0);
}
