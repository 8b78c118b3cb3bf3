//! Image retry chain tests: requeue with escalating backoff, abandon at the
//! end of the schedule.

mod common;

use chrono::Duration;
use enrichment_core::common::JobId;
use enrichment_core::domains::images::models::RateLimitedImageBatch;
use enrichment_core::domains::images::ImageRetryExecutor;
use enrichment_core::kernel::jobs::{
    JobError, JobExecutor, JobPayload, JobType, ProgressReporter, MAX_RETRY_ATTEMPTS,
};
use enrichment_core::kernel::test_dependencies::{MockDownload, MockImageDownloader, TestDependencies};

use crate::common::image_batch;

fn retry_payloads(test: &TestDependencies) -> Vec<RateLimitedImageBatch> {
    test.queue
        .jobs_of_type(JobType::ImageRetry)
        .into_iter()
        .filter_map(|job| match job.payload {
            JobPayload::ImageRetry(batch) => Some(batch),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn rate_limit_on_first_attempt_requeues_attempt_two_in_fifteen_minutes() {
    let test =
        TestDependencies::new().mock_images(MockImageDownloader::new().then(MockDownload::RateLimitAfter(2)));
    let batch = image_batch(10, 1);

    let result = ImageRetryExecutor::new()
        .execute(batch.clone(), &test.context(JobId::new()))
        .await
        .unwrap();

    assert!(result.requeued_for_retry);
    assert!(!result.abandoned);
    assert_eq!(result.total_images, 10);
    assert_eq!(result.downloaded, 2);
    assert_eq!(result.next_attempt, Some(2));
    let remaining = result.remaining_images.clone().unwrap();
    assert_eq!(remaining.len(), 8);

    let jobs = test.queue.jobs_of_type(JobType::ImageRetry);
    assert_eq!(jobs.len(), 1);
    assert_eq!(result.retry_job_id, Some(jobs[0].id));
    assert_eq!(jobs[0].scheduled_for, test.now() + Duration::minutes(15));

    let next = &retry_payloads(&test)[0];
    assert_eq!(next.attempt_number, 2);
    assert_eq!(next.contractor_id, batch.contractor_id);
    assert_eq!(next.images, remaining);

    assert_eq!(test.reviews.stored_images().len(), 2);
    assert!(test.events.has_event("image_retry_requeued"));
}

#[tokio::test]
async fn images_that_failed_before_the_rate_limit_are_reported_as_failed() {
    let test = TestDependencies::new().mock_images(
        MockImageDownloader::new().then(MockDownload::RateLimitAfterFailures { downloaded: 1, failed: 2 }),
    );
    let batch = image_batch(6, 2);

    let (progress, _updates) = ProgressReporter::channel();
    let ctx = test.context(JobId::new()).with_progress(progress.clone());
    let result = ImageRetryExecutor::new().execute(batch.clone(), &ctx).await.unwrap();

    let remaining = result.remaining_images.clone().unwrap();
    assert_eq!(result.downloaded, 1);
    assert_eq!(result.failed, 2);
    assert_eq!(remaining, batch.images[3..].to_vec());
    assert_eq!(result.downloaded + result.failed + remaining.len(), result.total_images);

    let next = &retry_payloads(&test)[0];
    assert_eq!(next.attempt_number, 3);
    assert_eq!(next.images, remaining);

    let snapshot = progress.snapshot();
    assert_eq!(snapshot.processed_items, Some(3));
    assert_eq!(snapshot.failed_items, Some(2));
}

#[tokio::test]
async fn rate_limit_on_last_attempt_abandons_the_chain() {
    let test =
        TestDependencies::new().mock_images(MockImageDownloader::new().then(MockDownload::RateLimitAfter(0)));

    let result = ImageRetryExecutor::new()
        .execute(image_batch(10, MAX_RETRY_ATTEMPTS), &test.context(JobId::new()))
        .await
        .unwrap();

    assert!(!result.requeued_for_retry);
    assert!(result.abandoned);
    assert_eq!(result.next_attempt, None);
    assert_eq!(result.remaining_images.as_ref().map(Vec::len), Some(10));
    assert!(test.queue.is_empty());

    let abandoned = test.events.events_named("image_retry_abandoned");
    assert_eq!(abandoned.len(), 1);
}

#[tokio::test]
async fn four_consecutive_rate_limits_end_the_lineage() {
    let downloader = (0..4).fold(MockImageDownloader::new(), |d, _| d.then(MockDownload::RateLimitAfter(1)));
    let test = TestDependencies::new().mock_images(downloader);
    let executor = ImageRetryExecutor::new();

    let mut batch = image_batch(6, 1);
    let mut attempts = vec![batch.attempt_number];
    let mut last = None;

    for _ in 0..4 {
        let result = executor
            .execute(batch.clone(), &test.context(JobId::new()))
            .await
            .unwrap();
        let created = retry_payloads(&test);
        last = Some(result);
        match created.last() {
            Some(next) if next.attempt_number > batch.attempt_number => {
                attempts.push(next.attempt_number);
                batch = next.clone();
            }
            _ => break,
        }
    }

    assert_eq!(attempts, vec![1, 2, 3, 4]);
    assert_eq!(test.queue.len(), 3);

    let last = last.unwrap();
    assert!(last.abandoned);
    assert!(!last.requeued_for_retry);
    assert_eq!(last.remaining_images.map(|r| r.len()), Some(2));
    assert_eq!(test.images.calls().len(), 4);
}

#[tokio::test]
async fn backoff_escalates_along_the_lineage() {
    let downloader = (0..3).fold(MockImageDownloader::new(), |d, _| d.then(MockDownload::RateLimitAfter(0)));
    let test = TestDependencies::new().mock_images(downloader);
    let executor = ImageRetryExecutor::new();

    let mut offsets = Vec::new();
    for attempt in 1..=3 {
        executor
            .execute(image_batch(3, attempt), &test.context(JobId::new()))
            .await
            .unwrap();
        let jobs = test.queue.jobs_of_type(JobType::ImageRetry);
        let newest = jobs.last().unwrap();
        offsets.push((newest.scheduled_for - test.now()).num_minutes());
    }

    assert_eq!(offsets, vec![15, 30, 60]);
}

#[tokio::test]
async fn successful_retry_records_every_image() {
    let test = TestDependencies::new();

    let result = ImageRetryExecutor::new()
        .execute(image_batch(4, 2), &test.context(JobId::new()))
        .await
        .unwrap();

    assert_eq!(result.downloaded, 4);
    assert!(!result.requeued_for_retry);
    assert!(result.remaining_images.is_none());
    assert_eq!(test.reviews.stored_images().len(), 4);
    assert!(test.queue.is_empty());
}

#[tokio::test]
async fn non_rate_limit_error_fails_the_job() {
    let test = TestDependencies::new()
        .mock_images(MockImageDownloader::new().then(MockDownload::Fail("connection reset".into())));

    let err = ImageRetryExecutor::new()
        .execute(image_batch(4, 1), &test.context(JobId::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::SystemFailure { .. }));
    assert!(err.to_string().contains("connection reset"));
    assert!(test.queue.is_empty());
}

#[tokio::test]
async fn attempt_number_outside_the_schedule_is_rejected() {
    let test = TestDependencies::new();
    let executor = ImageRetryExecutor::new();

    for attempt in [0, MAX_RETRY_ATTEMPTS + 1] {
        let err = executor
            .execute(image_batch(1, attempt), &test.context(JobId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidPayload { .. }));
    }
    assert!(test.images.calls().is_empty());
}
