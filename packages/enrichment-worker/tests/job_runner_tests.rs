//! Job runner tests: dispatch through the registry, persisted outcomes,
//! continuous chaining and release on cancellation.

mod common;

use std::sync::Arc;

use enrichment_core::domains::images::ImageRetryExecutor;
use enrichment_core::domains::profiles::models::ProfileEnrichmentPayload;
use enrichment_core::domains::profiles::ProfileEnrichmentExecutor;
use enrichment_core::domains::reviews::models::ReviewEnrichmentPayload;
use enrichment_core::domains::reviews::ReviewEnrichmentExecutor;
use enrichment_core::kernel::jobs::{
    default_lease_duration, Job, JobExecutorRegistry, JobOutcome, JobPayload, JobQueue, JobRunner, JobStatus,
    JobType,
};
use enrichment_core::kernel::test_dependencies::{MemoryProfileRepository, MockCrawlerEngine, TestDependencies};
use enrichment_core::kernel::CrawlerFault;

use crate::common::{fast_review_config, image_batch, profile_candidate, review_candidate};

fn full_registry() -> JobExecutorRegistry {
    let mut registry = JobExecutorRegistry::new();
    registry
        .register(ProfileEnrichmentExecutor::default())
        .register(ReviewEnrichmentExecutor::new(fast_review_config()))
        .register(ImageRetryExecutor::new());
    registry
}

fn runner(test: &TestDependencies, registry: JobExecutorRegistry) -> JobRunner {
    let queue: Arc<dyn JobQueue> = test.queue.clone();
    JobRunner::new(queue, Arc::new(registry), test.deps())
}

async fn enqueue(test: &TestDependencies, payload: JobPayload) -> Job {
    test.job_service().create_job(payload, None).await.unwrap()
}

#[tokio::test]
async fn completed_job_stores_its_result() {
    let candidate = profile_candidate("Offline Co", None);
    let test = TestDependencies::new()
        .profile_repository(MemoryProfileRepository::new().with_candidate(candidate.clone()));
    let job = enqueue(
        &test,
        JobPayload::ProfileEnrichment(ProfileEnrichmentPayload {
            contractor_ids: vec![candidate.id],
        }),
    )
    .await;

    let outcomes = runner(&test, full_registry()).run_once().await.unwrap();

    assert_eq!(outcomes, vec![JobOutcome::Completed]);
    let stored = test.queue.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.attempts, 1);
    assert_eq!(stored.result.unwrap().job_type(), JobType::ProfileEnrichment);
}

#[tokio::test]
async fn unregistered_job_type_is_marked_failed() {
    let test = TestDependencies::new();
    let job = enqueue(&test, JobPayload::ImageRetry(image_batch(1, 1))).await;

    let mut registry = JobExecutorRegistry::new();
    registry.register(ProfileEnrichmentExecutor::default());
    let outcomes = runner(&test, registry).run_once().await.unwrap();

    assert_eq!(outcomes, vec![JobOutcome::Failed]);
    let stored = test.queue.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.error_message.unwrap().contains("no executor registered"));
    assert!(test.images.calls().is_empty());
}

#[tokio::test]
async fn system_failure_keeps_partial_result() {
    let done = profile_candidate("Done Co", Some("https://done.example.com"));
    let crashing = profile_candidate("Crash Co", Some("https://crash.example.com"));
    let test = TestDependencies::new()
        .mock_crawler(MockCrawlerEngine::new().with_fault(
            "https://crash.example.com",
            CrawlerFault::Crashed("out of memory".into()),
        ))
        .profile_repository(
            MemoryProfileRepository::new()
                .with_candidate(done.clone())
                .with_candidate(crashing.clone()),
        );
    let job = enqueue(
        &test,
        JobPayload::ProfileEnrichment(ProfileEnrichmentPayload {
            contractor_ids: vec![done.id, crashing.id],
        }),
    )
    .await;

    let outcomes = runner(&test, full_registry()).run_once().await.unwrap();

    assert_eq!(outcomes, vec![JobOutcome::Failed]);
    let stored = test.queue.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.error_message.unwrap().contains("out of memory"));
    assert!(stored.result.is_some());
}

#[tokio::test]
async fn future_jobs_are_not_claimed() {
    let test = TestDependencies::new();
    let later = test.now() + chrono::Duration::minutes(15);
    test.job_service()
        .schedule_image_retry(image_batch(2, 1), later)
        .await
        .unwrap();

    let runner = runner(&test, full_registry());
    assert!(runner.run_once().await.unwrap().is_empty());

    test.clock.advance(chrono::Duration::minutes(15));
    assert_eq!(runner.run_once().await.unwrap(), vec![JobOutcome::Completed]);
}

#[tokio::test]
async fn continuous_review_job_chains_the_next_one() {
    let test = TestDependencies::new();
    for place in ["place-a", "place-b", "place-c"] {
        test.reviews.insert_candidate(review_candidate(place, place));
    }
    enqueue(
        &test,
        JobPayload::ReviewEnrichment(ReviewEnrichmentPayload::continuous(Some(2))),
    )
    .await;

    let runner = runner(&test, full_registry());
    assert_eq!(runner.run_once().await.unwrap(), vec![JobOutcome::Completed]);

    let review_jobs = test.queue.jobs_of_type(JobType::ReviewEnrichment);
    assert_eq!(review_jobs.len(), 2);
    let next = &review_jobs[1];
    assert_eq!(next.status, JobStatus::Pending);
    assert!(matches!(
        &next.payload,
        JobPayload::ReviewEnrichment(p) if p.continuous && p.batch_size == Some(2)
    ));

    // The chained run picks up the last candidate and stops the chain.
    assert_eq!(runner.run_once().await.unwrap(), vec![JobOutcome::Completed]);
    assert_eq!(test.queue.jobs_of_type(JobType::ReviewEnrichment).len(), 2);
}

#[tokio::test]
async fn shutdown_releases_the_job_back_to_pending() {
    let test = TestDependencies::new();
    let candidate = review_candidate("A Co", "place-a");
    test.reviews.insert_candidate(candidate.clone());
    let job = enqueue(
        &test,
        JobPayload::ReviewEnrichment(ReviewEnrichmentPayload::for_contractors(vec![candidate.id])),
    )
    .await;

    let runner = runner(&test, full_registry());
    runner.shutdown_token().cancel();
    let outcomes = runner.run_once().await.unwrap();

    assert_eq!(outcomes, vec![JobOutcome::Released]);
    let stored = test.queue.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(test.reviews_api.total_calls(), 0);
}

#[tokio::test]
async fn job_abandoned_by_a_crashed_worker_runs_once_its_lease_expires() {
    let candidate = profile_candidate("Offline Co", None);
    let test = TestDependencies::new()
        .profile_repository(MemoryProfileRepository::new().with_candidate(candidate.clone()));
    let job = enqueue(
        &test,
        JobPayload::ProfileEnrichment(ProfileEnrichmentPayload {
            contractor_ids: vec![candidate.id],
        }),
    )
    .await;

    // Claimed by a worker that then died without finishing.
    let claimed = test.queue.claim_ready("crashed-worker", 1, test.now()).await.unwrap();
    assert_eq!(claimed.len(), 1);

    let runner = runner(&test, full_registry());
    assert!(runner.run_once().await.unwrap().is_empty());

    test.clock.advance(default_lease_duration() + chrono::Duration::minutes(1));
    assert_eq!(runner.run_once().await.unwrap(), vec![JobOutcome::Completed]);

    let stored = test.queue.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.attempts, 2);
    assert_eq!(stored.lease_expires_at, None);
}
