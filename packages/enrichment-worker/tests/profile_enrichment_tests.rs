//! Profile enrichment tests: per-item outcomes, crawler faults and session
//! cleanup.

mod common;

use enrichment_core::common::JobId;
use enrichment_core::domains::profiles::extraction::ExtractedProfile;
use enrichment_core::domains::profiles::models::{
    ProfileEnrichmentPayload, ProfileEnrichmentStatus, ProfileItemStatus,
};
use enrichment_core::domains::profiles::ProfileEnrichmentExecutor;
use enrichment_core::kernel::jobs::{JobError, JobExecutor, JobResult, ProgressReporter};
use enrichment_core::kernel::test_dependencies::{
    sample_taxonomy, MemoryProfileRepository, MockAI, MockCrawlerEngine, TestDependencies,
};
use enrichment_core::kernel::{CrawlOutcome, CrawlerFault};

use crate::common::profile_candidate;

fn executor() -> ProfileEnrichmentExecutor {
    ProfileEnrichmentExecutor::default()
}

#[tokio::test]
async fn crawler_crash_aborts_with_partial_result_and_closes_session() {
    let first = profile_candidate("First Co", Some("https://first.example.com"));
    let second = profile_candidate("Second Co", Some("https://second.example.com"));
    let third = profile_candidate("Third Co", Some("https://third.example.com"));
    let ids = vec![first.id, second.id, third.id];

    let test = TestDependencies::new()
        .mock_crawler(
            MockCrawlerEngine::new().with_fault(
                "https://second.example.com",
                CrawlerFault::Crashed("browser process exited".into()),
            ),
        )
        .profile_repository(
            MemoryProfileRepository::new()
                .with_taxonomy(sample_taxonomy())
                .with_candidate(first.clone())
                .with_candidate(second)
                .with_candidate(third),
        );

    let err = executor()
        .execute(ProfileEnrichmentPayload { contractor_ids: ids }, &test.context(JobId::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::SystemFailure { .. }));
    let Some(JobResult::ProfileEnrichment(partial)) = err.partial() else {
        panic!("expected a partial profile result, got {:?}", err.partial());
    };
    assert_eq!(partial.processed, 1);
    assert_eq!(partial.successful, 1);
    assert_eq!(partial.results[0].contractor_id, first.id);

    assert_eq!(test.crawler.launched(), 1);
    assert_eq!(test.crawler.closed(), 1);
    assert!(!test.crawler.was_crawled("https://third.example.com"));
    assert!(test.profiles.saved_profile(first.id).is_some());
    assert!(test.events.has_event("profile_enrichment_aborted"));
}

#[tokio::test]
async fn crawler_that_cannot_start_fails_the_job() {
    let candidate = profile_candidate("Acme", Some("https://acme.example.com"));
    let test = TestDependencies::new()
        .mock_crawler(MockCrawlerEngine::new().failing_launch("no browser binary"))
        .profile_repository(MemoryProfileRepository::new().with_candidate(candidate.clone()));

    let err = executor()
        .execute(
            ProfileEnrichmentPayload {
                contractor_ids: vec![candidate.id],
            },
            &test.context(JobId::new()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::SystemFailure { .. }));
    assert!(err.to_string().contains("no browser binary"));
    assert_eq!(test.crawler.closed(), 0);
    assert_eq!(test.ai.call_count(), 0);
}

#[tokio::test]
async fn candidate_without_website_is_not_applicable() {
    let candidate = profile_candidate("Offline Co", None);
    let test = TestDependencies::new()
        .profile_repository(MemoryProfileRepository::new().with_candidate(candidate.clone()));

    let result = executor()
        .execute(
            ProfileEnrichmentPayload {
                contractor_ids: vec![candidate.id],
            },
            &test.context(JobId::new()),
        )
        .await
        .unwrap();

    assert_eq!(result.skipped, 1);
    assert_eq!(result.results[0].status, ProfileItemStatus::NotApplicable);
    assert!(test.crawler.crawl_calls().is_empty());
    assert_eq!(test.profiles.status_of(candidate.id), Some(ProfileEnrichmentStatus::NotApplicable));
    assert_eq!(test.crawler.closed(), 1);
}

#[tokio::test]
async fn bot_protection_flags_for_elevated_scraping() {
    let candidate = profile_candidate("Guarded Co", Some("https://guarded.example.com"));
    let test = TestDependencies::new()
        .mock_crawler(MockCrawlerEngine::new().with_outcome(
            "https://guarded.example.com",
            CrawlOutcome::bot_blocked("cloudflare challenge"),
        ))
        .profile_repository(MemoryProfileRepository::new().with_candidate(candidate.clone()));

    let result = executor()
        .execute(
            ProfileEnrichmentPayload {
                contractor_ids: vec![candidate.id],
            },
            &test.context(JobId::new()),
        )
        .await
        .unwrap();

    assert_eq!(result.bot_blocked, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(result.results[0].status, ProfileItemStatus::BotBlocked);
    assert_eq!(
        test.profiles.flagged_reason(candidate.id).as_deref(),
        Some("cloudflare challenge")
    );
    assert_eq!(test.profiles.status_of(candidate.id), Some(ProfileEnrichmentStatus::BotBlocked));
    assert_eq!(test.ai.call_count(), 0);
}

#[tokio::test]
async fn ordinary_crawl_failure_is_a_failed_item() {
    let candidate = profile_candidate("Broken Co", Some("https://broken.example.com"));
    let test = TestDependencies::new()
        .mock_crawler(
            MockCrawlerEngine::new().with_outcome("https://broken.example.com", CrawlOutcome::failed("dns error")),
        )
        .profile_repository(MemoryProfileRepository::new().with_candidate(candidate.clone()));

    let result = executor()
        .execute(
            ProfileEnrichmentPayload {
                contractor_ids: vec![candidate.id],
            },
            &test.context(JobId::new()),
        )
        .await
        .unwrap();

    assert_eq!(result.failed, 1);
    assert_eq!(result.results[0].error.as_deref(), Some("dns error"));
    assert!(test.profiles.flagged_reason(candidate.id).is_none());
}

#[tokio::test]
async fn extraction_failure_assigns_default_category() {
    let candidate = profile_candidate("Mystery Co", Some("https://mystery.example.com"));
    let taxonomy = sample_taxonomy();
    let general = taxonomy.iter().find(|c| c.slug == "general-contractor").unwrap().id;

    let test = TestDependencies::new()
        .mock_ai(MockAI::new().with_failure("model overloaded"))
        .profile_repository(
            MemoryProfileRepository::new()
                .with_taxonomy(taxonomy)
                .with_candidate(candidate.clone()),
        );

    let result = executor()
        .execute(
            ProfileEnrichmentPayload {
                contractor_ids: vec![candidate.id],
            },
            &test.context(JobId::new()),
        )
        .await
        .unwrap();

    assert_eq!(result.failed, 1);
    assert_eq!(result.results[0].categories, vec!["general-contractor"]);
    assert_eq!(test.profiles.categories_of(candidate.id), vec![general]);
    assert_eq!(test.profiles.status_of(candidate.id), Some(ProfileEnrichmentStatus::Failed));
}

#[tokio::test]
async fn successful_extraction_saves_profile_and_categories() {
    let candidate = profile_candidate("Acme Roofing", Some("https://acme.example.com"));
    let taxonomy = sample_taxonomy();
    let roofing = taxonomy.iter().find(|c| c.slug == "roofing").unwrap().id;
    let profile = ExtractedProfile {
        description: Some("Roof repair and replacement.".into()),
        phone: Some("612-555-0100".into()),
        category_slugs: vec!["Roofing".into(), "unknown-slug".into()],
        ..Default::default()
    };

    let test = TestDependencies::new()
        .mock_ai(MockAI::new().with_profile(&profile))
        .profile_repository(
            MemoryProfileRepository::new()
                .with_taxonomy(taxonomy)
                .with_candidate(candidate.clone()),
        );

    let result = executor()
        .execute(
            ProfileEnrichmentPayload {
                contractor_ids: vec![candidate.id],
            },
            &test.context(JobId::new()),
        )
        .await
        .unwrap();

    assert_eq!(result.successful, 1);
    assert_eq!(result.total_tokens, 150);
    assert!(result.total_cost_usd > 0.0);
    assert_eq!(test.profiles.categories_of(candidate.id), vec![roofing]);
    assert_eq!(test.profiles.saved_profile(candidate.id), Some(profile));
    assert_eq!(test.profiles.status_of(candidate.id), Some(ProfileEnrichmentStatus::Enriched));
    assert!(test.ai.calls()[0].contains("Acme Roofing"));
}

#[tokio::test]
async fn oversized_batch_is_truncated() {
    let candidates: Vec<_> = (0..12).map(|n| profile_candidate(&format!("Co {}", n), None)).collect();
    let ids = candidates.iter().map(|c| c.id).collect();
    let repository = candidates
        .into_iter()
        .fold(MemoryProfileRepository::new(), |repo, c| repo.with_candidate(c));
    let test = TestDependencies::new().profile_repository(repository);

    let result = executor()
        .execute(ProfileEnrichmentPayload { contractor_ids: ids }, &test.context(JobId::new()))
        .await
        .unwrap();

    assert_eq!(result.processed, 10);
    assert!(test.events.has_event("profile_batch_truncated"));
}

#[tokio::test]
async fn progress_reports_total_then_each_item() {
    let found = profile_candidate("Offline Co", None);
    let missing = profile_candidate("Ghost Co", Some("https://ghost.example.com"));
    let test = TestDependencies::new()
        .profile_repository(MemoryProfileRepository::new().with_candidate(found.clone()));

    let (progress, mut updates) = ProgressReporter::channel();
    let ctx = test.context(JobId::new()).with_progress(progress.clone());

    let result = executor()
        .execute(
            ProfileEnrichmentPayload {
                contractor_ids: vec![found.id, missing.id],
            },
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(result.skipped, 2);
    assert_eq!(result.results[1].error.as_deref(), Some("candidate not found"));

    let first = updates.recv().await.unwrap();
    assert_eq!(first.total_items, Some(2));

    let snapshot = progress.snapshot();
    assert_eq!(snapshot.total_items, Some(2));
    assert_eq!(snapshot.processed_items, Some(2));
    assert_eq!(snapshot.failed_items, Some(0));
}

#[tokio::test]
async fn duplicate_ids_are_crawled_once() {
    let candidate = profile_candidate("Acme", Some("https://acme.example.com"));
    let test = TestDependencies::new()
        .profile_repository(MemoryProfileRepository::new().with_candidate(candidate.clone()));

    let result = executor()
        .execute(
            ProfileEnrichmentPayload {
                contractor_ids: vec![candidate.id, candidate.id],
            },
            &test.context(JobId::new()),
        )
        .await
        .unwrap();

    assert_eq!(result.processed, 1);
    assert_eq!(test.crawler.crawl_calls().len(), 1);
    assert!(test.events.has_event("profile_duplicate_ids_dropped"));
}
