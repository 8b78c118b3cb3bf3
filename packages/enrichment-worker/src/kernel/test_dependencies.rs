// TestDependencies - in-memory collaborators for tests
//
// Every mock records its calls so tests can assert on what an executor did
// (or did not) touch. `TestDependencies::deps()` wires them into a
// `WorkerDeps` backed by a memory job queue, memory event log and a manual
// clock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::jobs::{BaseEventLogger, JobContext, JobQueue, JobService, MemoryEventLogger, MemoryJobQueue};
use super::{
    BaseAI, BaseCrawlSession, BaseCrawlerEngine, BaseImageDownloader, BaseReviewsApi, Clock, CrawlOutcome,
    CrawlerFault, DownloadError, ExternalReview, FetchedReviews, ManualClock, ReviewTaskSpec, StructuredCompletion,
    SubmittedReviewTask, TokenUsage, WorkerDeps,
};
use crate::common::{CategoryId, ContractorId, JobId, ReviewId};
use crate::domains::images::models::{DownloadReport, DownloadedImage, ReviewImageRef};
use crate::domains::profiles::extraction::ExtractedProfile;
use crate::domains::profiles::models::{Category, EnrichmentCandidate, ProfileEnrichmentStatus};
use crate::domains::profiles::repository::BaseProfileRepository;
use crate::domains::reviews::models::{
    NewReview, ReviewEnrichmentCandidate, ReviewStatusUpdate, StoredReview, UpsertOutcome,
};
use crate::domains::reviews::repository::BaseReviewRepository;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// Mock Crawler
// =============================================================================

#[derive(Debug, Clone)]
enum ScriptedCrawl {
    Outcome(CrawlOutcome),
    Fault(CrawlerFault),
}

/// Crawler whose sessions answer from a per-URL script. Unscripted URLs
/// crawl successfully with placeholder content.
pub struct MockCrawlerEngine {
    launch_failure: Option<String>,
    script: Arc<Mutex<HashMap<String, ScriptedCrawl>>>,
    crawl_calls: Arc<Mutex<Vec<String>>>,
    launched: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MockCrawlerEngine {
    pub fn new() -> Self {
        Self {
            launch_failure: None,
            script: Arc::new(Mutex::new(HashMap::new())),
            crawl_calls: Arc::new(Mutex::new(Vec::new())),
            launched: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make `launch` fail.
    pub fn failing_launch(mut self, message: &str) -> Self {
        self.launch_failure = Some(message.to_string());
        self
    }

    pub fn with_outcome(self, url: &str, outcome: CrawlOutcome) -> Self {
        lock(&self.script).insert(url.to_string(), ScriptedCrawl::Outcome(outcome));
        self
    }

    /// Crawling `url` breaks the session.
    pub fn with_fault(self, url: &str, fault: CrawlerFault) -> Self {
        lock(&self.script).insert(url.to_string(), ScriptedCrawl::Fault(fault));
        self
    }

    pub fn crawl_calls(&self) -> Vec<String> {
        lock(&self.crawl_calls).clone()
    }

    pub fn was_crawled(&self, url: &str) -> bool {
        lock(&self.crawl_calls).iter().any(|u| u == url)
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MockCrawlerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseCrawlerEngine for MockCrawlerEngine {
    async fn launch(&self) -> Result<Box<dyn BaseCrawlSession>, CrawlerFault> {
        if let Some(message) = &self.launch_failure {
            return Err(CrawlerFault::Launch(message.clone()));
        }
        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockCrawlSession {
            script: self.script.clone(),
            crawl_calls: self.crawl_calls.clone(),
            closed: self.closed.clone(),
        }))
    }
}

struct MockCrawlSession {
    script: Arc<Mutex<HashMap<String, ScriptedCrawl>>>,
    crawl_calls: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl BaseCrawlSession for MockCrawlSession {
    async fn crawl(&mut self, url: &str) -> Result<CrawlOutcome, CrawlerFault> {
        lock(&self.crawl_calls).push(url.to_string());
        match lock(&self.script).get(url).cloned() {
            Some(ScriptedCrawl::Outcome(outcome)) => Ok(outcome),
            Some(ScriptedCrawl::Fault(fault)) => Err(fault),
            None => Ok(CrawlOutcome::succeeded(
                format!("# {}\n\nFamily-owned contractor serving the metro area.", url),
                1,
            )),
        }
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Mock AI
// =============================================================================

/// AI answering from a queue of responses, then with a default profile.
pub struct MockAI {
    responses: Mutex<VecDeque<Result<String, String>>>,
    default_response: String,
    calls: Mutex<Vec<String>>,
}

impl MockAI {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: serde_json::json!({
                "description": "Residential contractor.",
                "services": ["repairs"],
                "category_slugs": []
            })
            .to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a raw JSON answer.
    pub fn with_response(self, json: &str) -> Self {
        lock(&self.responses).push_back(Ok(json.to_string()));
        self
    }

    pub fn with_profile(self, profile: &ExtractedProfile) -> Self {
        let json = serde_json::to_string(profile).unwrap_or_default();
        self.with_response(&json)
    }

    /// Queue a failed request.
    pub fn with_failure(self, message: &str) -> Self {
        lock(&self.responses).push_back(Err(message.to_string()));
        self
    }

    /// User prompts received, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

impl Default for MockAI {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseAI for MockAI {
    async fn generate_structured(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _schema: serde_json::Value,
    ) -> Result<StructuredCompletion> {
        lock(&self.calls).push(user_prompt.to_string());
        let next = lock(&self.responses).pop_front();
        let content = match next {
            Some(Ok(content)) => content,
            Some(Err(message)) => return Err(anyhow!(message)),
            None => self.default_response.clone(),
        };
        Ok(StructuredCompletion {
            content,
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 50,
                total_tokens: 150,
            },
            cost_usd: 0.0001,
        })
    }
}

// =============================================================================
// Mock Reviews API
// =============================================================================

/// Cost reported for every accepted task.
pub const MOCK_TASK_COST: f64 = 0.00075;

/// Reviews API keyed by place id. Task ids are `task-{place_id}`.
pub struct MockReviewsApi {
    reviews: HashMap<String, Vec<ExternalReview>>,
    submit_failure: Option<String>,
    rejected: HashSet<String>,
    never_ready: HashSet<String>,
    fetch_failures: HashSet<String>,
    submitted: Mutex<Vec<ReviewTaskSpec>>,
    submit_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    fetch_calls: Mutex<Vec<String>>,
}

impl MockReviewsApi {
    pub fn new() -> Self {
        Self {
            reviews: HashMap::new(),
            submit_failure: None,
            rejected: HashSet::new(),
            never_ready: HashSet::new(),
            fetch_failures: HashSet::new(),
            submitted: Mutex::new(Vec::new()),
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            fetch_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn task_id_for(place_id: &str) -> String {
        format!("task-{}", place_id)
    }

    pub fn with_reviews(mut self, place_id: &str, reviews: Vec<ExternalReview>) -> Self {
        self.reviews.insert(place_id.to_string(), reviews);
        self
    }

    /// The whole submission call fails.
    pub fn failing_submit(mut self, message: &str) -> Self {
        self.submit_failure = Some(message.to_string());
        self
    }

    /// The API refuses the task for this place.
    pub fn rejecting(mut self, place_id: &str) -> Self {
        self.rejected.insert(place_id.to_string());
        self
    }

    /// The task for this place never becomes ready.
    pub fn never_ready(mut self, place_id: &str) -> Self {
        self.never_ready.insert(place_id.to_string());
        self
    }

    pub fn failing_fetch(mut self, place_id: &str) -> Self {
        self.fetch_failures.insert(place_id.to_string());
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn submitted_specs(&self) -> Vec<ReviewTaskSpec> {
        lock(&self.submitted).clone()
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> Vec<String> {
        lock(&self.fetch_calls).clone()
    }

    /// Calls of any kind made against the API.
    pub fn total_calls(&self) -> usize {
        self.submit_calls() + self.poll_calls() + lock(&self.fetch_calls).len()
    }
}

impl Default for MockReviewsApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseReviewsApi for MockReviewsApi {
    async fn submit_tasks(&self, tasks: &[ReviewTaskSpec]) -> Result<Vec<SubmittedReviewTask>> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.submit_failure {
            return Err(anyhow!(message.clone()));
        }

        lock(&self.submitted).extend(tasks.iter().cloned());
        Ok(tasks
            .iter()
            .map(|spec| {
                if self.rejected.contains(&spec.place_id) {
                    SubmittedReviewTask {
                        contractor_id: spec.contractor_id,
                        task_id: None,
                        error: Some("invalid place id".to_string()),
                        cost: 0.0,
                    }
                } else {
                    SubmittedReviewTask {
                        contractor_id: spec.contractor_id,
                        task_id: Some(Self::task_id_for(&spec.place_id)),
                        error: None,
                        cost: MOCK_TASK_COST,
                    }
                }
            })
            .collect())
    }

    async fn poll_ready(&self) -> Result<Vec<String>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.submitted)
            .iter()
            .filter(|spec| !self.rejected.contains(&spec.place_id) && !self.never_ready.contains(&spec.place_id))
            .map(|spec| Self::task_id_for(&spec.place_id))
            .collect())
    }

    async fn fetch_result(&self, task_id: &str) -> Result<FetchedReviews> {
        lock(&self.fetch_calls).push(task_id.to_string());
        let place_id = task_id.strip_prefix("task-").unwrap_or(task_id);
        if self.fetch_failures.contains(place_id) {
            return Err(anyhow!("task {} returned an error", task_id));
        }
        Ok(FetchedReviews {
            task_id: task_id.to_string(),
            reviews: self.reviews.get(place_id).cloned().unwrap_or_default(),
            cost: 0.0,
        })
    }
}

/// `count` reviews with ids `{prefix}-{n}`, each carrying `images_each`
/// photo URLs.
pub fn mock_reviews(prefix: &str, count: usize, images_each: usize) -> Vec<ExternalReview> {
    (1..=count)
        .map(|n| ExternalReview {
            external_review_id: format!("{}-{}", prefix, n),
            rating: Some(5.0),
            text: Some(format!("Review number {}", n)),
            author_name: Some(format!("Customer {}", n)),
            author_photo_url: None,
            review_url: None,
            published_at: None,
            owner_response: None,
            image_urls: (1..=images_each)
                .map(|i| format!("https://images.example.com/{}-{}/{}.jpg", prefix, n, i))
                .collect(),
        })
        .collect()
}

// =============================================================================
// Mock Image Downloader
// =============================================================================

/// Scripted behaviour for one `download_photos` call.
#[derive(Debug, Clone)]
pub enum MockDownload {
    Succeed,
    /// Download this many images, then report a rate limit.
    RateLimitAfter(usize),
    /// Download `downloaded` images, fail the next `failed`, then report a
    /// rate limit.
    RateLimitAfterFailures { downloaded: usize, failed: usize },
    Fail(String),
}

/// Downloader that plays its script call by call, succeeding once it runs
/// out.
pub struct MockImageDownloader {
    script: Mutex<VecDeque<MockDownload>>,
    calls: Mutex<Vec<(ContractorId, Vec<ReviewImageRef>)>>,
}

impl MockImageDownloader {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, step: MockDownload) -> Self {
        lock(&self.script).push_back(step);
        self
    }

    pub fn calls(&self) -> Vec<(ContractorId, Vec<ReviewImageRef>)> {
        lock(&self.calls).clone()
    }
}

impl Default for MockImageDownloader {
    fn default() -> Self {
        Self::new()
    }
}

fn stored(image: &ReviewImageRef, index: usize) -> DownloadedImage {
    DownloadedImage {
        review_id: image.review_id,
        original_url: image.original_url.clone(),
        stored_url: format!("file:///mock-storage/{}-{}.jpg", image.review_id, index),
    }
}

fn throttled(images: &[ReviewImageRef], downloaded: usize, failed: usize) -> DownloadError {
    let downloaded = downloaded.min(images.len());
    let failed_end = (downloaded + failed).min(images.len());
    DownloadError::RateLimited {
        downloaded: images[..downloaded].iter().enumerate().map(|(i, image)| stored(image, i)).collect(),
        failed: images[downloaded..failed_end].to_vec(),
        remaining: images[failed_end..].to_vec(),
    }
}

#[async_trait]
impl BaseImageDownloader for MockImageDownloader {
    async fn download_photos(
        &self,
        contractor_id: ContractorId,
        images: &[ReviewImageRef],
    ) -> Result<DownloadReport, DownloadError> {
        lock(&self.calls).push((contractor_id, images.to_vec()));
        let step = lock(&self.script).pop_front().unwrap_or(MockDownload::Succeed);

        match step {
            MockDownload::Succeed => Ok(DownloadReport {
                downloaded: images.iter().enumerate().map(|(i, image)| stored(image, i)).collect(),
                failed: Vec::new(),
            }),
            MockDownload::RateLimitAfter(n) => Err(throttled(images, n, 0)),
            MockDownload::RateLimitAfterFailures { downloaded, failed } => {
                Err(throttled(images, downloaded, failed))
            }
            MockDownload::Fail(message) => Err(DownloadError::Other(anyhow!(message))),
        }
    }
}

// =============================================================================
// Memory Profile Repository
// =============================================================================

#[derive(Default)]
pub struct MemoryProfileRepository {
    candidates: Mutex<HashMap<ContractorId, EnrichmentCandidate>>,
    taxonomy: Mutex<Vec<Category>>,
    taxonomy_failure: Option<String>,
    profiles: Mutex<HashMap<ContractorId, ExtractedProfile>>,
    categories: Mutex<HashMap<ContractorId, Vec<CategoryId>>>,
    statuses: Mutex<HashMap<ContractorId, (ProfileEnrichmentStatus, Option<String>)>>,
    elevated: Mutex<HashMap<ContractorId, String>>,
}

impl MemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidate(self, candidate: EnrichmentCandidate) -> Self {
        lock(&self.candidates).insert(candidate.id, candidate);
        self
    }

    pub fn with_taxonomy(self, taxonomy: Vec<Category>) -> Self {
        *lock(&self.taxonomy) = taxonomy;
        self
    }

    pub fn failing_taxonomy(mut self, message: &str) -> Self {
        self.taxonomy_failure = Some(message.to_string());
        self
    }

    pub fn saved_profile(&self, id: ContractorId) -> Option<ExtractedProfile> {
        lock(&self.profiles).get(&id).cloned()
    }

    pub fn categories_of(&self, id: ContractorId) -> Vec<CategoryId> {
        lock(&self.categories).get(&id).cloned().unwrap_or_default()
    }

    pub fn status_of(&self, id: ContractorId) -> Option<ProfileEnrichmentStatus> {
        lock(&self.statuses).get(&id).map(|(status, _)| *status)
    }

    pub fn flagged_reason(&self, id: ContractorId) -> Option<String> {
        lock(&self.elevated).get(&id).cloned()
    }
}

/// A small taxonomy including the default `general-contractor` entry.
pub fn sample_taxonomy() -> Vec<Category> {
    [
        ("general-contractor", "General Contractor"),
        ("roofing", "Roofing"),
        ("plumbing", "Plumbing"),
    ]
    .into_iter()
    .map(|(slug, name)| Category {
        id: CategoryId::new(),
        slug: slug.to_string(),
        name: name.to_string(),
        description: None,
    })
    .collect()
}

#[async_trait]
impl BaseProfileRepository for MemoryProfileRepository {
    async fn find_candidate(&self, id: ContractorId) -> Result<Option<EnrichmentCandidate>> {
        Ok(lock(&self.candidates).get(&id).cloned())
    }

    async fn load_taxonomy(&self) -> Result<Vec<Category>> {
        if let Some(message) = &self.taxonomy_failure {
            return Err(anyhow!(message.clone()));
        }
        Ok(lock(&self.taxonomy).clone())
    }

    async fn save_extracted_profile(&self, id: ContractorId, profile: &ExtractedProfile) -> Result<()> {
        lock(&self.profiles).insert(id, profile.clone());
        Ok(())
    }

    async fn assign_categories(&self, id: ContractorId, category_ids: &[CategoryId]) -> Result<()> {
        lock(&self.categories).insert(id, category_ids.to_vec());
        Ok(())
    }

    async fn set_enrichment_status(
        &self,
        id: ContractorId,
        status: ProfileEnrichmentStatus,
        error: Option<&str>,
    ) -> Result<()> {
        lock(&self.statuses).insert(id, (status, error.map(str::to_string)));
        Ok(())
    }

    async fn flag_for_elevated_scraping(&self, id: ContractorId, reason: &str) -> Result<()> {
        lock(&self.elevated).insert(id, reason.to_string());
        Ok(())
    }
}

// =============================================================================
// Memory Review Repository
// =============================================================================

#[derive(Default)]
pub struct MemoryReviewRepository {
    candidates: Mutex<HashMap<ContractorId, ReviewEnrichmentCandidate>>,
    status_history: Mutex<HashMap<ContractorId, Vec<ReviewStatusUpdate>>>,
    reviews: Mutex<HashMap<String, (StoredReview, NewReview)>>,
    stored_images: Mutex<Vec<DownloadedImage>>,
    candidate_lookups: AtomicUsize,
}

impl MemoryReviewRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidate(self, candidate: ReviewEnrichmentCandidate) -> Self {
        self.insert_candidate(candidate);
        self
    }

    pub fn insert_candidate(&self, candidate: ReviewEnrichmentCandidate) {
        lock(&self.candidates).insert(candidate.id, candidate);
    }

    pub fn candidate(&self, id: ContractorId) -> Option<ReviewEnrichmentCandidate> {
        lock(&self.candidates).get(&id).cloned()
    }

    pub fn status_history(&self, id: ContractorId) -> Vec<ReviewStatusUpdate> {
        lock(&self.status_history).get(&id).cloned().unwrap_or_default()
    }

    pub fn last_status(&self, id: ContractorId) -> Option<ReviewStatusUpdate> {
        self.status_history(id).pop()
    }

    pub fn reviews_for(&self, contractor_id: ContractorId) -> Vec<StoredReview> {
        let mut reviews: Vec<StoredReview> = lock(&self.reviews)
            .values()
            .filter(|(stored, _)| stored.contractor_id == contractor_id)
            .map(|(stored, _)| stored.clone())
            .collect();
        reviews.sort_by(|a, b| a.external_review_id.cmp(&b.external_review_id));
        reviews
    }

    pub fn review_count(&self) -> usize {
        lock(&self.reviews).len()
    }

    pub fn stored_images(&self) -> Vec<DownloadedImage> {
        lock(&self.stored_images).clone()
    }

    pub fn candidate_lookups(&self) -> usize {
        self.candidate_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BaseReviewRepository for MemoryReviewRepository {
    async fn find_candidate(&self, id: ContractorId) -> Result<Option<ReviewEnrichmentCandidate>> {
        self.candidate_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.candidates).get(&id).cloned())
    }

    async fn find_selectable_candidates(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReviewEnrichmentCandidate>> {
        let mut selectable: Vec<ReviewEnrichmentCandidate> = lock(&self.candidates)
            .values()
            .filter(|c| c.is_selectable(now))
            .cloned()
            .collect();
        selectable.sort_by(|a, b| (a.last_enriched_at, a.id).cmp(&(b.last_enriched_at, b.id)));
        selectable.truncate(limit);
        Ok(selectable)
    }

    async fn update_enrichment_status(&self, id: ContractorId, update: &ReviewStatusUpdate) -> Result<()> {
        if let Some(candidate) = lock(&self.candidates).get_mut(&id) {
            match update {
                ReviewStatusUpdate::Pending => {}
                ReviewStatusUpdate::Completed { enriched_at, .. } => candidate.last_enriched_at = Some(*enriched_at),
                ReviewStatusUpdate::Failed { failed_at, .. } => candidate.last_failed_at = Some(*failed_at),
            }
        }
        lock(&self.status_history).entry(id).or_default().push(update.clone());
        Ok(())
    }

    async fn upsert_reviews(&self, contractor_id: ContractorId, reviews: &[NewReview]) -> Result<UpsertOutcome> {
        let mut rows = lock(&self.reviews);
        let mut outcome = UpsertOutcome::default();

        for review in reviews {
            match rows.get_mut(&review.external_review_id) {
                Some((_, existing)) => *existing = review.clone(),
                None => {
                    let stored = StoredReview {
                        id: ReviewId::new(),
                        contractor_id,
                        external_review_id: review.external_review_id.clone(),
                        image_urls: review.image_urls.clone(),
                    };
                    outcome.inserted.push(stored.clone());
                    rows.insert(review.external_review_id.clone(), (stored, review.clone()));
                }
            }
            outcome.saved += 1;
        }
        Ok(outcome)
    }

    async fn record_stored_images(&self, images: &[DownloadedImage]) -> Result<()> {
        lock(&self.stored_images).extend(images.iter().cloned());
        Ok(())
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub queue: Arc<MemoryJobQueue>,
    pub events: Arc<MemoryEventLogger>,
    pub crawler: Arc<MockCrawlerEngine>,
    pub ai: Arc<MockAI>,
    pub reviews_api: Arc<MockReviewsApi>,
    pub images: Arc<MockImageDownloader>,
    pub profiles: Arc<MemoryProfileRepository>,
    pub reviews: Arc<MemoryReviewRepository>,
    pub clock: Arc<ManualClock>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(MemoryJobQueue::new()),
            events: Arc::new(MemoryEventLogger::new()),
            crawler: Arc::new(MockCrawlerEngine::new()),
            ai: Arc::new(MockAI::new()),
            reviews_api: Arc::new(MockReviewsApi::new()),
            images: Arc::new(MockImageDownloader::new()),
            profiles: Arc::new(MemoryProfileRepository::new()),
            reviews: Arc::new(MemoryReviewRepository::new()),
            clock: Arc::new(ManualClock::new(Utc::now())),
        }
    }

    pub fn mock_crawler(mut self, crawler: MockCrawlerEngine) -> Self {
        self.crawler = Arc::new(crawler);
        self
    }

    pub fn mock_ai(mut self, ai: MockAI) -> Self {
        self.ai = Arc::new(ai);
        self
    }

    pub fn mock_reviews_api(mut self, api: MockReviewsApi) -> Self {
        self.reviews_api = Arc::new(api);
        self
    }

    pub fn mock_images(mut self, images: MockImageDownloader) -> Self {
        self.images = Arc::new(images);
        self
    }

    pub fn profile_repository(mut self, repository: MemoryProfileRepository) -> Self {
        self.profiles = Arc::new(repository);
        self
    }

    pub fn review_repository(mut self, repository: MemoryReviewRepository) -> Self {
        self.reviews = Arc::new(repository);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn job_service(&self) -> JobService {
        let queue: Arc<dyn JobQueue> = self.queue.clone();
        let clock: Arc<dyn Clock> = self.clock.clone();
        JobService::new(queue, clock)
    }

    /// Wire the mocks into a dependency container.
    pub fn deps(&self) -> Arc<WorkerDeps> {
        let events: Arc<dyn BaseEventLogger> = self.events.clone();
        let crawler: Arc<dyn BaseCrawlerEngine> = self.crawler.clone();
        let ai: Arc<dyn BaseAI> = self.ai.clone();
        let reviews_api: Arc<dyn BaseReviewsApi> = self.reviews_api.clone();
        let image_downloader: Arc<dyn BaseImageDownloader> = self.images.clone();
        let profiles: Arc<dyn BaseProfileRepository> = self.profiles.clone();
        let reviews: Arc<dyn BaseReviewRepository> = self.reviews.clone();
        let clock: Arc<dyn Clock> = self.clock.clone();

        Arc::new(
            WorkerDeps::builder()
                .jobs(self.job_service())
                .events(events)
                .crawler(crawler)
                .ai(ai)
                .reviews_api(reviews_api)
                .image_downloader(image_downloader)
                .profiles(profiles)
                .reviews(reviews)
                .clock(clock)
                .build(),
        )
    }

    pub fn context(&self, job_id: JobId) -> JobContext {
        JobContext::new(job_id, self.deps())
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
