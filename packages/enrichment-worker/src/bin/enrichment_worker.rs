// Main entry point for the enrichment worker

use std::sync::Arc;

use anyhow::{Context, Result};
use enrichment_core::domains::images::ImageRetryExecutor;
use enrichment_core::domains::profiles::{PostgresProfileRepository, ProfileEnrichmentExecutor};
use enrichment_core::domains::reviews::{PostgresReviewRepository, ReviewEnrichmentExecutor};
use enrichment_core::kernel::http_crawler::HttpCrawlerConfig;
use enrichment_core::kernel::jobs::{JobExecutorRegistry, JobRunner, JobService, PostgresEventLogger, PostgresJobQueue};
use enrichment_core::kernel::{
    HttpCrawlerEngine, HttpImageDownloader, OpenAiClient, ReviewsApiAdapter, SystemClock, WorkerDeps,
};
use enrichment_core::Config;
use reviews_client::ReviewsClient;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,enrichment_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting enrichment worker");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let clock = Arc::new(SystemClock);
    let queue = Arc::new(PostgresJobQueue::new(pool.clone()).with_lease_duration(config.job_lease()));

    let ai = OpenAiClient::new(&config.openai_api_key, &config.openai_model)
        .context("Failed to create OpenAI client")?;
    let reviews_client = ReviewsClient::new(
        &config.reviews_api_base_url,
        &config.reviews_api_login,
        &config.reviews_api_password,
    )
    .context("Failed to create reviews API client")?;
    let image_downloader =
        HttpImageDownloader::new(&config.image_storage_dir).context("Failed to create image downloader")?;

    let deps = Arc::new(
        WorkerDeps::builder()
            .jobs(JobService::new(queue.clone(), clock.clone()))
            .events(Arc::new(PostgresEventLogger::new(pool.clone())))
            .crawler(Arc::new(HttpCrawlerEngine::new(HttpCrawlerConfig::default())))
            .ai(Arc::new(ai))
            .reviews_api(Arc::new(ReviewsApiAdapter::new(reviews_client)))
            .image_downloader(Arc::new(image_downloader))
            .profiles(Arc::new(PostgresProfileRepository::new(pool.clone())))
            .reviews(Arc::new(PostgresReviewRepository::new(pool.clone())))
            .clock(clock)
            .build(),
    );

    let mut registry = JobExecutorRegistry::new();
    registry
        .register(ProfileEnrichmentExecutor::new(config.profile_config()))
        .register(ReviewEnrichmentExecutor::new(config.review_config()))
        .register(ImageRetryExecutor::new());

    let runner = JobRunner::with_config(queue, Arc::new(registry), deps, config.runner_config());
    runner.run_until_shutdown().await?;

    tracing::info!("Enrichment worker stopped");
    Ok(())
}
