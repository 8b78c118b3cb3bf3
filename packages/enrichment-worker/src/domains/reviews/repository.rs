//! Review candidates and review rows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::models::{
    NewReview, ReviewEnrichmentCandidate, ReviewStatusUpdate, StoredReview, UpsertOutcome,
    FAILED_RETRY_HOURS, REVIEW_COOLDOWN_DAYS,
};
use crate::common::{ContractorId, ReviewId};
use crate::domains::images::models::DownloadedImage;

#[async_trait]
pub trait BaseReviewRepository: Send + Sync {
    async fn find_candidate(&self, id: ContractorId) -> Result<Option<ReviewEnrichmentCandidate>>;

    /// Next candidates for automatic selection: eligible, not failed within
    /// the retry window, least recently enriched first.
    async fn find_selectable_candidates(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReviewEnrichmentCandidate>>;

    async fn update_enrichment_status(&self, id: ContractorId, update: &ReviewStatusUpdate) -> Result<()>;

    /// Inserts or updates reviews keyed by external review id. Running it
    /// twice with the same reviews never creates duplicates.
    async fn upsert_reviews(&self, contractor_id: ContractorId, reviews: &[NewReview]) -> Result<UpsertOutcome>;

    /// Points downloaded images at their stored copy.
    async fn record_stored_images(&self, images: &[DownloadedImage]) -> Result<()>;
}

#[derive(FromRow)]
struct CandidateRow {
    id: Uuid,
    company_name: String,
    place_id: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    reviews_enriched_at: Option<DateTime<Utc>>,
    reviews_enrichment_failed_at: Option<DateTime<Utc>>,
}

impl From<CandidateRow> for ReviewEnrichmentCandidate {
    fn from(r: CandidateRow) -> Self {
        Self {
            id: ContractorId::from_uuid(r.id),
            company_name: r.company_name,
            place_id: r.place_id,
            latitude: r.latitude,
            longitude: r.longitude,
            last_enriched_at: r.reviews_enriched_at,
            last_failed_at: r.reviews_enrichment_failed_at,
        }
    }
}

const CANDIDATE_COLUMNS: &str = "id, company_name, place_id, latitude, longitude, \
     reviews_enriched_at, reviews_enrichment_failed_at";

#[derive(Clone)]
pub struct PostgresReviewRepository {
    pool: PgPool,
}

impl PostgresReviewRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseReviewRepository for PostgresReviewRepository {
    async fn find_candidate(&self, id: ContractorId) -> Result<Option<ReviewEnrichmentCandidate>> {
        let sql = format!("SELECT {CANDIDATE_COLUMNS} FROM contractors WHERE id = $1");
        let row: Option<CandidateRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load review candidate")?;
        Ok(row.map(Into::into))
    }

    async fn find_selectable_candidates(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReviewEnrichmentCandidate>> {
        let sql = format!(
            r#"
            SELECT {CANDIDATE_COLUMNS} FROM contractors
            WHERE place_id IS NOT NULL AND btrim(place_id) <> ''
              AND latitude IS NOT NULL AND longitude IS NOT NULL
              AND (reviews_enriched_at IS NULL OR reviews_enriched_at <= $1)
              AND (reviews_enrichment_failed_at IS NULL OR reviews_enrichment_failed_at <= $2)
            ORDER BY reviews_enriched_at NULLS FIRST, id
            LIMIT $3
            "#
        );
        let rows: Vec<CandidateRow> = sqlx::query_as(&sql)
            .bind(now - Duration::days(REVIEW_COOLDOWN_DAYS))
            .bind(now - Duration::hours(FAILED_RETRY_HOURS))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .context("Failed to select review candidates")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_enrichment_status(&self, id: ContractorId, update: &ReviewStatusUpdate) -> Result<()> {
        let query = match update {
            ReviewStatusUpdate::Pending => sqlx::query(
                "UPDATE contractors SET review_enrichment_status = 'pending', updated_at = NOW() WHERE id = $1",
            )
            .bind(id),
            ReviewStatusUpdate::Completed {
                review_count,
                enriched_at,
            } => sqlx::query(
                r#"
                UPDATE contractors
                SET review_enrichment_status = 'completed',
                    reviews_enriched_at = $2,
                    review_count = $3,
                    reviews_enrichment_error = NULL,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(*enriched_at)
            .bind(i32::try_from(*review_count).unwrap_or(i32::MAX)),
            ReviewStatusUpdate::Failed { error, failed_at } => sqlx::query(
                r#"
                UPDATE contractors
                SET review_enrichment_status = 'failed',
                    reviews_enrichment_error = $2,
                    reviews_enrichment_failed_at = $3,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(error.as_str())
            .bind(*failed_at),
        };

        query
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to set review status '{}'", update.status_str()))?;
        Ok(())
    }

    async fn upsert_reviews(&self, contractor_id: ContractorId, reviews: &[NewReview]) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();

        for review in reviews {
            let (id, inserted): (Uuid, bool) = sqlx::query_as(
                r#"
                INSERT INTO reviews (
                    id, contractor_id, external_review_id, rating, text, author_name,
                    author_photo_url, review_url, published_at, owner_response
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (external_review_id) DO UPDATE
                SET rating = EXCLUDED.rating,
                    text = EXCLUDED.text,
                    author_name = EXCLUDED.author_name,
                    author_photo_url = EXCLUDED.author_photo_url,
                    review_url = EXCLUDED.review_url,
                    owner_response = EXCLUDED.owner_response,
                    updated_at = NOW()
                RETURNING id, (xmax = 0) AS inserted
                "#,
            )
            .bind(ReviewId::new())
            .bind(contractor_id)
            .bind(&review.external_review_id)
            .bind(review.rating)
            .bind(&review.text)
            .bind(&review.author_name)
            .bind(&review.author_photo_url)
            .bind(&review.review_url)
            .bind(review.published_at)
            .bind(&review.owner_response)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to upsert review {}", review.external_review_id))?;

            if !review.image_urls.is_empty() {
                sqlx::query(
                    r#"
                    INSERT INTO review_images (review_id, original_url)
                    SELECT $1, UNNEST($2::text[])
                    ON CONFLICT (review_id, original_url) DO NOTHING
                    "#,
                )
                .bind(id)
                .bind(&review.image_urls)
                .execute(&self.pool)
                .await
                .context("Failed to record review images")?;
            }

            outcome.saved += 1;
            if inserted {
                outcome.inserted.push(StoredReview {
                    id: ReviewId::from_uuid(id),
                    contractor_id,
                    external_review_id: review.external_review_id.clone(),
                    image_urls: review.image_urls.clone(),
                });
            }
        }

        Ok(outcome)
    }

    async fn record_stored_images(&self, images: &[DownloadedImage]) -> Result<()> {
        for image in images {
            sqlx::query(
                r#"
                UPDATE review_images
                SET stored_url = $3, downloaded_at = NOW()
                WHERE review_id = $1 AND original_url = $2
                "#,
            )
            .bind(image.review_id)
            .bind(&image.original_url)
            .bind(&image.stored_url)
            .execute(&self.pool)
            .await
            .context("Failed to record stored image")?;
        }
        Ok(())
    }
}
