//! Contractor profile persistence.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::extraction::ExtractedProfile;
use super::models::{Category, EnrichmentCandidate, ProfileEnrichmentStatus};
use crate::common::{CategoryId, ContractorId};

#[async_trait]
pub trait BaseProfileRepository: Send + Sync {
    async fn find_candidate(&self, id: ContractorId) -> Result<Option<EnrichmentCandidate>>;

    async fn load_taxonomy(&self) -> Result<Vec<Category>>;

    async fn save_extracted_profile(&self, id: ContractorId, profile: &ExtractedProfile) -> Result<()>;

    /// Replaces the contractor's category assignments.
    async fn assign_categories(&self, id: ContractorId, category_ids: &[CategoryId]) -> Result<()>;

    async fn set_enrichment_status(
        &self,
        id: ContractorId,
        status: ProfileEnrichmentStatus,
        error: Option<&str>,
    ) -> Result<()>;

    /// Queues the contractor for a scraper that can get past bot protection.
    async fn flag_for_elevated_scraping(&self, id: ContractorId, reason: &str) -> Result<()>;
}

#[derive(FromRow)]
struct CandidateRow {
    id: Uuid,
    company_name: String,
    website: Option<String>,
    description: Option<String>,
    city: Option<String>,
    state: Option<String>,
}

#[derive(FromRow)]
struct CategoryRow {
    id: Uuid,
    slug: String,
    name: String,
    description: Option<String>,
}

#[derive(Clone)]
pub struct PostgresProfileRepository {
    pool: PgPool,
}

impl PostgresProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseProfileRepository for PostgresProfileRepository {
    async fn find_candidate(&self, id: ContractorId) -> Result<Option<EnrichmentCandidate>> {
        let row: Option<CandidateRow> = sqlx::query_as(
            "SELECT id, company_name, website, description, city, state FROM contractors WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load contractor")?;

        Ok(row.map(|r| EnrichmentCandidate {
            id: ContractorId::from_uuid(r.id),
            company_name: r.company_name,
            website: r.website,
            description: r.description,
            city: r.city,
            state: r.state,
        }))
    }

    async fn load_taxonomy(&self) -> Result<Vec<Category>> {
        let rows: Vec<CategoryRow> =
            sqlx::query_as("SELECT id, slug, name, description FROM categories ORDER BY name")
                .fetch_all(&self.pool)
                .await
                .context("Failed to load categories")?;

        Ok(rows
            .into_iter()
            .map(|r| Category {
                id: CategoryId::from_uuid(r.id),
                slug: r.slug,
                name: r.name,
                description: r.description,
            })
            .collect())
    }

    async fn save_extracted_profile(&self, id: ContractorId, profile: &ExtractedProfile) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE contractors
            SET description = COALESCE($2, description),
                phone = COALESCE($3, phone),
                email = COALESCE($4, email),
                address = COALESCE($5, address),
                city = COALESCE($6, city),
                state = COALESCE($7, state),
                services = $8,
                service_areas = $9,
                year_established = COALESCE($10, year_established),
                license_number = COALESCE($11, license_number),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&profile.description)
        .bind(&profile.phone)
        .bind(&profile.email)
        .bind(&profile.address)
        .bind(&profile.city)
        .bind(&profile.state)
        .bind(&profile.services)
        .bind(&profile.service_areas)
        .bind(profile.year_established)
        .bind(&profile.license_number)
        .execute(&self.pool)
        .await
        .context("Failed to save extracted profile")?;
        Ok(())
    }

    async fn assign_categories(&self, id: ContractorId, category_ids: &[CategoryId]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to open transaction")?;
        sqlx::query("DELETE FROM contractor_categories WHERE contractor_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear categories")?;
        sqlx::query(
            r#"
            INSERT INTO contractor_categories (contractor_id, category_id)
            SELECT $1, UNNEST($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id)
        .bind(category_ids)
        .execute(&mut *tx)
        .await
        .context("Failed to assign categories")?;
        tx.commit().await.context("Failed to commit categories")?;
        Ok(())
    }

    async fn set_enrichment_status(
        &self,
        id: ContractorId,
        status: ProfileEnrichmentStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE contractors
            SET profile_enrichment_status = $2,
                profile_enrichment_error = $3,
                profile_enriched_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to update profile enrichment status")?;
        Ok(())
    }

    async fn flag_for_elevated_scraping(&self, id: ContractorId, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE contractors
            SET needs_elevated_scraping = TRUE,
                elevated_scraping_reason = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .context("Failed to flag contractor for elevated scraping")?;
        Ok(())
    }
}
