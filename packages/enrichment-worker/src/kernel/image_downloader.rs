//! Downloads reviewer photos to local storage.
//!
//! Images are fetched one at a time. An HTTP 429 stops the batch at once and
//! hands everything not yet downloaded back as `DownloadError::RateLimited`.

use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use super::{BaseImageDownloader, DownloadError};
use crate::common::ContractorId;
use crate::domains::images::models::{DownloadReport, DownloadedImage, ReviewImageRef};

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

pub struct HttpImageDownloader {
    client: reqwest::Client,
    storage_dir: PathBuf,
}

impl HttpImageDownloader {
    pub fn new(storage_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            storage_dir: storage_dir.into(),
        })
    }
}

/// File extension taken from the URL path, `jpg` when absent or unusual.
fn extension_for(url: &str) -> &'static str {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_default();
    let ext = path.rsplit('.').next().unwrap_or_default();
    ALLOWED_EXTENSIONS
        .iter()
        .find(|allowed| **allowed == ext)
        .copied()
        .unwrap_or("jpg")
}

#[async_trait]
impl BaseImageDownloader for HttpImageDownloader {
    async fn download_photos(
        &self,
        contractor_id: ContractorId,
        images: &[ReviewImageRef],
    ) -> Result<DownloadReport, DownloadError> {
        let dir = self.storage_dir.join(contractor_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create image directory {}", dir.display()))?;

        let mut report = DownloadReport::default();

        for (index, image) in images.iter().enumerate() {
            let response = match self.client.get(&image.original_url).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(url = %image.original_url, error = %e, "image request failed");
                    report.failed.push(image.clone());
                    continue;
                }
            };

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                debug!(
                    contractor_id = %contractor_id,
                    downloaded = report.downloaded.len(),
                    remaining = images.len() - index,
                    "image host rate limited"
                );
                return Err(DownloadError::RateLimited {
                    remaining: images[index..].to_vec(),
                    downloaded: report.downloaded,
                    failed: report.failed,
                });
            }
            if !response.status().is_success() {
                warn!(url = %image.original_url, status = %response.status(), "image download failed");
                report.failed.push(image.clone());
                continue;
            }

            let bytes = match response.bytes().await {
                Ok(b) => b,
                Err(e) => {
                    warn!(url = %image.original_url, error = %e, "image body read failed");
                    report.failed.push(image.clone());
                    continue;
                }
            };

            let file = dir.join(format!(
                "{}-{}.{}",
                image.review_id,
                index,
                extension_for(&image.original_url)
            ));
            tokio::fs::write(&file, &bytes)
                .await
                .with_context(|| format!("Failed to write image {}", file.display()))?;

            report.downloaded.push(DownloadedImage {
                review_id: image.review_id,
                original_url: image.original_url.clone(),
                stored_url: file.to_string_lossy().into_owned(),
            });
        }

        Ok(report)
    }
}
