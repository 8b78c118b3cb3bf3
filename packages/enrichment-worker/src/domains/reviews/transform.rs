//! Mapping from reviews API records to review rows.

use std::collections::HashSet;

use super::models::NewReview;
use crate::kernel::ExternalReview;

/// Converts fetched reviews into upsert rows.
///
/// Reviews without an external id cannot be upserted idempotently and are
/// dropped. Repeated ids keep their first occurrence. Blank text fields
/// become `None` and image URLs are trimmed and deduplicated.
pub fn to_new_reviews(reviews: &[ExternalReview]) -> Vec<NewReview> {
    let mut seen = HashSet::new();

    reviews
        .iter()
        .filter_map(|review| {
            let external_id = review.external_review_id.trim();
            if external_id.is_empty() || !seen.insert(external_id.to_string()) {
                return None;
            }

            let mut image_urls: Vec<String> = Vec::new();
            for url in review.image_urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
                if !image_urls.iter().any(|existing| existing == url) {
                    image_urls.push(url.to_string());
                }
            }

            Some(NewReview {
                external_review_id: external_id.to_string(),
                rating: review.rating,
                text: non_blank(&review.text),
                author_name: non_blank(&review.author_name),
                author_photo_url: non_blank(&review.author_photo_url),
                review_url: non_blank(&review.review_url),
                published_at: review.published_at,
                owner_response: non_blank(&review.owner_response),
                image_urls,
            })
        })
        .collect()
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(id: &str) -> ExternalReview {
        ExternalReview {
            external_review_id: id.to_string(),
            rating: Some(5.0),
            text: Some("Great crew".into()),
            author_name: Some("Sam".into()),
            author_photo_url: None,
            review_url: None,
            published_at: None,
            owner_response: Some("   ".into()),
            image_urls: vec![],
        }
    }

    #[test]
    fn drops_reviews_without_id() {
        let rows = to_new_reviews(&[review(""), review("  "), review("r-1")]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].external_review_id, "r-1");
    }

    #[test]
    fn keeps_first_of_duplicate_ids() {
        let mut second = review("r-1");
        second.text = Some("later copy".into());
        let rows = to_new_reviews(&[review("r-1"), second]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text.as_deref(), Some("Great crew"));
    }

    #[test]
    fn blank_fields_become_none() {
        let rows = to_new_reviews(&[review("r-1")]);
        assert_eq!(rows[0].owner_response, None);
    }

    #[test]
    fn image_urls_are_cleaned() {
        let mut r = review("r-1");
        r.image_urls = vec![
            "https://img/a.jpg".into(),
            " https://img/a.jpg ".into(),
            "".into(),
            "https://img/b.jpg".into(),
        ];
        let rows = to_new_reviews(&[r]);
        assert_eq!(rows[0].image_urls, vec!["https://img/a.jpg", "https://img/b.jpg"]);
    }
}
