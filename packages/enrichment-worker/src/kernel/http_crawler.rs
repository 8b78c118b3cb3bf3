//! HTTP crawler - reqwest + scraper + htmd.
//!
//! Fetches a site's homepage plus a few same-domain pages that usually
//! describe the business (about, services, contact) and returns them as one
//! Markdown document. No JavaScript rendering, so sites behind a challenge
//! page are reported as bot-blocked.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{BaseCrawlSession, BaseCrawlerEngine, CrawlOutcome, CrawlerFault};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Markers of challenge / captcha interstitials.
const BOT_CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "challenge-platform",
    "just a moment...",
    "attention required! | cloudflare",
    "captcha",
    "ddos-guard",
    "are you a robot",
    "access denied",
    "_incapsula_resource",
];

/// Path fragments worth following from the homepage, best first.
const PRIORITY_PATHS: &[&str] = &["about", "service", "contact", "team", "project", "area"];

#[derive(Debug, Clone)]
pub struct HttpCrawlerConfig {
    pub max_pages: usize,
    pub request_timeout: Duration,
    pub max_content_chars: usize,
}

impl Default for HttpCrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 5,
            request_timeout: Duration::from_secs(30),
            max_content_chars: 60_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpCrawlerEngine {
    config: HttpCrawlerConfig,
}

impl HttpCrawlerEngine {
    pub fn new(config: HttpCrawlerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BaseCrawlerEngine for HttpCrawlerEngine {
    async fn launch(&self) -> Result<Box<dyn BaseCrawlSession>, CrawlerFault> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.5"),
        );

        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| CrawlerFault::Launch(e.to_string()))?;

        Ok(Box::new(HttpCrawlSession {
            client: Some(client),
            config: self.config.clone(),
        }))
    }
}

pub struct HttpCrawlSession {
    client: Option<reqwest::Client>,
    config: HttpCrawlerConfig,
}

enum Fetched {
    Html(String),
    Blocked(String),
    Failed(String),
}

impl HttpCrawlSession {
    async fn fetch(client: &reqwest::Client, url: &str) -> Fetched {
        let response = match client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return Fetched::Failed(format!("request failed: {}", e)),
        };
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if detect_bot_protection(status, &body) {
            return Fetched::Blocked(format!("bot protection detected (HTTP {})", status));
        }
        if !(200..300).contains(&status) {
            return Fetched::Failed(format!("HTTP {} for {}", status, url));
        }
        Fetched::Html(body)
    }
}

#[async_trait]
impl BaseCrawlSession for HttpCrawlSession {
    async fn crawl(&mut self, url: &str) -> Result<CrawlOutcome, CrawlerFault> {
        let client = self
            .client
            .clone()
            .ok_or_else(|| CrawlerFault::Crashed("session already closed".into()))?;

        let start = normalize_url(url);
        let base = match Url::parse(&start) {
            Ok(u) => u,
            Err(e) => return Ok(CrawlOutcome::failed(format!("invalid url {}: {}", url, e))),
        };

        let home = match Self::fetch(&client, &start).await {
            Fetched::Html(html) => html,
            Fetched::Blocked(reason) => return Ok(CrawlOutcome::bot_blocked(reason)),
            Fetched::Failed(error) => return Ok(CrawlOutcome::failed(error)),
        };

        let (home_markdown, links) = parse_page(&home, &base);
        let mut sections = vec![format!("## Page: {}\n\n{}", start, home_markdown)];
        let mut pages = 1u32;

        for link in pick_links(links, self.config.max_pages.saturating_sub(1)) {
            match Self::fetch(&client, &link).await {
                Fetched::Html(html) => {
                    let (markdown, _) = parse_page(&html, &base);
                    if markdown.trim().len() >= 50 {
                        sections.push(format!("## Page: {}\n\n{}", link, markdown));
                        pages += 1;
                    }
                }
                Fetched::Blocked(reason) | Fetched::Failed(reason) => {
                    debug!(url = %link, reason = %reason, "skipping sub-page");
                }
            }
        }

        let mut content = sections.join("\n\n");
        if content.len() > self.config.max_content_chars {
            let cut = floor_char_boundary(&content, self.config.max_content_chars);
            content.truncate(cut);
        }
        if content.trim().is_empty() {
            warn!(url = %start, "crawl produced no content");
            return Ok(CrawlOutcome::failed("no content extracted"));
        }

        Ok(CrawlOutcome::succeeded(content, pages))
    }

    async fn close(&mut self) {
        self.client = None;
    }
}

/// Whether a response looks like a bot challenge rather than the real site.
pub fn detect_bot_protection(status: u16, body: &str) -> bool {
    let lower = body.to_lowercase();
    let has_marker = BOT_CHALLENGE_MARKERS.iter().any(|m| lower.contains(m));
    match status {
        403 | 429 | 503 => has_marker || lower.contains("cloudflare") || body.trim().is_empty(),
        // A normal page may mention "captcha" in a form; only short pages count.
        200..=299 => has_marker && lower.len() < 20_000,
        _ => false,
    }
}

fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut cut = max.min(s.len());
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

/// Main content as Markdown plus same-domain links.
fn parse_page(html: &str, base: &Url) -> (String, Vec<String>) {
    let document = Html::parse_document(html);
    let content_html = main_content(&document);
    let markdown = htmd::convert(&content_html)
        .unwrap_or_else(|_| document.root_element().text().collect::<String>());
    (markdown, same_domain_links(&document, base))
}

fn main_content(document: &Html) -> String {
    for selector in ["main", "article", "[role='main']", "#content", "#main", ".content"] {
        if let Ok(selector) = Selector::parse(selector) {
            if let Some(el) = document.select(&selector).next() {
                return el.html();
            }
        }
    }

    let unwanted = ["script", "style", "noscript", "iframe", "nav", "footer"];
    let mut html = match Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next().map(|b| b.html()))
    {
        Some(body) => body,
        None => return document.html(),
    };
    for tag in unwanted {
        if let Ok(selector) = Selector::parse(tag) {
            for el in document.select(&selector) {
                html = html.replace(&el.html(), "");
            }
        }
    }
    html
}

fn same_domain_links(document: &Html, base: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let domain = base.domain().unwrap_or("");

    let mut seen = HashSet::new();
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter(|u| u.domain() == Some(domain) && matches!(u.scheme(), "http" | "https"))
        .map(|mut u| {
            u.set_query(None);
            u.set_fragment(None);
            u.to_string()
        })
        .filter(|u| u.trim_end_matches('/') != base.as_str().trim_end_matches('/'))
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

/// Keeps links whose path hints at business details, best first.
fn pick_links(links: Vec<String>, limit: usize) -> Vec<String> {
    let mut scored: Vec<(usize, String)> = links
        .into_iter()
        .filter_map(|link| {
            let lower = link.to_lowercase();
            PRIORITY_PATHS
                .iter()
                .position(|p| lower.contains(p))
                .map(|rank| (rank, link))
        })
        .collect();
    scored.sort_by_key(|(rank, _)| *rank);
    scored.into_iter().take(limit).map(|(_, link)| link).collect()
}
