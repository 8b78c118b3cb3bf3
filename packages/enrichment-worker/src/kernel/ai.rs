// AI implementation using the OpenAI chat completions API.
//
// Infrastructure only: prompts and response types live in the domains.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{BaseAI, StructuredCompletion, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Deserialize)]
struct ChatResponseRaw {
    choices: Vec<ChatChoice>,
    usage: Option<UsageRaw>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageRaw {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// USD per million (prompt, completion) tokens.
fn price_per_million(model: &str) -> (f64, f64) {
    if model.starts_with("gpt-4o-mini") {
        (0.15, 0.60)
    } else if model.starts_with("gpt-4o") {
        (2.50, 10.00)
    } else if model.starts_with("gpt-4.1-mini") {
        (0.40, 1.60)
    } else {
        (0.15, 0.60)
    }
}

pub fn estimate_cost_usd(model: &str, usage: &TokenUsage) -> f64 {
    let (prompt, completion) = price_per_million(model);
    (f64::from(usage.prompt_tokens) * prompt + f64::from(usage.completion_tokens) * completion) / 1_000_000.0
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl BaseAI for OpenAiClient {
    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: serde_json::Value,
    ) -> Result<StructuredCompletion> {
        let start = std::time::Instant::now();
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.0,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "structured_response",
                    "strict": false,
                    "schema": schema,
                },
            },
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to OpenAI")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "OpenAI API error");
            return Err(anyhow!("OpenAI API error ({}): {}", status, error_text));
        }

        let raw: ChatResponseRaw = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        let content = raw
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("No response content from OpenAI"))?;

        let usage = raw
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        debug!(
            model = %self.model,
            total_tokens = usage.total_tokens,
            duration_ms = start.elapsed().as_millis() as u64,
            "OpenAI structured completion"
        );

        Ok(StructuredCompletion {
            content,
            cost_usd: estimate_cost_usd(&self.model, &usage),
            usage,
        })
    }
}
