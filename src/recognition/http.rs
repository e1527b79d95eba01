use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use super::retry::{DEFAULT_BASE_DELAY, is_rate_limited, retry_after, wait_with_backoff};
use super::{RecognizeFuture, Recognizer};
use crate::settings::Settings;

/// Client for a recognition service that accepts `{"base64Data": ...}` and
/// answers with `{"text": ...}` or `{"error": ...}`.
#[derive(Debug, Clone)]
pub struct HttpRecognizer {
    client: reqwest::Client,
    endpoint: String,
    max_retries: usize,
    base_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct RecognitionResponse {
    text: Option<String>,
    error: Option<String>,
}

impl HttpRecognizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, max_retries: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "failed to build recognition HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            max_retries,
            base_delay: DEFAULT_BASE_DELAY,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.recognition_endpoint.clone(),
            Duration::from_secs(settings.recognition_timeout_secs),
            settings.recognition_max_retries,
        )
    }

    /// First wait between attempts; doubles on every retry.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, image_data: &str, mime: &str) -> Result<String> {
        let body = json!({
            "base64Data": image_data,
            "mimeType": mime,
        });
        let max_attempts = self.max_retries + 1;
        let mut attempt = 0usize;
        let mut delay = self.base_delay;
        loop {
            attempt += 1;
            let response = match self.client.post(&self.endpoint).json(&body).send().await {
                Ok(response) => response,
                Err(err) if err.is_timeout() && attempt < max_attempts => {
                    delay = wait_with_backoff(attempt, max_attempts, delay, None, "timed out").await;
                    continue;
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("recognition request to {} failed", self.endpoint)
                    });
                }
            };
            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();

            if status.is_success() {
                return parse_response(&text);
            }
            if is_rate_limited(status, &text) && attempt < max_attempts {
                delay = wait_with_backoff(attempt, max_attempts, delay, retry_after, "throttled")
                    .await;
                continue;
            }
            return Err(anyhow!(
                "recognition service error ({}): {}",
                status,
                extract_error(&text).unwrap_or(text)
            ));
        }
    }
}

impl Recognizer for HttpRecognizer {
    fn recognize<'a>(&'a self, image_data: &'a str, mime: &'a str) -> RecognizeFuture<'a> {
        Box::pin(self.call(image_data, mime))
    }
}

fn parse_response(body: &str) -> Result<String> {
    let response: RecognitionResponse = serde_json::from_str(body)
        .with_context(|| "failed to parse recognition response")?;
    if let Some(error) = response.error {
        return Err(anyhow!("recognition failed: {}", error));
    }
    response
        .text
        .ok_or_else(|| anyhow!("recognition response has no text"))
}

fn extract_error(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|error| error.as_str())
        .map(|error| error.to_string())
}
