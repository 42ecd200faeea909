//! AI Client (C7): builds the classification prompt, issues the upstream
//! HTTP call, retries with exponential backoff + full jitter, and wraps the
//! attempt in the rate limiter (C5) and circuit breaker (C6).
//!
//! Built around a plain `reqwest::Client` (bearer auth, POST with a JSON
//! body) wrapped in a full retry state machine: bounded attempts with
//! exponential backoff, full jitter, and `Retry-After` honoring on 429s.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;

use crate::circuit_breaker::{CircuitBreaker, Permit};
use crate::config::Config;
use crate::metrics::SharedMetrics;
use crate::ratelimiter::TokenBucket;
use crate::redact::redact_value;
use crate::types::{Category, Classification, Item};

const SYSTEM_PROMPT: &str = "You are a telemetry classification engine. Given a JSON array of \
items, each with a `type` and a `content` object, return a JSON array of the same length and \
order, where each element is an object with a `category` field (one of \"critical\", \"warning\", \
\"info\") and a `forward_to` field (one of \"alerting\", \"storage\", \"archive\"). Return only the \
JSON array, nothing else.";

#[derive(Debug, Error)]
pub enum AiClientError {
    #[error("rate limited")]
    RateLimited,
    #[error("circuit open")]
    CircuitOpen,
    #[error("upstream timeout")]
    UpstreamTimeout,
    #[error("upstream returned status {0}")]
    UpstreamHttpStatus(u16),
    #[error("invalid upstream response")]
    InvalidResponse,
    #[error("network error: {0}")]
    NetworkError(String),
}

/// Per-item outcome of a successful (len-preserving) classify() call.
pub enum ItemOutcome {
    Classified(Classification),
    FallbackNeeded,
}

pub struct AiClient {
    http: reqwest::Client,
    config: Arc<Config>,
    rate_limiter: Arc<TokenBucket>,
    breaker: Arc<CircuitBreaker>,
    metrics: SharedMetrics,
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

fn counts_as_breaker_failure(status: u16) -> bool {
    status == 429 || status >= 500
}

impl AiClient {
    pub fn new(
        config: Arc<Config>,
        rate_limiter: Arc<TokenBucket>,
        breaker: Arc<CircuitBreaker>,
        metrics: SharedMetrics,
    ) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            config,
            rate_limiter,
            breaker,
            metrics,
        }
    }

    fn render_prompt(&self, items: &[Item]) -> serde_json::Value {
        let redacted_items: Vec<serde_json::Value> = items
            .iter()
            .map(|item| {
                serde_json::json!({
                    "type": item.item_type,
                    "content": redact_value(&item.content),
                })
            })
            .collect();
        serde_json::json!({
            "model": self.config.ai_model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": serde_json::Value::Array(redacted_items).to_string()},
            ],
        })
    }

    /// Classify a batch. On `Ok`, the returned vec has exactly `items.len()`
    /// entries in input order. On `Err`, no per-item result is available and
    /// the orchestrator must apply its own fallback.
    pub async fn classify(
        &self,
        items: &[Item],
        deadline: Instant,
    ) -> Result<Vec<ItemOutcome>, AiClientError> {
        if !self.rate_limiter.acquire(self.config.rate_limit_wait).await {
            return Err(AiClientError::RateLimited);
        }
        let permit = self.breaker.try_acquire();
        if matches!(permit, Permit::Denied) {
            return Err(AiClientError::CircuitOpen);
        }

        let body = self.render_prompt(items);
        let result = self.send_with_retries(&body, items.len(), deadline).await;

        match &result {
            Ok(_) => self.breaker.on_success(),
            Err(AiClientError::UpstreamHttpStatus(code)) if counts_as_breaker_failure(*code) => {
                if self.breaker.on_failure() {
                    self.metrics.inc_circuit_breaker_opens();
                }
            }
            Err(AiClientError::NetworkError(_)) | Err(AiClientError::UpstreamTimeout) => {
                if self.breaker.on_failure() {
                    self.metrics.inc_circuit_breaker_opens();
                }
            }
            _ => {}
        }
        self.metrics
            .set_circuit_breaker_state(self.breaker.state().as_gauge_value());
        result
    }

    async fn send_with_retries(
        &self,
        body: &serde_json::Value,
        expected_len: usize,
        deadline: Instant,
    ) -> Result<Vec<ItemOutcome>, AiClientError> {
        let mut last_err = AiClientError::NetworkError("no attempts made".into());
        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                self.metrics.inc_api_calls_total("retried");
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.metrics.inc_api_calls_total("error");
                return Err(AiClientError::UpstreamTimeout);
            }
            let attempt_timeout = remaining.min(self.config.per_attempt_timeout);

            let start = Instant::now();
            let outcome = self.attempt_once(body, attempt_timeout).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            self.metrics.observe_api_call_duration_ms(elapsed_ms);

            match outcome {
                Ok(text) => match parse_response(&text, expected_len) {
                    Ok(results) => {
                        self.metrics.inc_api_calls_total("ok");
                        return Ok(results);
                    }
                    Err(e) => {
                        self.metrics.inc_api_calls_total("error");
                        return Err(e);
                    }
                },
                Err(AttemptFailure::Status { code, retry_after }) => {
                    if !is_retryable_status(code) {
                        self.metrics.inc_api_calls_total("error");
                        return Err(AiClientError::UpstreamHttpStatus(code));
                    }
                    last_err = AiClientError::UpstreamHttpStatus(code);
                    if attempt + 1 >= self.config.max_retries {
                        break;
                    }
                    self.wait_backoff(attempt, retry_after, deadline).await;
                }
                Err(AttemptFailure::Timeout) => {
                    last_err = AiClientError::UpstreamTimeout;
                    if attempt + 1 >= self.config.max_retries {
                        break;
                    }
                    self.wait_backoff(attempt, None, deadline).await;
                }
                Err(AttemptFailure::Network(msg)) => {
                    last_err = AiClientError::NetworkError(msg);
                    if attempt + 1 >= self.config.max_retries {
                        break;
                    }
                    self.wait_backoff(attempt, None, deadline).await;
                }
            }
        }
        self.metrics.inc_api_calls_total("error");
        Err(last_err)
    }

    async fn wait_backoff(&self, attempt: u32, retry_after: Option<Duration>, deadline: Instant) {
        let computed = self.backoff_for_attempt(attempt);
        let delay = retry_after.unwrap_or(computed).min(self.config.max_backoff);
        let jittered = full_jitter(delay);
        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(jittered.min(remaining)).await;
    }

    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.initial_backoff.as_secs_f64()
            * self.config.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(base).min(self.config.max_backoff)
    }

    async fn attempt_once(
        &self,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<String, AttemptFailure> {
        let mut request = self
            .http
            .post(&self.config.ai_api_endpoint)
            .header("content-type", "application/json")
            .timeout(timeout)
            .json(body);
        if let Some(key) = &self.config.ai_api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(AttemptFailure::Timeout),
            Err(e) => return Err(AttemptFailure::Network(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(AttemptFailure::Status {
                code: status.as_u16(),
                retry_after,
            });
        }

        response
            .text()
            .await
            .map_err(|e| AttemptFailure::Network(e.to_string()))
    }
}

enum AttemptFailure {
    Status { code: u16, retry_after: Option<Duration> },
    Timeout,
    Network(String),
}

/// Full jitter: sample uniformly in `[0, delay]`.
fn full_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    let jittered = rand::thread_rng().gen_range(0..=ms);
    Duration::from_millis(jittered)
}

fn parse_response(text: &str, expected_len: usize) -> Result<Vec<ItemOutcome>, AiClientError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|_| AiClientError::InvalidResponse)?;
    let array = value.as_array().ok_or(AiClientError::InvalidResponse)?;
    if array.len() != expected_len {
        return Ok((0..expected_len).map(|_| ItemOutcome::FallbackNeeded).collect());
    }
    let results = array
        .iter()
        .map(|entry| match parse_category(entry) {
            Some(category) => ItemOutcome::Classified(Classification::from_category(category)),
            None => ItemOutcome::FallbackNeeded,
        })
        .collect();
    Ok(results)
}

fn parse_category(entry: &serde_json::Value) -> Option<Category> {
    match entry.get("category").and_then(|v| v.as_str())? {
        "critical" => Some(Category::Critical),
        "warning" => Some(Category::Warning),
        "info" => Some(Category::Info),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_handles_length_mismatch() {
        let text = serde_json::json!([{"category":"critical","forward_to":"alerting"}]).to_string();
        let results = parse_response(&text, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| matches!(r, ItemOutcome::FallbackNeeded)));
    }

    #[test]
    fn parse_response_marks_unrecognized_category_as_fallback() {
        let text = serde_json::json!([{"category":"unknown"}]).to_string();
        let results = parse_response(&text, 1).unwrap();
        assert!(matches!(results[0], ItemOutcome::FallbackNeeded));
    }

    #[test]
    fn parse_response_accepts_valid_array() {
        let text = serde_json::json!([
            {"category":"critical","forward_to":"alerting"},
            {"category":"info"}
        ])
        .to_string();
        let results = parse_response(&text, 2).unwrap();
        match &results[0] {
            ItemOutcome::Classified(c) => assert_eq!(c.category, Category::Critical),
            _ => panic!("expected classified"),
        }
        match &results[1] {
            ItemOutcome::Classified(c) => assert_eq!(c.category, Category::Info),
            _ => panic!("expected classified"),
        }
    }

    #[test]
    fn parse_response_rejects_non_array() {
        let text = serde_json::json!({"not": "an array"}).to_string();
        assert!(matches!(
            parse_response(&text, 1),
            Err(AiClientError::InvalidResponse)
        ));
    }

    #[test]
    fn retryable_status_set_matches_spec() {
        for code in [408, 425, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(code));
        }
        for code in [400, 401, 403, 404, 422] {
            assert!(!is_retryable_status(code));
        }
    }

    #[test]
    fn breaker_failure_set_excludes_client_errors() {
        assert!(counts_as_breaker_failure(429));
        assert!(counts_as_breaker_failure(500));
        assert!(!counts_as_breaker_failure(400));
        assert!(!counts_as_breaker_failure(404));
    }

    #[test]
    fn full_jitter_stays_in_bounds() {
        let delay = Duration::from_millis(1000);
        for _ in 0..50 {
            let j = full_jitter(delay);
            assert!(j <= delay);
        }
    }
}
