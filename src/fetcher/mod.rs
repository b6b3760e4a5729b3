pub mod latency;
pub mod throttle;

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use crate::config::{
    DEFAULT_USER_AGENT, HTTP_TIMEOUT_SECS, MAX_CONCURRENCY, RATE_LIMIT_SECS, RETRY_BASE_SECS,
    RETRY_JITTER_SECS, RETRY_MAX,
};
use crate::error::{AppError, Result};

pub use latency::FetchLatency;
pub use throttle::{host_key, HostThrottle};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_concurrency: usize,
    pub rate_limit: Duration,
    pub retry_max: u32,
    pub retry_base: Duration,
    pub retry_jitter: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            max_concurrency: MAX_CONCURRENCY,
            rate_limit: Duration::from_secs_f64(RATE_LIMIT_SECS),
            retry_max: RETRY_MAX,
            retry_base: Duration::from_secs_f64(RETRY_BASE_SECS),
            retry_jitter: Duration::from_secs_f64(RETRY_JITTER_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body of a 2xx response; any other status is an error for the caller.
    pub fn into_text(self) -> Result<String> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(AppError::HttpStatus { url: self.url, status: self.status })
        }
    }
}

/// Rate-limit and availability statuses worth another attempt.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

/// Bounded-concurrency HTTP client shared by every provider in a pipeline run.
///
/// - at most `max_concurrency` requests in flight (callers queue on a semaphore)
/// - requests to one host start at least `rate_limit` apart
/// - 429/503 and transport errors retried with exponential backoff plus jitter
pub struct PoliteClient {
    http: reqwest::Client,
    settings: FetchSettings,
    gate: Semaphore,
    throttle: HostThrottle,
    latency: FetchLatency,
}

impl PoliteClient {
    pub fn new(settings: FetchSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            http,
            gate: Semaphore::new(settings.max_concurrency.max(1)),
            throttle: HostThrottle::new(settings.rate_limit),
            latency: FetchLatency::new(),
            settings,
        })
    }

    pub fn latency(&self) -> &FetchLatency {
        &self.latency
    }

    /// GET `url`. Any non-retryable status is returned as-is; the caller decides
    /// what a 404 means. After `retry_max` failed attempts the URL is given up on.
    pub async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let target = Url::parse(url)?;
        let host = host_key(&target);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| AppError::Provider("fetch gate closed".to_string()))?;

        let attempts = self.settings.retry_max.max(1);
        let mut last_status = None;

        for attempt in 1..=attempts {
            self.throttle.wait(&host).await;

            let started = Instant::now();
            let outcome = match self.http.get(target.clone()).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    resp.text().await.map(|body| (status, body))
                }
                Err(e) => Err(e),
            };
            self.throttle.mark(&host);
            self.latency.record(started.elapsed());

            let reason = match outcome {
                Ok((status, _)) if is_retryable(status) => {
                    last_status = Some(status.as_u16());
                    format!("rate limited: {status}")
                }
                Ok((status, body)) => {
                    debug!(url, status = status.as_u16(), bytes = body.len(), "fetched");
                    return Ok(FetchResponse {
                        url: url.to_string(),
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) => {
                    last_status = e.status().map(|s| s.as_u16());
                    e.to_string()
                }
            };

            if attempt < attempts {
                let backoff = self.backoff(attempt);
                warn!(
                    url,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "GET {url} failed ({reason}). retry {attempt} in {:.1}s",
                    backoff.as_secs_f64(),
                );
                tokio::time::sleep(backoff).await;
            } else {
                warn!(url, attempt, "GET {url} failed ({reason}). giving up");
            }
        }

        Err(AppError::RetriesExhausted {
            url: url.to_string(),
            attempts,
            last_status,
        })
    }

    /// Convenience for providers: fetch and require a 2xx body.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        self.fetch(url).await?.into_text()
    }

    /// `base * 2^(attempt-1) + U(0, jitter)`.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.settings.retry_base.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
        let jitter = self.settings.retry_jitter.as_secs_f64() * rand::random::<f64>();
        Duration::from_secs_f64(exp + jitter)
    }
}
