// src/services/fetcher.rs

//! Timed, retrying ad fetches.

use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchError;
use crate::models::{AdDescriptor, RotatorConfig, parse_payload};
use crate::services::AdSource;

/// Attempt budget and delays for one fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    pub backoff_factor: f64,
    /// Deadline for each attempt
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RotatorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay(),
            backoff_factor: config.backoff_factor,
            attempt_timeout: config.fetch_timeout(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after failed attempt `attempt` (0-based): `base * factor^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RotatorConfig::default())
    }
}

/// Fetches candidates from an `AdSource`, retrying with exponential backoff.
pub struct Fetcher {
    source: Arc<dyn AdSource>,
    policy: RetryPolicy,
    count: u32,
}

impl Fetcher {
    pub fn new(source: Arc<dyn AdSource>, policy: RetryPolicy, count: u32) -> Self {
        Self {
            source,
            policy,
            count: count.max(1),
        }
    }

    pub fn from_config(source: Arc<dyn AdSource>, config: &RotatorConfig) -> Self {
        Self::new(source, RetryPolicy::from_config(config), config.request_count)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch a non-empty list of candidates.
    ///
    /// Makes up to `max_retries + 1` attempts. On exhaustion the error carries
    /// the last attempt's cause.
    pub async fn fetch(&self) -> Result<Vec<AdDescriptor>, FetchError> {
        let attempts = self.policy.max_attempts();
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.attempt().await {
                Ok(ads) => {
                    if attempt > 0 {
                        log::debug!("Ad fetch succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(ads);
                }
                Err(e) => {
                    if attempt + 1 < attempts {
                        let delay = self.policy.delay_for(attempt);
                        log::warn!(
                            "Ad fetch attempt {} failed: {}, retrying in {:?}",
                            attempt + 1,
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| FetchError::network("no attempt was made"));
        log::warn!("Ad fetch failed after {} attempts: {}", attempts, last);
        Err(FetchError::Exhausted {
            attempts,
            last: Box::new(last),
        })
    }

    /// One attempt under the per-attempt deadline. Dropping the request
    /// future on timeout cancels it.
    async fn attempt(&self) -> Result<Vec<AdDescriptor>, FetchError> {
        let timeout = self.policy.attempt_timeout;
        let body = tokio::time::timeout(timeout, self.source.request(self.count))
            .await
            .map_err(|_| FetchError::Timeout {
                ms: timeout.as_millis() as u64,
            })??;
        parse_payload(&body)
    }
}
