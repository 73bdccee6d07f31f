// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;
use crate::models::Config;

/// Create a configured asynchronous HTTP client.
///
/// Per-request deadlines are applied by the callers; the client only bounds
/// connection setup.
pub fn create_async_client(config: &Config) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.http.user_agent)
        .connect_timeout(Duration::from_millis(config.rotator.fetch_timeout_ms))
        .build()?;
    Ok(client)
}
