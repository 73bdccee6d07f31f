// src/services/source.rs

//! Ad endpoint access.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::error::{FetchError, Result};
use crate::models::Config;
use crate::utils::{http, with_count};

/// One request/response exchange with the ad endpoint.
///
/// Implementations perform a single attempt; retries and deadlines are the
/// `Fetcher`'s job.
#[async_trait]
pub trait AdSource: Send + Sync {
    /// Request `count` ads and return the decoded JSON body.
    async fn request(&self, count: u32) -> std::result::Result<Value, FetchError>;
}

/// `GET <endpoint>?count=<n>` over reqwest.
pub struct HttpAdSource {
    client: Client,
    endpoint: Url,
}

impl HttpAdSource {
    pub fn new(client: Client, endpoint: &str) -> Result<Self> {
        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
        })
    }

    /// Build a source for the configured endpoint with its own client.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http::create_async_client(config)?;
        Self::new(client, &config.rotator.api)
    }
}

#[async_trait]
impl AdSource for HttpAdSource {
    async fn request(&self, count: u32) -> std::result::Result<Value, FetchError> {
        let url = with_count(self.endpoint.as_str(), count).map_err(FetchError::network)?;
        log::debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::malformed(e.to_string()))
    }
}
