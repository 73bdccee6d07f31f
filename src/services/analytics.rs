// src/services/analytics.rs

//! Fire-and-forget impression and click events.

use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::error::Result;
use crate::models::Config;
use crate::utils::{http, now_millis};

/// Event posted to the analytics endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnalyticsEvent {
    Impression {
        #[serde(rename = "adId")]
        ad_id: String,
        ts: i64,
    },
    Click {
        #[serde(rename = "adId")]
        ad_id: String,
        ts: i64,
        href: Option<String>,
    },
}

impl AnalyticsEvent {
    pub fn impression(ad_id: impl Into<String>) -> Self {
        Self::Impression {
            ad_id: ad_id.into(),
            ts: now_millis(),
        }
    }

    pub fn click(ad_id: impl Into<String>, href: Option<String>) -> Self {
        Self::Click {
            ad_id: ad_id.into(),
            ts: now_millis(),
            href,
        }
    }

    pub fn ad_id(&self) -> &str {
        match self {
            Self::Impression { ad_id, .. } | Self::Click { ad_id, .. } => ad_id,
        }
    }
}

/// Best-effort event delivery. `send` must never block the caller.
pub trait AnalyticsSink: Send + Sync {
    fn send(&self, event: AnalyticsEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn send(&self, _event: AnalyticsEvent) {}
}

/// Posts events as JSON from a detached task; failures are dropped.
#[derive(Debug, Clone)]
pub struct HttpAnalytics {
    client: Client,
    endpoint: Url,
}

impl HttpAnalytics {
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http::create_async_client(config)?;
        Ok(Self::new(client, config.analytics_url()?))
    }
}

impl AnalyticsSink for HttpAnalytics {
    fn send(&self, event: AnalyticsEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let request = self.client.post(self.endpoint.clone()).json(&event);
        runtime.spawn(async move {
            let _ = request.send().await;
        });
    }
}
