//! Service layer for the ad rotator.
//!
//! This module contains the business logic for:
//! - Talking to the ad endpoint (`AdSource`, `HttpAdSource`)
//! - Retrying fetches (`Fetcher`)
//! - Weighted selection (`Selector`)
//! - Mounting ads into slots (`SlotRenderer`)
//! - Viewport playback rules (`VisibilityGovernor`)
//! - Impression and click events (`AnalyticsSink`)

mod analytics;
mod fetcher;
mod renderer;
mod selector;
mod source;
mod visibility;

pub use analytics::{AnalyticsEvent, AnalyticsSink, HttpAnalytics, NoopAnalytics};
pub use fetcher::{Fetcher, RetryPolicy};
pub use renderer::{ApplyOutcome, ImageMount, MediaSlotSink, SlotRenderer, VideoMount};
pub use selector::Selector;
pub use source::{AdSource, HttpAdSource};
pub use visibility::{VisibilityAction, VisibilityGovernor, VisibilityProbe};
