// src/models/mod.rs

//! Domain models for the ad rotator.

mod ad;
mod config;
mod slot;

// Re-export all public types
pub use ad::{AdDescriptor, MediaKind, parse_payload};
pub use config::{AnalyticsConfig, Config, HttpConfig, LoggingConfig, RotatorConfig};
pub use slot::{AdStats, Mounted, SlotId, SlotState, ToggleView};
