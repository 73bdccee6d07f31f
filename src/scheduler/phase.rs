// src/scheduler/phase.rs

//! Slot lifecycle phases and the delays between ticks.

use std::fmt;
use std::time::Duration;

use crate::models::{AdDescriptor, RotatorConfig};

/// Where a slot is in its rotation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotPhase {
    /// Created, not yet started
    #[default]
    Idle,
    /// Waiting out the per-slot start offset
    StaggeredStart,
    /// Waiting for the armed timer
    ActiveWait,
    Fetching,
    Applying,
    /// Next tick armed with this delay
    Scheduled(Duration),
    /// Terminal
    Stopped,
}

impl SlotPhase {
    /// Whether a slot may move from `self` to `next`.
    pub fn can_advance_to(&self, next: &SlotPhase) -> bool {
        use SlotPhase::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Stopped) => true,
            (Idle, StaggeredStart) => true,
            (StaggeredStart | ActiveWait, Fetching | Scheduled(_)) => true,
            (Fetching, Applying | Scheduled(_)) => true,
            (Applying, Scheduled(_)) => true,
            (Scheduled(_), ActiveWait) => true,
            _ => false,
        }
    }

    /// Waiting on a timer, so a fresh tick may start.
    pub fn is_waiting(&self) -> bool {
        matches!(self, SlotPhase::StaggeredStart | SlotPhase::ActiveWait)
    }

    pub fn is_stopped(&self) -> bool {
        *self == SlotPhase::Stopped
    }
}

impl fmt::Display for SlotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotPhase::Idle => write!(f, "idle"),
            SlotPhase::StaggeredStart => write!(f, "staggered-start"),
            SlotPhase::ActiveWait => write!(f, "active-wait"),
            SlotPhase::Fetching => write!(f, "fetching"),
            SlotPhase::Applying => write!(f, "applying"),
            SlotPhase::Scheduled(delay) => write!(f, "scheduled({}ms)", delay.as_millis()),
            SlotPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Delay rules for one rotator.
#[derive(Debug, Clone, PartialEq)]
pub struct Cadence {
    pub default_interval: Duration,
    pub min_display: Duration,
    pub backoff_factor: f64,
    pub error_backoff_cap: u32,
    pub hidden_multiplier: u32,
    pub stagger_step: Duration,
    pub stagger_max: Duration,
}

impl Cadence {
    pub fn from_config(config: &RotatorConfig) -> Self {
        Self {
            default_interval: config.default_interval(),
            min_display: config.min_display(),
            backoff_factor: config.backoff_factor,
            error_backoff_cap: config.error_backoff_cap,
            hidden_multiplier: config.hidden_interval_multiplier,
            stagger_step: Duration::from_millis(config.stagger_step_ms),
            stagger_max: Duration::from_millis(config.stagger_start_max_ms),
        }
    }

    /// First delay of slot `index`: `min(index * step, max)`.
    pub fn stagger_delay(&self, index: usize) -> Duration {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        self.stagger_step
            .checked_mul(index)
            .unwrap_or(Duration::MAX)
            .min(self.stagger_max)
    }

    /// Re-arm delay when the timer fires on a hidden page.
    pub fn hidden_delay(&self) -> Duration {
        self.default_interval.saturating_mul(self.hidden_multiplier)
    }

    /// Re-arm delay after the `failures`-th consecutive failed fetch.
    ///
    /// `default * factor^failures`, never above `default * cap`.
    pub fn error_delay(&self, failures: u32) -> Duration {
        let cap = self.default_interval.saturating_mul(self.error_backoff_cap);
        let exponent = i32::try_from(failures.max(1)).unwrap_or(i32::MAX);
        let secs = self.default_interval.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(cap).min(cap)
    }

    /// Re-arm delay after `ad` was applied.
    pub fn after_apply(&self, ad: &AdDescriptor) -> Duration {
        ad.next_delay(self.default_interval, self.min_display)
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::from_config(&RotatorConfig::default())
    }
}
