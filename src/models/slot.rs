//! Per-slot state owned by a slot's scheduler task.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Index of a slot in the order the host reported it.
pub type SlotId = usize;

/// Impression and click counters for one ad.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdStats {
    pub impressions: u64,
    pub clicks: u64,
}

impl AdStats {
    pub fn merge(&mut self, other: &AdStats) {
        self.impressions += other.impressions;
        self.clicks += other.clicks;
    }
}

/// Visual and ARIA state of a sound toggle, derived from the mute flag only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleView {
    pub muted: bool,
    pub aria_pressed: bool,
    pub aria_label: &'static str,
    pub icon: &'static str,
    pub title: &'static str,
}

impl ToggleView {
    pub fn for_muted(muted: bool) -> Self {
        if muted {
            Self {
                muted,
                aria_pressed: false,
                aria_label: "Unmute advertisement",
                icon: "🔇",
                title: "Unmute",
            }
        } else {
            Self {
                muted,
                aria_pressed: true,
                aria_label: "Mute advertisement",
                icon: "🔊",
                title: "Mute",
            }
        }
    }
}

/// What the slot is currently showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mounted {
    Image { src: String, href: String },
    Video { src: String, loops: bool },
    Placeholder { src: String },
}

impl Mounted {
    pub fn is_video(&self) -> bool {
        matches!(self, Mounted::Video { .. })
    }
}

/// Mutable state of one slot.
#[derive(Debug, Clone, Default)]
pub struct SlotState {
    pub id: SlotId,
    pub current_ad_id: Option<String>,
    pub mounted: Option<Mounted>,
    /// Mute flag of the mounted video; the toggle view is derived from it
    pub muted: bool,
    pub playing: bool,
    /// Playback was paused because the slot left the viewport
    pub paused_by_visibility: bool,
    /// Fill duration of the running progress indicator
    pub progress: Option<Duration>,
    pub stats: HashMap<String, AdStats>,
}

impl SlotState {
    pub fn new(id: SlotId) -> Self {
        Self {
            id,
            muted: true,
            ..Self::default()
        }
    }

    pub fn record_impression(&mut self, ad_id: &str) {
        self.stats.entry(ad_id.to_string()).or_default().impressions += 1;
    }

    pub fn record_click(&mut self, ad_id: &str) {
        self.stats.entry(ad_id.to_string()).or_default().clicks += 1;
    }

    pub fn shows_video(&self) -> bool {
        self.mounted.as_ref().is_some_and(Mounted::is_video)
    }
}
