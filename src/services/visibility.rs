// src/services/visibility.rs

//! Viewport and page visibility handling.

use tokio::sync::watch;

use crate::models::{SlotId, SlotState};
use crate::services::renderer::{MediaSlotSink, apply_sound};

/// Host-side observer of slot visibility and connection quality.
///
/// The host reports intersection changes back through
/// `Rotator::report_intersection`.
pub trait VisibilityProbe: Send + Sync {
    /// Start reporting intersection ratios for `slot` around `threshold`.
    fn observe(&self, slot: SlotId, threshold: f64);

    /// Stop reporting for `slot`.
    fn unobserve(&self, slot: SlotId);

    /// Estimated downlink in Mbps, if the host knows it.
    fn downlink_mbps(&self) -> Option<f64> {
        None
    }
}

/// Result of an intersection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityAction {
    /// Nothing to do (no video, or no state change needed)
    None,
    /// Playback resumed after a visibility pause
    Resumed,
    /// Playback paused, audio forced off
    PausedAndMuted,
}

/// Applies play/pause/mute rules on intersection changes and tracks whether
/// the page is hidden.
#[derive(Debug, Clone)]
pub struct VisibilityGovernor {
    threshold: f64,
    page_hidden: watch::Receiver<bool>,
}

impl VisibilityGovernor {
    pub fn new(threshold: f64, page_hidden: watch::Receiver<bool>) -> Self {
        Self {
            threshold,
            page_hidden,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn page_hidden(&self) -> bool {
        *self.page_hidden.borrow()
    }

    /// Apply the visibility rules for a new intersection ratio.
    ///
    /// Below the threshold a video is paused and muted and its toggle reset,
    /// whatever the user chose. Back above it, playback resumes only if this
    /// governor paused it; sound stays off.
    pub fn on_intersection(
        &self,
        state: &mut SlotState,
        sink: &dyn MediaSlotSink,
        ratio: f64,
    ) -> VisibilityAction {
        if !state.shows_video() {
            return VisibilityAction::None;
        }

        if ratio >= self.threshold {
            if !state.paused_by_visibility {
                return VisibilityAction::None;
            }
            state.paused_by_visibility = false;
            state.playing = true;
            sink.play();
            return VisibilityAction::Resumed;
        }

        sink.pause();
        state.playing = false;
        state.paused_by_visibility = true;
        apply_sound(state, sink, true);
        VisibilityAction::PausedAndMuted
    }
}
