// src/host.rs

//! Headless host: slots that log what they would display.

use std::sync::Arc;
use std::time::Duration;

use crate::models::{SlotId, ToggleView};
use crate::scheduler::SlotHost;
use crate::services::{ImageMount, MediaSlotSink, VideoMount, VisibilityProbe};

/// Host exposing a fixed number of always-visible console slots.
#[derive(Debug, Clone)]
pub struct HeadlessHost {
    slots: usize,
}

impl HeadlessHost {
    pub fn new(slots: usize) -> Self {
        Self { slots }
    }
}

impl SlotHost for HeadlessHost {
    fn find_slots(&self, selector: &str) -> Vec<Arc<dyn MediaSlotSink>> {
        log::debug!("Providing {} headless slot(s) for '{}'", self.slots, selector);
        (0..self.slots)
            .map(|id| Arc::new(ConsoleSlot { id }) as Arc<dyn MediaSlotSink>)
            .collect()
    }
}

/// Slot that reports mounts through `log`.
#[derive(Debug)]
pub struct ConsoleSlot {
    id: SlotId,
}

impl MediaSlotSink for ConsoleSlot {
    fn clear(&self) {
        log::trace!("[slot {}] clear", self.id);
    }

    fn mount_image(&self, mount: &ImageMount) {
        if mount.placeholder {
            log::info!("[slot {}] placeholder {}", self.id, mount.src);
        } else {
            log::info!("[slot {}] image {} -> {}", self.id, mount.src, mount.href);
        }
    }

    fn mount_video(&self, mount: &VideoMount) {
        log::info!(
            "[slot {}] video {}{}",
            self.id,
            mount.src,
            if mount.loops { " (loop)" } else { "" }
        );
    }

    fn set_muted(&self, muted: bool) {
        log::trace!("[slot {}] muted={}", self.id, muted);
    }

    fn render_sound_toggle(&self, view: ToggleView) {
        log::trace!("[slot {}] toggle {} {}", self.id, view.icon, view.aria_label);
    }

    fn play(&self) {
        log::debug!("[slot {}] play", self.id);
    }

    fn pause(&self) {
        log::debug!("[slot {}] pause", self.id);
    }

    fn start_progress(&self, fill: Duration) {
        log::trace!("[slot {}] progress over {:?}", self.id, fill);
    }

    fn reset_progress(&self) {}

    fn in_viewport(&self) -> bool {
        true
    }
}

/// Probe with no intersection events and a fixed downlink estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticProbe {
    downlink_mbps: Option<f64>,
}

impl StaticProbe {
    pub fn new(downlink_mbps: Option<f64>) -> Self {
        Self { downlink_mbps }
    }
}

impl VisibilityProbe for StaticProbe {
    fn observe(&self, slot: SlotId, threshold: f64) {
        log::trace!("Observing slot {} at threshold {}", slot, threshold);
    }

    fn unobserve(&self, slot: SlotId) {
        log::trace!("Detached slot {}", slot);
    }

    fn downlink_mbps(&self) -> Option<f64> {
        self.downlink_mbps
    }
}
