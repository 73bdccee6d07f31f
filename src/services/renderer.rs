// src/services/renderer.rs

//! Mounting ads into slots.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::RenderError;
use crate::models::{AdDescriptor, MediaKind, Mounted, RotatorConfig, SlotState, ToggleView};
use crate::services::{AnalyticsEvent, AnalyticsSink, VisibilityProbe};
use crate::storage::SharedHistory;

/// Image content for a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMount {
    pub src: String,
    /// Click destination, `#` when the ad has none
    pub href: String,
    pub alt: String,
    /// Set for the placeholder shown after a load failure
    pub placeholder: bool,
}

/// Video content for a slot. Always mounted muted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMount {
    pub src: String,
    pub poster: Option<String>,
    pub loops: bool,
    pub muted: bool,
    pub toggle: ToggleView,
}

/// Display surface of one slot.
///
/// Calls are commands; the sink keeps no state the rotator relies on, apart
/// from answering `in_viewport`.
pub trait MediaSlotSink: Send + Sync {
    /// Remove the current content.
    fn clear(&self);
    fn mount_image(&self, mount: &ImageMount);
    fn mount_video(&self, mount: &VideoMount);
    fn set_muted(&self, muted: bool);
    /// Redraw the sound toggle (icon, title, `aria-pressed`, label).
    fn render_sound_toggle(&self, view: ToggleView);
    fn play(&self);
    fn pause(&self);
    /// Restart the progress indicator, filling over `fill`.
    fn start_progress(&self, fill: Duration);
    fn reset_progress(&self);
    /// Whether any part of the slot is currently on screen.
    fn in_viewport(&self) -> bool;
}

/// Set the video mute flag and the toggle view together.
///
/// The only writer of `state.muted`, so the two never diverge.
pub(crate) fn apply_sound(state: &mut SlotState, sink: &dyn MediaSlotSink, muted: bool) {
    state.muted = muted;
    sink.set_muted(muted);
    sink.render_sound_toggle(ToggleView::for_muted(muted));
}

/// What `SlotRenderer::apply` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// New content mounted
    Mounted,
    /// Ad already showing; only the impression counter moved
    Repeat,
    /// Nothing displayable for this slot right now
    Skipped,
    /// Rotator stopped; nothing counted or recorded
    Cancelled,
}

/// Mounts descriptors into slots and keeps impression bookkeeping.
pub struct SlotRenderer {
    config: Arc<RotatorConfig>,
    history: Arc<SharedHistory>,
    analytics: Arc<dyn AnalyticsSink>,
    probe: Arc<dyn VisibilityProbe>,
    cancel: CancellationToken,
}

impl SlotRenderer {
    pub fn new(
        config: Arc<RotatorConfig>,
        history: Arc<SharedHistory>,
        analytics: Arc<dyn AnalyticsSink>,
        probe: Arc<dyn VisibilityProbe>,
    ) -> Self {
        Self {
            config,
            history,
            analytics,
            probe,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop counting impressions once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Show `ad` in the slot.
    pub async fn apply(
        &self,
        state: &mut SlotState,
        sink: &dyn MediaSlotSink,
        ad: &AdDescriptor,
    ) -> ApplyOutcome {
        if self.cancel.is_cancelled() {
            return ApplyOutcome::Cancelled;
        }
        if state.current_ad_id.as_deref() == Some(ad.id.as_str()) {
            state.record_impression(&ad.id);
            return ApplyOutcome::Repeat;
        }

        sink.clear();
        state.mounted = None;
        state.playing = false;
        state.paused_by_visibility = false;
        state.progress = None;

        let mounted = match ad.media_kind {
            MediaKind::Video if self.video_allowed() => self.mount_video(state, sink, ad),
            MediaKind::Video => match &ad.image_url {
                Some(still) => {
                    log::debug!("Slow connection, showing still image for ad {}", ad.id);
                    self.mount_image(sink, ad, still)
                }
                None => {
                    let err = RenderError::NoMedia {
                        ad_id: ad.id.clone(),
                    };
                    log::debug!("Slot {}: slow connection, {}", state.id, err);
                    state.current_ad_id = None;
                    return ApplyOutcome::Skipped;
                }
            },
            MediaKind::Image => self.mount_image(sink, ad, &ad.media_url),
        };
        state.mounted = Some(mounted);

        if self.config.progress_bar {
            let fill = ad.display_interval(self.config.default_interval(), self.config.min_display());
            sink.reset_progress();
            sink.start_progress(fill);
            state.progress = Some(fill);
        }

        // A stop racing the mount must not leave an impression behind.
        if self.cancel.is_cancelled() {
            log::debug!("Slot {}: stopped while mounting ad {}", state.id, ad.id);
            return ApplyOutcome::Cancelled;
        }
        state.current_ad_id = Some(ad.id.clone());
        state.record_impression(&ad.id);
        self.analytics.send(AnalyticsEvent::impression(&ad.id));
        self.history.mark_shown(&ad.id).await;

        log::debug!("Slot {} now shows ad {}", state.id, ad.id);
        ApplyOutcome::Mounted
    }

    /// Flip the sound of the mounted video.
    pub fn toggle_sound(&self, state: &mut SlotState, sink: &dyn MediaSlotSink) {
        if !state.shows_video() {
            return;
        }
        let muted = !state.muted;
        apply_sound(state, sink, muted);
    }

    /// Replace failed media with the placeholder image.
    pub fn on_media_error(&self, state: &mut SlotState, sink: &dyn MediaSlotSink) {
        let url = match &state.mounted {
            Some(Mounted::Image { src, .. } | Mounted::Video { src, .. }) => src.clone(),
            Some(Mounted::Placeholder { .. }) | None => return,
        };
        let href = match &state.mounted {
            Some(Mounted::Image { href, .. }) => href.clone(),
            _ => "#".to_string(),
        };

        let err = RenderError::MediaLoad { url };
        log::warn!("Slot {}: {}; showing placeholder", state.id, err);

        let src = self.config.placeholder_image.clone();
        sink.clear();
        sink.mount_image(&ImageMount {
            src: src.clone(),
            href,
            alt: "Advertisement".to_string(),
            placeholder: true,
        });
        state.mounted = Some(Mounted::Placeholder { src });
        state.playing = false;
        state.paused_by_visibility = false;
    }

    /// Count a click on the current ad and report it.
    pub fn record_click(&self, state: &mut SlotState, href: Option<String>) {
        let Some(ad_id) = state.current_ad_id.clone() else {
            return;
        };
        state.record_click(&ad_id);
        self.analytics.send(AnalyticsEvent::click(ad_id, href));
    }

    fn video_allowed(&self) -> bool {
        if self.config.allow_video_on_slow_connection {
            return true;
        }
        match self.probe.downlink_mbps() {
            Some(mbps) => mbps >= self.config.low_bandwidth_threshold_mbps,
            None => true,
        }
    }

    fn mount_video(
        &self,
        state: &mut SlotState,
        sink: &dyn MediaSlotSink,
        ad: &AdDescriptor,
    ) -> Mounted {
        let loops = ad.video_loops();
        sink.mount_video(&VideoMount {
            src: ad.media_url.clone(),
            poster: ad.poster_url.clone(),
            loops,
            muted: true,
            toggle: ToggleView::for_muted(true),
        });
        apply_sound(state, sink, true);

        if sink.in_viewport() {
            sink.play();
            state.playing = true;
        } else {
            // Held until the slot scrolls into view.
            state.paused_by_visibility = true;
        }

        Mounted::Video {
            src: ad.media_url.clone(),
            loops,
        }
    }

    fn mount_image(&self, sink: &dyn MediaSlotSink, ad: &AdDescriptor, src: &str) -> Mounted {
        let href = ad.link_url.clone().unwrap_or_else(|| "#".to_string());
        sink.mount_image(&ImageMount {
            src: src.to_string(),
            href: href.clone(),
            alt: ad
                .title
                .clone()
                .unwrap_or_else(|| "Advertisement".to_string()),
            placeholder: false,
        });
        Mounted::Image {
            src: src.to_string(),
            href,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::testing::{FakeProbe, RecordingAnalytics, RecordingSlot, SinkCall, ad};

    struct Fixture {
        renderer: SlotRenderer,
        history: Arc<SharedHistory>,
        analytics: Arc<RecordingAnalytics>,
    }

    async fn fixture(config: RotatorConfig, downlink: Option<f64>) -> Fixture {
        let history = Arc::new(SharedHistory::load(Arc::new(MemoryStore::new()), "h", 20).await);
        let analytics = Arc::new(RecordingAnalytics::default());
        let renderer = SlotRenderer::new(
            Arc::new(config),
            Arc::clone(&history),
            analytics.clone(),
            Arc::new(FakeProbe::with_downlink(downlink)),
        );
        Fixture {
            renderer,
            history,
            analytics,
        }
    }

    fn video(id: &str) -> AdDescriptor {
        let mut ad = ad(id, 1.0);
        ad.media_kind = MediaKind::Video;
        ad.media_url = format!("/{id}.mp4");
        ad
    }

    #[tokio::test]
    async fn repeat_apply_mounts_once_but_counts_twice() {
        let f = fixture(RotatorConfig::default(), None).await;
        let sink = RecordingSlot::new(true);
        let mut state = SlotState::new(0);
        let banner = ad("banner", 1.0);

        assert_eq!(
            f.renderer.apply(&mut state, &sink, &banner).await,
            ApplyOutcome::Mounted
        );
        assert_eq!(
            f.renderer.apply(&mut state, &sink, &banner).await,
            ApplyOutcome::Repeat
        );

        assert_eq!(sink.count(|c| matches!(c, SinkCall::MountImage(_))), 1);
        assert_eq!(state.stats["banner"].impressions, 2);
        // Repeat views are counted locally only.
        assert_eq!(f.analytics.events().len(), 1);
        assert_eq!(f.history.snapshot().await, vec!["banner"]);
    }

    #[tokio::test]
    async fn image_mount_links_and_starts_progress() {
        let f = fixture(RotatorConfig::default(), None).await;
        let sink = RecordingSlot::new(true);
        let mut state = SlotState::new(3);
        let mut banner = ad("banner", 1.0);
        banner.link_url = Some("https://shop.example.com".into());
        banner.duration_seconds = Some(10.0);

        f.renderer.apply(&mut state, &sink, &banner).await;

        let calls = sink.calls();
        assert_eq!(calls[0], SinkCall::Clear);
        assert!(calls.contains(&SinkCall::MountImage(ImageMount {
            src: "/banner.png".into(),
            href: "https://shop.example.com".into(),
            alt: "Advertisement".into(),
            placeholder: false,
        })));
        assert!(calls.contains(&SinkCall::StartProgress(Duration::from_secs(10))));
        assert_eq!(state.progress, Some(Duration::from_secs(10)));
        assert_eq!(state.current_ad_id.as_deref(), Some("banner"));
    }

    #[tokio::test]
    async fn video_mounts_muted_with_matching_toggle() {
        let f = fixture(RotatorConfig::default(), None).await;
        let sink = RecordingSlot::new(true);
        let mut state = SlotState::new(0);

        f.renderer.apply(&mut state, &sink, &video("clip")).await;

        assert!(state.muted);
        assert!(state.playing);
        let calls = sink.calls();
        assert!(calls.contains(&SinkCall::SetMuted(true)));
        assert!(calls.contains(&SinkCall::Toggle(ToggleView::for_muted(true))));
        assert!(calls.contains(&SinkCall::Play));
    }

    #[tokio::test]
    async fn toggle_flips_mute_and_view_together() {
        let f = fixture(RotatorConfig::default(), None).await;
        let sink = RecordingSlot::new(true);
        let mut state = SlotState::new(0);
        f.renderer.apply(&mut state, &sink, &video("clip")).await;
        sink.take_calls();

        f.renderer.toggle_sound(&mut state, &sink);
        assert!(!state.muted);
        assert_eq!(
            sink.take_calls(),
            vec![
                SinkCall::SetMuted(false),
                SinkCall::Toggle(ToggleView::for_muted(false))
            ]
        );

        f.renderer.toggle_sound(&mut state, &sink);
        assert!(state.muted);
    }

    #[tokio::test]
    async fn offscreen_video_waits_for_visibility() {
        let f = fixture(RotatorConfig::default(), None).await;
        let sink = RecordingSlot::new(false);
        let mut state = SlotState::new(0);

        f.renderer.apply(&mut state, &sink, &video("clip")).await;

        assert!(!state.playing);
        assert!(state.paused_by_visibility);
        assert_eq!(sink.count(|c| *c == SinkCall::Play), 0);

        // Scrolled into view: the next video starts right away.
        sink.set_in_viewport(true);
        f.renderer.apply(&mut state, &sink, &video("next")).await;

        assert!(state.playing);
        assert!(!state.paused_by_visibility);
        assert_eq!(sink.count(|c| *c == SinkCall::Play), 1);
    }

    #[tokio::test]
    async fn stopped_renderer_records_nothing() {
        let f = fixture(RotatorConfig::default(), None).await;
        let cancel = CancellationToken::new();
        let renderer = f.renderer.with_cancellation(cancel.clone());
        let sink = RecordingSlot::new(true);
        let mut state = SlotState::new(0);
        cancel.cancel();

        assert_eq!(
            renderer.apply(&mut state, &sink, &ad("banner", 1.0)).await,
            ApplyOutcome::Cancelled
        );
        assert!(state.current_ad_id.is_none());
        assert!(state.stats.is_empty());
        assert!(sink.calls().is_empty());
        assert!(f.analytics.events().is_empty());
        assert!(f.history.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn slow_connection_prefers_still_image() {
        let f = fixture(RotatorConfig::default(), Some(0.2)).await;
        let sink = RecordingSlot::new(true);
        let mut state = SlotState::new(0);
        let mut clip = video("clip");
        clip.image_url = Some("/clip-still.jpg".into());

        assert_eq!(
            f.renderer.apply(&mut state, &sink, &clip).await,
            ApplyOutcome::Mounted
        );
        assert!(matches!(
            state.mounted,
            Some(Mounted::Image { ref src, .. }) if src == "/clip-still.jpg"
        ));
    }

    #[tokio::test]
    async fn slow_connection_skips_video_only_ad() {
        let f = fixture(RotatorConfig::default(), Some(0.2)).await;
        let sink = RecordingSlot::new(true);
        let mut state = SlotState::new(0);
        state.current_ad_id = Some("previous".into());

        assert_eq!(
            f.renderer.apply(&mut state, &sink, &video("clip")).await,
            ApplyOutcome::Skipped
        );
        assert!(state.current_ad_id.is_none());
        assert!(f.analytics.events().is_empty());
        assert!(f.history.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn media_error_shows_placeholder() {
        let f = fixture(RotatorConfig::default(), None).await;
        let sink = RecordingSlot::new(true);
        let mut state = SlotState::new(0);
        f.renderer.apply(&mut state, &sink, &ad("broken", 1.0)).await;
        sink.take_calls();

        f.renderer.on_media_error(&mut state, &sink);

        assert_eq!(
            state.mounted,
            Some(Mounted::Placeholder {
                src: "/images/default.jpg".into()
            })
        );
        assert!(sink.calls().iter().any(|c| matches!(
            c,
            SinkCall::MountImage(m) if m.placeholder && m.src == "/images/default.jpg"
        )));

        // A failing placeholder is left alone.
        sink.take_calls();
        f.renderer.on_media_error(&mut state, &sink);
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn clicks_count_against_current_ad() {
        let f = fixture(RotatorConfig::default(), None).await;
        let sink = RecordingSlot::new(true);
        let mut state = SlotState::new(0);

        f.renderer.record_click(&mut state, None);
        assert!(f.analytics.events().is_empty());

        f.renderer.apply(&mut state, &sink, &ad("a", 1.0)).await;
        f.renderer
            .record_click(&mut state, Some("https://shop.example.com".into()));

        assert_eq!(state.stats["a"].clicks, 1);
        let events = f.analytics.events();
        assert!(matches!(
            &events[1],
            AnalyticsEvent::Click { ad_id, href: Some(h), .. }
                if ad_id == "a" && h == "https://shop.example.com"
        ));
    }

    #[tokio::test]
    async fn progress_can_be_disabled() {
        let config = RotatorConfig {
            progress_bar: false,
            ..RotatorConfig::default()
        };
        let f = fixture(config, None).await;
        let sink = RecordingSlot::new(true);
        let mut state = SlotState::new(0);

        f.renderer.apply(&mut state, &sink, &ad("a", 1.0)).await;
        assert_eq!(sink.count(|c| matches!(c, SinkCall::StartProgress(_))), 0);
        assert!(state.progress.is_none());
    }
}
