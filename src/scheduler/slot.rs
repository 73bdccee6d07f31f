// src/scheduler/slot.rs

//! The per-slot rotation task.
//!
//! Each slot runs as its own tokio task that exclusively owns its
//! `SlotState` and `SlotTimer`. Host events arrive as `SlotCommand`s and
//! observers read the latest `SlotSnapshot` from a `watch` channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::models::{AdDescriptor, AdStats, Mounted, SlotId, SlotState};
use crate::scheduler::{Cadence, SlotPhase, SlotTimer};
use crate::services::{ApplyOutcome, Fetcher, MediaSlotSink, Selector, SlotRenderer, VisibilityGovernor};
use crate::storage::SharedHistory;

/// Host event or request routed to one slot.
#[derive(Debug)]
pub(crate) enum SlotCommand {
    RefreshNow(oneshot::Sender<TickOutcome>),
    Click { href: Option<String> },
    Intersection(f64),
    ToggleSound,
    MediaError,
    /// The video of ad `ad_id` reached its end
    VideoEnded { ad_id: String },
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Applied(ApplyOutcome),
    /// Page hidden; nothing fetched
    SkippedHidden,
    /// Fetch failed after all retries; backoff armed
    Failed,
    /// A tick was already running
    Busy,
    /// Rotator stopped before the tick could finish
    Cancelled,
}

/// Latest observable state of a slot.
#[derive(Debug, Clone, Default)]
pub struct SlotSnapshot {
    pub id: SlotId,
    pub phase: SlotPhase,
    pub current_ad_id: Option<String>,
    pub mounted: Option<Mounted>,
    pub muted: bool,
    pub playing: bool,
    pub consecutive_failures: u32,
    /// Delay of the most recently armed tick
    pub next_delay: Option<Duration>,
    pub stats: HashMap<String, AdStats>,
}

/// Collaborators shared by every slot of one rotator.
pub(crate) struct SlotContext {
    pub fetcher: Fetcher,
    pub selector: Selector,
    pub renderer: SlotRenderer,
    pub governor: VisibilityGovernor,
    pub history: Arc<SharedHistory>,
    pub cadence: Cadence,
    pub cancel: CancellationToken,
}

/// State machine driving one slot.
pub(crate) struct SlotScheduler {
    ctx: Arc<SlotContext>,
    sink: Arc<dyn MediaSlotSink>,
    state: SlotState,
    phase: SlotPhase,
    timer: SlotTimer,
    failures: u32,
    next_delay: Option<Duration>,
    rng: StdRng,
    commands: mpsc::Receiver<SlotCommand>,
    snapshot: watch::Sender<SlotSnapshot>,
}

impl SlotScheduler {
    pub fn new(
        id: SlotId,
        ctx: Arc<SlotContext>,
        sink: Arc<dyn MediaSlotSink>,
        rng: StdRng,
        commands: mpsc::Receiver<SlotCommand>,
        snapshot: watch::Sender<SlotSnapshot>,
    ) -> Self {
        Self {
            ctx,
            sink,
            state: SlotState::new(id),
            phase: SlotPhase::Idle,
            timer: SlotTimer::new(),
            failures: 0,
            next_delay: None,
            rng,
            commands,
            snapshot,
        }
    }

    /// Rotate until the rotator is stopped or dropped.
    pub async fn run(mut self) {
        let delay = self.ctx.cadence.stagger_delay(self.state.id);
        self.advance(SlotPhase::StaggeredStart);
        self.timer.arm(delay);
        self.next_delay = Some(delay);
        self.publish();
        log::debug!("Slot {} first tick in {:?}", self.state.id, delay);

        loop {
            tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => break,
                _ = self.timer.fired() => {
                    self.tick().await;
                }
                command = self.commands.recv() => match command {
                    Some(SlotCommand::RefreshNow(reply)) => {
                        let outcome = self.tick().await;
                        let _ = reply.send(outcome);
                    }
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        self.timer.cancel();
        self.advance(SlotPhase::Stopped);
        self.publish();
        log::debug!("Slot {} stopped", self.state.id);
    }

    /// One Fetching → Applying → Scheduled pass.
    async fn tick(&mut self) -> TickOutcome {
        if self.ctx.cancel.is_cancelled() {
            return TickOutcome::Cancelled;
        }
        // A manual refresh supersedes the armed tick.
        self.timer.cancel();

        if self.ctx.governor.page_hidden() {
            let delay = self.ctx.cadence.hidden_delay();
            log::debug!("Slot {}: page hidden, next check in {:?}", self.state.id, delay);
            self.schedule(delay);
            return TickOutcome::SkippedHidden;
        }

        self.advance(SlotPhase::Fetching);
        self.publish();
        let fetched = match self.fetch_guarded().await {
            Some(result) => result,
            None => return TickOutcome::Cancelled,
        };

        let candidates = match fetched {
            Ok(candidates) => {
                self.failures = 0;
                candidates
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                let delay = self.ctx.cadence.error_delay(self.failures);
                log::warn!(
                    "Slot {}: {} (failure {} in a row), next try in {:?}",
                    self.state.id,
                    e,
                    self.failures,
                    delay
                );
                self.schedule(delay);
                return TickOutcome::Failed;
            }
        };

        self.advance(SlotPhase::Applying);
        let recent = self.ctx.history.snapshot().await;
        let Some(ad) = self
            .ctx
            .selector
            .pick(&candidates, &recent, &mut self.rng)
            .cloned()
        else {
            self.schedule(self.ctx.cadence.default_interval);
            return TickOutcome::Failed;
        };

        if self.ctx.cancel.is_cancelled() {
            log::debug!("Slot {}: stopped before apply, dropping ad {}", self.state.id, ad.id);
            return TickOutcome::Cancelled;
        }

        let outcome = self
            .ctx
            .renderer
            .apply(&mut self.state, self.sink.as_ref(), &ad)
            .await;
        let delay = match outcome {
            ApplyOutcome::Cancelled => return TickOutcome::Cancelled,
            ApplyOutcome::Skipped => self.ctx.cadence.default_interval,
            ApplyOutcome::Mounted | ApplyOutcome::Repeat => self.ctx.cadence.after_apply(&ad),
        };
        self.schedule(delay);
        TickOutcome::Applied(outcome)
    }

    /// Fetch while still serving host events. `None` when the rotator stops
    /// first; the in-flight request is dropped and its result never applied.
    async fn fetch_guarded(&mut self) -> Option<Result<Vec<AdDescriptor>, FetchError>> {
        let ctx = Arc::clone(&self.ctx);
        let fetch = ctx.fetcher.fetch();
        tokio::pin!(fetch);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    log::debug!("Slot {}: stopped during fetch, discarding result", self.state.id);
                    return None;
                }
                result = &mut fetch => return Some(result),
                command = self.commands.recv() => match command {
                    Some(SlotCommand::RefreshNow(reply)) => {
                        let _ = reply.send(TickOutcome::Busy);
                    }
                    Some(command) => self.handle(command),
                    None => return None,
                },
            }
        }
    }

    fn handle(&mut self, command: SlotCommand) {
        let sink = self.sink.as_ref();
        match command {
            SlotCommand::Click { href } => self.ctx.renderer.record_click(&mut self.state, href),
            SlotCommand::Intersection(ratio) => {
                let action = self.ctx.governor.on_intersection(&mut self.state, sink, ratio);
                log::trace!("Slot {}: intersection {:.2} -> {:?}", self.state.id, ratio, action);
            }
            SlotCommand::ToggleSound => self.ctx.renderer.toggle_sound(&mut self.state, sink),
            SlotCommand::MediaError => self.ctx.renderer.on_media_error(&mut self.state, sink),
            SlotCommand::VideoEnded { ad_id } => {
                let finite = matches!(self.state.mounted, Some(Mounted::Video { loops: false, .. }));
                // An `ended` from a replaced video says nothing about the current one.
                let current = self.state.current_ad_id.as_deref() == Some(ad_id.as_str());
                if !current {
                    log::debug!("Slot {}: ignoring ended event for stale ad {}", self.state.id, ad_id);
                } else if finite && self.phase.is_waiting() {
                    log::debug!("Slot {}: video ended, rotating now", self.state.id);
                    self.schedule(Duration::ZERO);
                }
            }
            SlotCommand::RefreshNow(reply) => {
                let _ = reply.send(TickOutcome::Busy);
            }
        }
        self.publish();
    }

    /// Arm the next tick unless the rotator has stopped.
    fn schedule(&mut self, delay: Duration) {
        if self.ctx.cancel.is_cancelled() {
            return;
        }
        self.timer.arm(delay);
        self.next_delay = Some(delay);
        self.advance(SlotPhase::Scheduled(delay));
        self.advance(SlotPhase::ActiveWait);
        self.publish();
    }

    fn advance(&mut self, next: SlotPhase) {
        if !self.phase.can_advance_to(&next) {
            log::debug!(
                "Slot {}: unexpected transition {} -> {}",
                self.state.id,
                self.phase,
                next
            );
        }
        log::trace!("Slot {}: {} -> {}", self.state.id, self.phase, next);
        self.phase = next;
    }

    fn publish(&self) {
        self.snapshot.send_replace(SlotSnapshot {
            id: self.state.id,
            phase: self.phase,
            current_ad_id: self.state.current_ad_id.clone(),
            mounted: self.state.mounted.clone(),
            muted: self.state.muted,
            playing: self.state.playing,
            consecutive_failures: self.failures,
            next_delay: self.next_delay,
            stats: self.state.stats.clone(),
        });
    }
}
