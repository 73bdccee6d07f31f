// src/scheduler/rotator.rs

//! Rotator controller: starts one task per slot and routes host events.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{AdStats, Config, SlotId};
use crate::scheduler::slot::{SlotCommand, SlotContext, SlotScheduler};
use crate::scheduler::{Cadence, SlotSnapshot, TickOutcome};
use crate::services::{
    AdSource, AnalyticsSink, Fetcher, MediaSlotSink, Selector, SlotRenderer, VisibilityGovernor,
    VisibilityProbe,
};
use crate::storage::{SessionStore, SharedHistory};

/// Pending host events per slot before new ones are dropped.
const COMMAND_BUFFER: usize = 32;

/// Host surface that owns the slots.
pub trait SlotHost: Send + Sync {
    /// Every slot matching `selector`, in display order.
    fn find_slots(&self, selector: &str) -> Vec<Arc<dyn MediaSlotSink>>;
}

/// External collaborators of a rotator.
pub struct RotatorDeps {
    pub source: Arc<dyn AdSource>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub store: Arc<dyn SessionStore>,
    pub probe: Arc<dyn VisibilityProbe>,
    /// Fixed seed for reproducible selection; entropy when `None`
    pub seed: Option<u64>,
}

/// Point-in-time view of a rotator.
#[derive(Debug, Clone, Default)]
pub struct RotatorSnapshot {
    pub stopped: bool,
    /// Recently shown ids, newest first
    pub recent: Vec<String>,
    /// Per-ad counters summed over all slots
    pub stats: HashMap<String, AdStats>,
    pub slots: Vec<SlotSnapshot>,
}

struct SlotHandle {
    id: SlotId,
    commands: mpsc::Sender<SlotCommand>,
    snapshot: watch::Receiver<SlotSnapshot>,
}

/// Controller returned by `Rotator::start`.
///
/// Dropping it stops every slot.
pub struct Rotator {
    slots: Vec<SlotHandle>,
    tasks: Vec<JoinHandle<()>>,
    history: Option<Arc<SharedHistory>>,
    probe: Arc<dyn VisibilityProbe>,
    cancel: CancellationToken,
    page_hidden: watch::Sender<bool>,
    stopped: AtomicBool,
}

impl Rotator {
    /// Discover slots and start rotating them.
    ///
    /// With no matching slots the returned rotator does nothing.
    pub async fn start(config: &Config, host: &dyn SlotHost, deps: RotatorDeps) -> Result<Self> {
        config.validate()?;
        let rotator_config = &config.rotator;

        let (page_hidden, hidden_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        let sinks = host.find_slots(&rotator_config.slot_selector);
        if sinks.is_empty() {
            log::warn!(
                "No ad slots match '{}'; rotator is idle",
                rotator_config.slot_selector
            );
            return Ok(Self {
                slots: Vec::new(),
                tasks: Vec::new(),
                history: None,
                probe: deps.probe,
                cancel,
                page_hidden,
                stopped: AtomicBool::new(false),
            });
        }

        let history = Arc::new(
            SharedHistory::load(
                Arc::clone(&deps.store),
                rotator_config.storage_key.clone(),
                rotator_config.recently_shown_limit,
            )
            .await,
        );
        let shared_config = Arc::new(rotator_config.clone());
        let governor = VisibilityGovernor::new(rotator_config.min_video_play_visibility, hidden_rx);

        let ctx = Arc::new(SlotContext {
            fetcher: Fetcher::from_config(deps.source, rotator_config),
            selector: Selector::new(rotator_config.recent_penalty),
            renderer: SlotRenderer::new(
                shared_config,
                Arc::clone(&history),
                deps.analytics,
                Arc::clone(&deps.probe),
            )
            .with_cancellation(cancel.clone()),
            governor: governor.clone(),
            history: Arc::clone(&history),
            cadence: Cadence::from_config(rotator_config),
            cancel: cancel.clone(),
        });

        let mut slots = Vec::with_capacity(sinks.len());
        let mut tasks = Vec::with_capacity(sinks.len());
        for (id, sink) in sinks.into_iter().enumerate() {
            let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
            let (snapshot_tx, snapshot_rx) = watch::channel(SlotSnapshot {
                id,
                ..SlotSnapshot::default()
            });
            let rng = match deps.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
                None => StdRng::from_entropy(),
            };

            deps.probe.observe(id, governor.threshold());
            let scheduler =
                SlotScheduler::new(id, Arc::clone(&ctx), sink, rng, command_rx, snapshot_tx);
            tasks.push(tokio::spawn(scheduler.run()));
            slots.push(SlotHandle {
                id,
                commands: command_tx,
                snapshot: snapshot_rx,
            });
        }

        log::info!("Rotating {} ad slot(s)", slots.len());
        Ok(Self {
            slots,
            tasks,
            history: Some(history),
            probe: deps.probe,
            cancel,
            page_hidden,
            stopped: AtomicBool::new(false),
        })
    }

    /// Cancel every timer and in-flight fetch and detach the observers.
    /// Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        for slot in &self.slots {
            self.probe.unobserve(slot.id);
        }
        log::info!("Rotator stopped");
    }

    /// Stop and wait for every slot task to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        for result in join_all(std::mem::take(&mut self.tasks)).await {
            if let Err(e) = result {
                log::warn!("Slot task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Run a tick on every slot now, replacing their armed timers.
    pub async fn refresh_now(&self) -> Vec<TickOutcome> {
        if self.is_stopped() {
            return vec![TickOutcome::Cancelled; self.slots.len()];
        }

        let replies = self.slots.iter().map(|slot| async move {
            let (tx, rx) = oneshot::channel();
            if slot.commands.send(SlotCommand::RefreshNow(tx)).await.is_err() {
                return TickOutcome::Cancelled;
            }
            rx.await.unwrap_or(TickOutcome::Cancelled)
        });
        join_all(replies).await
    }

    pub async fn snapshot(&self) -> RotatorSnapshot {
        let recent = match &self.history {
            Some(history) => history.snapshot().await,
            None => Vec::new(),
        };

        let slots: Vec<SlotSnapshot> = self
            .slots
            .iter()
            .map(|slot| slot.snapshot.borrow().clone())
            .collect();

        let mut stats: HashMap<String, AdStats> = HashMap::new();
        for slot in &slots {
            for (ad_id, counters) in &slot.stats {
                stats.entry(ad_id.clone()).or_default().merge(counters);
            }
        }

        RotatorSnapshot {
            stopped: self.is_stopped(),
            recent,
            stats,
            slots,
        }
    }

    /// Forget the recently shown history.
    pub async fn clear_history(&self) {
        if let Some(history) = &self.history {
            history.clear().await;
        }
    }

    /// Report page (tab) visibility.
    pub fn set_page_hidden(&self, hidden: bool) {
        self.page_hidden.send_replace(hidden);
    }

    pub fn record_click(&self, slot: SlotId, href: Option<String>) {
        self.send(slot, SlotCommand::Click { href });
    }

    /// Report a new viewport intersection ratio for `slot`.
    pub fn report_intersection(&self, slot: SlotId, ratio: f64) {
        self.send(slot, SlotCommand::Intersection(ratio));
    }

    pub fn toggle_sound(&self, slot: SlotId) {
        self.send(slot, SlotCommand::ToggleSound);
    }

    /// Report that the slot's media failed to load.
    pub fn report_media_error(&self, slot: SlotId) {
        self.send(slot, SlotCommand::MediaError);
    }

    /// Report that the video of `ad_id` played to its end in `slot`.
    pub fn report_video_ended(&self, slot: SlotId, ad_id: impl Into<String>) {
        self.send(
            slot,
            SlotCommand::VideoEnded {
                ad_id: ad_id.into(),
            },
        );
    }

    fn send(&self, slot: SlotId, command: SlotCommand) {
        if self.is_stopped() {
            return;
        }
        let Some(handle) = self.slots.get(slot) else {
            log::debug!("Ignoring event for unknown slot {}", slot);
            return;
        };
        if let Err(e) = handle.commands.try_send(command) {
            log::warn!("Dropping event for slot {}: {}", slot, e);
        }
    }
}

impl Drop for Rotator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
