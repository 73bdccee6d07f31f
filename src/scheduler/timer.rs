// src/scheduler/timer.rs

//! Single-deadline timer owned by one slot.

use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep};

/// Far-future fallback when `now + delay` overflows.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Identifies one arming of a `SlotTimer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    generation: u64,
    deadline: Instant,
}

impl TimerHandle {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// A timer with at most one armed deadline.
///
/// Arming again replaces the previous deadline and invalidates its handle;
/// a cancelled timer never fires.
#[derive(Debug)]
pub struct SlotTimer {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
    generation: u64,
}

impl SlotTimer {
    pub fn new() -> Self {
        Self {
            sleep: Box::pin(tokio::time::sleep_until(Instant::now())),
            armed: false,
            generation: 0,
        }
    }

    /// Arm the timer `delay` from now.
    pub fn arm(&mut self, delay: Duration) -> TimerHandle {
        let now = Instant::now();
        let deadline = now
            .checked_add(delay)
            .unwrap_or_else(|| now + FAR_FUTURE);
        self.sleep.as_mut().reset(deadline);
        self.armed = true;
        self.generation += 1;
        TimerHandle {
            generation: self.generation,
            deadline,
        }
    }

    pub fn cancel(&mut self) {
        if self.armed {
            self.armed = false;
            self.generation += 1;
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.armed.then(|| self.sleep.deadline())
    }

    /// Whether `handle` is the live arming.
    pub fn is_current(&self, handle: &TimerHandle) -> bool {
        self.armed && handle.generation == self.generation
    }

    /// Resolve when the armed deadline passes; pending forever while disarmed.
    ///
    /// Cancel-safe: dropping the future leaves the timer armed.
    pub async fn fired(&mut self) {
        if !self.armed {
            future::pending::<()>().await;
        }
        self.sleep.as_mut().await;
        self.armed = false;
    }
}

impl Default for SlotTimer {
    fn default() -> Self {
        Self::new()
    }
}
