//! Slot rotation scheduling.
//!
//! A `Rotator` owns one `SlotScheduler` task per slot. Each task loops
//! through the phases in `SlotPhase`, arming its own `SlotTimer` between
//! ticks.

mod phase;
mod rotator;
mod slot;
mod timer;

pub use phase::{Cadence, SlotPhase};
pub use rotator::{Rotator, RotatorDeps, RotatorSnapshot, SlotHost};
pub use slot::{SlotSnapshot, TickOutcome};
pub use timer::{SlotTimer, TimerHandle};
