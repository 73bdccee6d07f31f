// src/lib.rs

//! adrotor: weighted, visibility-aware ad rotation for display slots.

pub mod error;
pub mod host;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{AppError, FetchError, RenderError, Result};
pub use scheduler::{Rotator, RotatorDeps, RotatorSnapshot, SlotHost, TickOutcome};
