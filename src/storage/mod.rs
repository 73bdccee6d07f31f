//! Durable session storage for rotator state.
//!
//! The rotator persists a small amount of state across runs, keyed by name:
//!
//! ```text
//! storage/
//! ├── config.toml           # Rotator configuration
//! └── ads.lastShown.json    # Recently shown ad ids, newest first
//! ```
//!
//! `LocalStorage` writes one JSON file per key; `MemoryStore` keeps values in
//! process for tests and embedders without a writable disk.

pub mod history;
pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use history::{RecentHistory, SharedHistory};
pub use local::LocalStorage;
pub use memory::MemoryStore;

/// Trait for key/value session storage backends.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read the value stored under `key`, or `None` if absent.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the value stored under `key`.
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}
