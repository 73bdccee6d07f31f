//! Recently shown ad ids, shared by all slots and persisted across runs.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::storage::SessionStore;

/// Bounded, newest-first list of ad ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentHistory {
    ids: VecDeque<String>,
    limit: usize,
}

impl RecentHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            ids: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Build from a persisted list, keeping only the newest `limit` ids.
    pub fn from_ids(ids: impl IntoIterator<Item = String>, limit: usize) -> Self {
        let mut ids: VecDeque<String> = ids.into_iter().collect();
        ids.truncate(limit);
        Self { ids, limit }
    }

    /// Record an id as the most recent; the oldest is evicted past the bound.
    pub fn mark_shown(&mut self, id: impl Into<String>) {
        self.ids.push_front(id.into());
        self.ids.truncate(self.limit);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|s| s == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// `RecentHistory` behind a lock, written through to a `SessionStore`.
///
/// Read-modify-write and the following persist happen under one lock, so
/// concurrent slot tasks never interleave updates.
pub struct SharedHistory {
    inner: Mutex<RecentHistory>,
    store: Arc<dyn SessionStore>,
    key: String,
}

impl SharedHistory {
    /// Load persisted history; unreadable state starts empty.
    pub async fn load(store: Arc<dyn SessionStore>, key: impl Into<String>, limit: usize) -> Self {
        let key = key.into();
        let history = match store.read_bytes(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<String>>(&bytes) {
                Ok(ids) => RecentHistory::from_ids(ids, limit),
                Err(e) => {
                    log::warn!("Discarding unreadable history '{}': {}", key, e);
                    RecentHistory::new(limit)
                }
            },
            Ok(None) => RecentHistory::new(limit),
            Err(e) => {
                log::warn!("Failed to read history '{}': {}", key, e);
                RecentHistory::new(limit)
            }
        };

        log::debug!("Loaded {} recently shown ids from '{}'", history.len(), key);
        Self {
            inner: Mutex::new(history),
            store,
            key,
        }
    }

    /// Current ids, newest first.
    pub async fn snapshot(&self) -> Vec<String> {
        self.inner.lock().await.ids()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.lock().await.contains(id)
    }

    /// Record `id` and persist. Persistence failures are logged and ignored.
    pub async fn mark_shown(&self, id: &str) {
        let mut history = self.inner.lock().await;
        history.mark_shown(id);
        self.persist(&history).await;
    }

    /// Forget every id, in memory and in the store.
    pub async fn clear(&self) {
        let mut history = self.inner.lock().await;
        *history = RecentHistory::new(history.limit());
        if let Err(e) = self.store.remove(&self.key).await {
            log::warn!("Failed to clear history '{}': {}", self.key, e);
        }
    }

    async fn persist(&self, history: &RecentHistory) {
        let result = match serde_json::to_vec(&history.ids()) {
            Ok(bytes) => self.store.write_bytes(&self.key, &bytes).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            log::warn!("Failed to persist history '{}': {}", self.key, e);
        }
    }
}
