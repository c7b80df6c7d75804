//! Per-user translation history
//!
//! Every successful translation is appended for its caller. Listing returns
//! the newest entries first, capped at `MAX_HISTORY_LIMIT`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::clock::Clock;
use crate::core::errors::StoreResult;
use crate::core::models::{HistoryEntry, TranslationRequest, TranslationResult};

/// Entries returned when the caller gives no limit
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Largest page a caller may ask for
pub const MAX_HISTORY_LIMIT: usize = 200;

/// Backing store for history entries
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one entry
    async fn append(&self, entry: HistoryEntry) -> StoreResult<()>;

    /// Up to `limit` entries for `user_id`, newest first
    async fn recent(&self, user_id: &str, limit: usize) -> StoreResult<Vec<HistoryEntry>>;

    /// Drop every entry for `user_id`; returns how many were removed
    async fn clear(&self, user_id: &str) -> StoreResult<u64>;
}

/// Process-local store keeping the newest `MAX_HISTORY_LIMIT` entries per user
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    entries: RwLock<HashMap<String, VecDeque<HistoryEntry>>>,
}

impl InMemoryHistoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, entry: HistoryEntry) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let list = entries.entry(entry.user_id.clone()).or_default();
        list.push_front(entry);
        list.truncate(MAX_HISTORY_LIMIT);
        Ok(())
    }

    async fn recent(&self, user_id: &str, limit: usize) -> StoreResult<Vec<HistoryEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(user_id)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, user_id: &str) -> StoreResult<u64> {
        let removed = self.entries.write().await.remove(user_id);
        Ok(removed.map_or(0, |list| list.len() as u64))
    }
}

/// Translation history stamped with the injected clock
pub struct TranslationHistory {
    store: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
}

impl TranslationHistory {
    /// History over `store`
    pub fn new(store: Arc<dyn HistoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Append the outcome of one successful translation
    pub async fn record(
        &self,
        user_id: &str,
        request: &TranslationRequest,
        result: &TranslationResult,
    ) -> StoreResult<HistoryEntry> {
        let entry = HistoryEntry {
            user_id: user_id.to_string(),
            source_text: request.text.clone(),
            target_text: result.translated_text.clone(),
            source_lang: request.explicit_source_lang().unwrap_or("auto").to_string(),
            target_lang: request.target_lang.trim().to_string(),
            detected_source_lang: Some(result.detected_source_lang.clone())
                .filter(|lang| !lang.is_empty()),
            character_count: request.text.chars().count() as u64,
            created_at: self.clock.now(),
        };
        self.store.append(entry.clone()).await?;
        debug!("History entry added for {}", user_id);
        Ok(entry)
    }

    /// Newest entries, `DEFAULT_HISTORY_LIMIT` unless asked, never more than
    /// `MAX_HISTORY_LIMIT`
    pub async fn list(&self, user_id: &str, limit: Option<usize>) -> StoreResult<Vec<HistoryEntry>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);
        self.store.recent(user_id, limit).await
    }

    /// Remove the caller's history
    pub async fn clear(&self, user_id: &str) -> StoreResult<u64> {
        self.store.clear(user_id).await
    }
}
