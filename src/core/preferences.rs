//! Per-user language pair preferences

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::errors::{Result, StoreResult, TranslationError};
use crate::core::models::Preferences;

/// Backing store for preferences, one record per user
#[async_trait]
pub trait PreferencesStore: Send + Sync {
    /// Saved preferences for `user_id`, if any
    async fn get(&self, user_id: &str) -> StoreResult<Option<Preferences>>;

    /// Insert or replace the record for `user_id`
    async fn upsert(&self, user_id: &str, preferences: &Preferences) -> StoreResult<Preferences>;
}

/// Process-local store, lost on restart
#[derive(Debug, Default)]
pub struct InMemoryPreferencesStore {
    records: RwLock<HashMap<String, Preferences>>,
}

impl InMemoryPreferencesStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferencesStore for InMemoryPreferencesStore {
    async fn get(&self, user_id: &str) -> StoreResult<Option<Preferences>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn upsert(&self, user_id: &str, preferences: &Preferences) -> StoreResult<Preferences> {
        self.records
            .write()
            .await
            .insert(user_id.to_string(), preferences.clone());
        Ok(preferences.clone())
    }
}

/// Validating front for a `PreferencesStore`
pub struct UserPreferences {
    store: Arc<dyn PreferencesStore>,
}

impl UserPreferences {
    /// Preferences over `store`
    pub fn new(store: Arc<dyn PreferencesStore>) -> Self {
        Self { store }
    }

    /// Saved preferences, or the defaults for a caller who never saved any
    pub async fn get(&self, user_id: &str) -> Result<Preferences> {
        Ok(self.store.get(user_id).await?.unwrap_or_default())
    }

    /// Validate and save
    pub async fn save(&self, user_id: &str, preferences: &Preferences) -> Result<Preferences> {
        let preferences = preferences.normalized();
        if preferences.target_lang.is_empty() || preferences.target_lang.eq_ignore_ascii_case("auto")
        {
            return Err(TranslationError::invalid_input(
                "targetLang is required and cannot be auto",
            ));
        }
        Ok(self.store.upsert(user_id, &preferences).await?)
    }
}
