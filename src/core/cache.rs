//! Short-lived cache for provider metadata (language lists and quota)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::core::clock::{elapsed_ms, Clock};
use crate::core::client::TranslationProvider;
use crate::core::errors::Result;
use crate::core::languages::fallback_languages;
use crate::core::models::{Language, LanguageDirection, ProviderUsage};

/// Cached value and when it was fetched
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    timestamp: DateTime<Utc>,
}

impl<T: Clone> CacheEntry<T> {
    fn fresh(&self, now: DateTime<Utc>, ttl: Duration) -> Option<T> {
        (elapsed_ms(self.timestamp, now) < ttl.as_millis() as u64).then(|| self.data.clone())
    }
}

/// TTL cache in front of the provider's metadata endpoints
pub struct MetadataCache {
    provider: Arc<dyn TranslationProvider>,
    clock: Arc<dyn Clock>,
    language_ttl: Duration,
    usage_ttl: Duration,
    languages: RwLock<HashMap<LanguageDirection, CacheEntry<Vec<Language>>>>,
    usage: RwLock<Option<CacheEntry<ProviderUsage>>>,
}

impl MetadataCache {
    /// Create an empty cache
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        clock: Arc<dyn Clock>,
        language_ttl: Duration,
        usage_ttl: Duration,
    ) -> Self {
        Self {
            provider,
            clock,
            language_ttl,
            usage_ttl,
            languages: RwLock::new(HashMap::new()),
            usage: RwLock::new(None),
        }
    }

    /// Languages for `direction`, in canonical codes, from cache while fresh
    pub async fn get_languages(&self, direction: LanguageDirection) -> Result<Vec<Language>> {
        let now = self.clock.now();
        if let Some(cached) = self
            .languages
            .read()
            .await
            .get(&direction)
            .and_then(|entry| entry.fresh(now, self.language_ttl))
        {
            debug!("Language cache hit for {}", direction);
            return Ok(cached);
        }

        debug!("Language cache miss for {}, fetching from {}", direction, self.provider.name());
        let dialect = self.provider.dialect();
        let languages: Vec<Language> = self
            .provider
            .fetch_languages(direction)
            .await?
            .into_iter()
            .map(|l| Language::new(dialect.from_provider_lang(&l.code), l.name))
            .collect();

        self.languages.write().await.insert(
            direction,
            CacheEntry {
                data: languages.clone(),
                timestamp: self.clock.now(),
            },
        );

        Ok(languages)
    }

    /// Like `get_languages`, but never fails: serves the static list instead
    pub async fn languages_or_fallback(&self, direction: LanguageDirection) -> Vec<Language> {
        match self.get_languages(direction).await {
            Ok(languages) => languages,
            Err(e) => {
                warn!("Falling back to static {} languages: {}", direction, e);
                fallback_languages()
            }
        }
    }

    /// Provider quota, from cache while fresh
    pub async fn get_usage(&self) -> Result<ProviderUsage> {
        let now = self.clock.now();
        if let Some(cached) = self
            .usage
            .read()
            .await
            .as_ref()
            .and_then(|entry| entry.fresh(now, self.usage_ttl))
        {
            return Ok(cached);
        }

        let usage = self.provider.fetch_usage().await?;
        *self.usage.write().await = Some(CacheEntry {
            data: usage,
            timestamp: self.clock.now(),
        });
        Ok(usage)
    }

    /// Drop every cached entry
    pub async fn reset(&self) {
        self.languages.write().await.clear();
        *self.usage.write().await = None;
    }
}
