//! Per-user, per-day usage counters
//!
//! Each successful translation increments `(user, day)` by one translation and
//! by the number of characters translated. The increment must be atomic in the
//! backing store; the ledger itself holds no locks.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::clock::Clock;
use crate::core::errors::StoreResult;
use crate::core::models::UsageStat;

/// Backing store for usage counters
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Atomically add one translation and `characters` to `(user_id, date)`,
    /// creating the record if needed; returns the updated record
    async fn increment(&self, user_id: &str, date: NaiveDate, characters: u64)
        -> StoreResult<UsageStat>;

    /// Record for `(user_id, date)`, if any
    async fn get(&self, user_id: &str, date: NaiveDate) -> StoreResult<Option<UsageStat>>;

    /// Records for `user_id` with `from <= date <= to`, ascending by date
    async fn range(&self, user_id: &str, from: NaiveDate, to: NaiveDate)
        -> StoreResult<Vec<UsageStat>>;
}

/// Process-local store, lost on restart
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    records: RwLock<BTreeMap<(String, NaiveDate), UsageStat>>,
}

impl InMemoryUsageStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn increment(
        &self,
        user_id: &str,
        date: NaiveDate,
        characters: u64,
    ) -> StoreResult<UsageStat> {
        let mut records = self.records.write().await;
        let record = records
            .entry((user_id.to_string(), date))
            .or_insert_with(|| UsageStat::empty(user_id, date));
        record.translation_count += 1;
        record.character_count += characters;
        Ok(record.clone())
    }

    async fn get(&self, user_id: &str, date: NaiveDate) -> StoreResult<Option<UsageStat>> {
        let records = self.records.read().await;
        Ok(records.get(&(user_id.to_string(), date)).cloned())
    }

    async fn range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<UsageStat>> {
        if from > to {
            return Ok(Vec::new());
        }
        let records = self.records.read().await;
        Ok(records
            .range((user_id.to_string(), from)..=(user_id.to_string(), to))
            .map(|(_, stat)| stat.clone())
            .collect())
    }
}

/// Usage ledger keyed by the caller's current UTC day
pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
}

impl UsageLedger {
    /// Ledger over `store`, dated by `clock`
    pub fn new(store: Arc<dyn UsageStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Today's date in UTC
    pub fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    /// Count one translation of `characters` characters for today
    pub async fn record(&self, user_id: &str, characters: u64) -> StoreResult<UsageStat> {
        let stat = self.store.increment(user_id, self.today(), characters).await?;
        debug!(
            "Usage for {} on {}: {} translations, {} characters",
            user_id, stat.date, stat.translation_count, stat.character_count
        );
        Ok(stat)
    }

    /// Today's record, if any translation happened today
    pub async fn get_today(&self, user_id: &str) -> StoreResult<Option<UsageStat>> {
        self.store.get(user_id, self.today()).await
    }

    /// Records in the inclusive date range
    pub async fn get_range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<UsageStat>> {
        self.store.range(user_id, from, to).await
    }
}
