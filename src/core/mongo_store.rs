//! MongoDB-backed usage, history and preferences stores

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{Error as MongoError, ErrorKind as MongoErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::errors::{StoreError, StoreResult};
use crate::core::history::HistoryStore;
use crate::core::ledger::UsageStore;
use crate::core::models::{HistoryEntry, Preferences, UsageStat};
use crate::core::preferences::PreferencesStore;

const USAGE_COLLECTION: &str = "usageStats";
const HISTORY_COLLECTION: &str = "translations";
const PREFERENCES_COLLECTION: &str = "preferences";
const DUPLICATE_KEY: i32 = 11000;

fn classify(err: MongoError) -> StoreError {
    let duplicate = match err.kind.as_ref() {
        MongoErrorKind::Command(command) => command.code == DUPLICATE_KEY,
        MongoErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY,
        _ => false,
    };
    if duplicate {
        StoreError::Contention
    } else {
        StoreError::Backend(err.to_string())
    }
}

/// Run an upsert, once more if it lost a first-insert race
///
/// Two first-writes of the same key can both miss and both insert; the
/// unique index rejects one, and by then the document exists.
async fn upsert_with_retry<T, F, Fut>(what: &str, key: &str, attempt: F) -> StoreResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    match attempt().await {
        Err(StoreError::Contention) => {
            warn!("{} upsert for {} raced, retrying", what, key);
            attempt().await
        }
        other => other,
    }
}

async fn create_index<T: Send + Sync>(
    collection: &Collection<T>,
    keys: Document,
    name: &str,
    unique: bool,
) -> StoreResult<()> {
    let index = IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .unique(unique)
                .name(name.to_string())
                .build(),
        )
        .build();
    collection.create_index(index).await.map_err(classify)?;
    Ok(())
}

/// Connect to `database` at `uri`
pub async fn connect(uri: &str, database: &str) -> StoreResult<Database> {
    let client = Client::with_uri_str(uri).await.map_err(classify)?;
    info!("Persistence backed by MongoDB database {}", database);
    Ok(client.database(database))
}

/// Stored shape of one `(userId, date)` usage record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageDocument {
    user_id: String,
    date: String,
    translation_count: i64,
    character_count: i64,
}

impl UsageDocument {
    fn into_stat(self) -> StoreResult<UsageStat> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|e| StoreError::Backend(format!("bad date {:?}: {}", self.date, e)))?;
        Ok(UsageStat {
            user_id: self.user_id,
            date,
            translation_count: self.translation_count.max(0) as u64,
            character_count: self.character_count.max(0) as u64,
        })
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Usage store over a collection with a unique `(userId, date)` index
#[derive(Debug, Clone)]
pub struct MongoUsageStore {
    collection: Collection<UsageDocument>,
}

impl MongoUsageStore {
    /// Open the collection and make sure the unique index exists
    pub async fn open(database: &Database) -> StoreResult<Self> {
        let collection = database.collection(USAGE_COLLECTION);
        create_index(
            &collection,
            doc! { "userId": 1, "date": 1 },
            "userId_date_unique",
            true,
        )
        .await?;
        Ok(Self { collection })
    }

    async fn upsert(&self, user_id: &str, date: &str, characters: i64) -> StoreResult<UsageStat> {
        let filter = doc! { "userId": user_id, "date": date };
        let update = doc! {
            "$inc": { "translationCount": 1_i64, "characterCount": characters },
        };

        self.collection
            .find_one_and_update(filter, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(classify)?
            .ok_or_else(|| StoreError::Backend("upsert returned no document".to_string()))?
            .into_stat()
    }
}

#[async_trait]
impl UsageStore for MongoUsageStore {
    async fn increment(
        &self,
        user_id: &str,
        date: NaiveDate,
        characters: u64,
    ) -> StoreResult<UsageStat> {
        let date = date_key(date);
        let characters = i64::try_from(characters)
            .map_err(|_| StoreError::Backend("character count overflow".to_string()))?;

        upsert_with_retry("Usage", user_id, || self.upsert(user_id, &date, characters)).await
    }

    async fn get(&self, user_id: &str, date: NaiveDate) -> StoreResult<Option<UsageStat>> {
        self.collection
            .find_one(doc! { "userId": user_id, "date": date_key(date) })
            .await
            .map_err(classify)?
            .map(UsageDocument::into_stat)
            .transpose()
    }

    async fn range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<UsageStat>> {
        let filter = doc! {
            "userId": user_id,
            "date": { "$gte": date_key(from), "$lte": date_key(to) },
        };
        let documents: Vec<UsageDocument> = self
            .collection
            .find(filter)
            .sort(doc! { "date": 1 })
            .await
            .map_err(classify)?
            .try_collect()
            .await
            .map_err(classify)?;

        documents.into_iter().map(UsageDocument::into_stat).collect()
    }
}

/// Stored shape of one history entry; `createdAt` in epoch millis so it sorts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryDocument {
    user_id: String,
    source_text: String,
    target_text: String,
    source_lang: String,
    target_lang: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detected_source_lang: Option<String>,
    character_count: i64,
    created_at: i64,
}

impl HistoryDocument {
    fn from_entry(entry: HistoryEntry) -> StoreResult<Self> {
        Ok(Self {
            character_count: i64::try_from(entry.character_count)
                .map_err(|_| StoreError::Backend("character count overflow".to_string()))?,
            created_at: entry.created_at.timestamp_millis(),
            user_id: entry.user_id,
            source_text: entry.source_text,
            target_text: entry.target_text,
            source_lang: entry.source_lang,
            target_lang: entry.target_lang,
            detected_source_lang: entry.detected_source_lang,
        })
    }

    fn into_entry(self) -> StoreResult<HistoryEntry> {
        let created_at = DateTime::from_timestamp_millis(self.created_at)
            .ok_or_else(|| StoreError::Backend(format!("bad timestamp {}", self.created_at)))?;
        Ok(HistoryEntry {
            user_id: self.user_id,
            source_text: self.source_text,
            target_text: self.target_text,
            source_lang: self.source_lang,
            target_lang: self.target_lang,
            detected_source_lang: self.detected_source_lang,
            character_count: self.character_count.max(0) as u64,
            created_at,
        })
    }
}

/// History store over a collection indexed by `(userId, createdAt)`
#[derive(Debug, Clone)]
pub struct MongoHistoryStore {
    collection: Collection<HistoryDocument>,
}

impl MongoHistoryStore {
    /// Open the collection and make sure the listing index exists
    pub async fn open(database: &Database) -> StoreResult<Self> {
        let collection = database.collection(HISTORY_COLLECTION);
        create_index(
            &collection,
            doc! { "userId": 1, "createdAt": -1 },
            "userId_createdAt",
            false,
        )
        .await?;
        Ok(Self { collection })
    }
}

#[async_trait]
impl HistoryStore for MongoHistoryStore {
    async fn append(&self, entry: HistoryEntry) -> StoreResult<()> {
        self.collection
            .insert_one(HistoryDocument::from_entry(entry)?)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn recent(&self, user_id: &str, limit: usize) -> StoreResult<Vec<HistoryEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let documents: Vec<HistoryDocument> = self
            .collection
            .find(doc! { "userId": user_id })
            .sort(doc! { "createdAt": -1 })
            .limit(limit as i64)
            .await
            .map_err(classify)?
            .try_collect()
            .await
            .map_err(classify)?;

        documents.into_iter().map(HistoryDocument::into_entry).collect()
    }

    async fn clear(&self, user_id: &str) -> StoreResult<u64> {
        let result = self
            .collection
            .delete_many(doc! { "userId": user_id })
            .await
            .map_err(classify)?;
        Ok(result.deleted_count)
    }
}

/// Stored shape of one user's preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreferencesDocument {
    user_id: String,
    source_lang: String,
    target_lang: String,
}

impl From<PreferencesDocument> for Preferences {
    fn from(doc: PreferencesDocument) -> Self {
        Preferences::new(doc.source_lang, doc.target_lang)
    }
}

/// Preferences store over a collection with a unique `userId` index
#[derive(Debug, Clone)]
pub struct MongoPreferencesStore {
    collection: Collection<PreferencesDocument>,
}

impl MongoPreferencesStore {
    /// Open the collection and make sure the unique index exists
    pub async fn open(database: &Database) -> StoreResult<Self> {
        let collection = database.collection(PREFERENCES_COLLECTION);
        create_index(&collection, doc! { "userId": 1 }, "userId_unique", true).await?;
        Ok(Self { collection })
    }

    async fn set(&self, user_id: &str, preferences: &Preferences) -> StoreResult<Preferences> {
        let update = doc! {
            "$set": {
                "sourceLang": preferences.source_lang.as_str(),
                "targetLang": preferences.target_lang.as_str(),
            },
        };
        self.collection
            .find_one_and_update(doc! { "userId": user_id }, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(classify)?
            .map(Preferences::from)
            .ok_or_else(|| StoreError::Backend("upsert returned no document".to_string()))
    }
}

#[async_trait]
impl PreferencesStore for MongoPreferencesStore {
    async fn get(&self, user_id: &str) -> StoreResult<Option<Preferences>> {
        Ok(self
            .collection
            .find_one(doc! { "userId": user_id })
            .await
            .map_err(classify)?
            .map(Preferences::from))
    }

    async fn upsert(&self, user_id: &str, preferences: &Preferences) -> StoreResult<Preferences> {
        upsert_with_retry("Preferences", user_id, || self.set(user_id, preferences)).await
    }
}
