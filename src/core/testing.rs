//! In-process fakes shared by unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::core::auth::IdentityResolver;
use crate::core::client::TranslationProvider;
use crate::core::errors::{ErrorKind, Result, StoreError, StoreResult, TranslationError};
use crate::core::history::HistoryStore;
use crate::core::languages::LanguageDialect;
use crate::core::ledger::UsageStore;
use crate::core::models::{
    AuthUser, HistoryEntry, Language, LanguageDirection, ProviderTranslation, ProviderUsage, UsageStat,
};

/// Provider that answers from memory and counts calls
pub struct FakeProvider {
    dialect: LanguageDialect,
    reply: ProviderTranslation,
    failure: Option<ErrorKind>,
    languages: Vec<Language>,
    translate_calls: AtomicUsize,
    language_calls: AtomicUsize,
    usage_calls: AtomicUsize,
    last_request: Mutex<Option<(String, String, Option<String>)>>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self {
            dialect: LanguageDialect::DeepL,
            reply: ProviderTranslation {
                text: "Hola".to_string(),
                detected_source_lang: Some("EN".to_string()),
            },
            failure: None,
            languages: vec![Language::new("EN", "English"), Language::new("ES", "Spanish")],
            translate_calls: AtomicUsize::new(0),
            language_calls: AtomicUsize::new(0),
            usage_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }
}

impl FakeProvider {
    pub fn failing(kind: ErrorKind) -> Self {
        Self {
            failure: Some(kind),
            ..Default::default()
        }
    }

    pub fn with_dialect(mut self, dialect: LanguageDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_reply(mut self, text: &str, detected: Option<&str>) -> Self {
        self.reply = ProviderTranslation {
            text: text.to_string(),
            detected_source_lang: detected.map(str::to_string),
        };
        self
    }

    pub fn with_languages(mut self, languages: Vec<Language>) -> Self {
        self.languages = languages;
        self
    }

    pub fn translate_calls(&self) -> usize {
        self.translate_calls.load(Ordering::SeqCst)
    }

    pub fn language_calls(&self) -> usize {
        self.language_calls.load(Ordering::SeqCst)
    }

    pub fn usage_calls(&self) -> usize {
        self.usage_calls.load(Ordering::SeqCst)
    }

    /// `(text, target, source)` of the latest translate call
    pub fn last_request(&self) -> Option<(String, String, Option<String>)> {
        self.last_request.lock().unwrap().clone()
    }

    fn fail(&self) -> Result<()> {
        match self.failure {
            Some(kind) => Err(TranslationError::from_provider_status(kind, 0)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TranslationProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn dialect(&self) -> LanguageDialect {
        self.dialect
    }

    async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> Result<ProviderTranslation> {
        self.translate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some((
            text.to_string(),
            target_lang.to_string(),
            source_lang.map(str::to_string),
        ));
        self.fail()?;
        Ok(self.reply.clone())
    }

    async fn fetch_languages(&self, _direction: LanguageDirection) -> Result<Vec<Language>> {
        self.language_calls.fetch_add(1, Ordering::SeqCst);
        self.fail()?;
        Ok(self.languages.clone())
    }

    async fn fetch_usage(&self) -> Result<ProviderUsage> {
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        self.fail()?;
        Ok(ProviderUsage {
            character_count: 1200,
            character_limit: 500_000,
        })
    }
}

/// Maps bearer tokens straight to user ids
#[derive(Default)]
pub struct FakeIdentity {
    users: HashMap<String, String>,
}

impl FakeIdentity {
    pub fn with_user(mut self, token: &str, user_id: &str) -> Self {
        self.users.insert(token.to_string(), user_id.to_string());
        self
    }
}

#[async_trait]
impl IdentityResolver for FakeIdentity {
    async fn get_user(&self, bearer: Option<&str>) -> Option<AuthUser> {
        bearer
            .and_then(|token| self.users.get(token))
            .map(AuthUser::new)
    }
}

/// Usage and history store whose writes always fail
pub struct BrokenStore {
    pub contention: bool,
}

#[async_trait]
impl UsageStore for BrokenStore {
    async fn increment(
        &self,
        _user_id: &str,
        _date: NaiveDate,
        _characters: u64,
    ) -> std::result::Result<UsageStat, StoreError> {
        Err(self.failure())
    }

    async fn get(
        &self,
        _user_id: &str,
        _date: NaiveDate,
    ) -> std::result::Result<Option<UsageStat>, StoreError> {
        Ok(None)
    }

    async fn range(
        &self,
        _user_id: &str,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> std::result::Result<Vec<UsageStat>, StoreError> {
        Ok(Vec::new())
    }
}

impl BrokenStore {
    fn failure(&self) -> StoreError {
        if self.contention {
            StoreError::Contention
        } else {
            StoreError::Backend("disk on fire".to_string())
        }
    }
}

#[async_trait]
impl HistoryStore for BrokenStore {
    async fn append(&self, _entry: HistoryEntry) -> StoreResult<()> {
        Err(self.failure())
    }

    async fn recent(&self, _user_id: &str, _limit: usize) -> StoreResult<Vec<HistoryEntry>> {
        Ok(Vec::new())
    }

    async fn clear(&self, _user_id: &str) -> StoreResult<u64> {
        Ok(0)
    }
}
