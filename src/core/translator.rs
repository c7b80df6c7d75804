//! Translate request pipeline
//!
//! validate → authenticate → rate limit → provider call → record usage and
//! history. Each stage short-circuits on failure; nothing is retried here.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::core::auth::{require_user, IdentityResolver};
use crate::core::client::TranslationProvider;
use crate::core::config::MAX_TEXT_BYTES;
use crate::core::errors::{retry_after_secs, Result, StoreError, StoreResult, TranslationError};
use crate::core::history::TranslationHistory;
use crate::core::languages::LanguageDialect;
use crate::core::ledger::UsageLedger;
use crate::core::models::{TranslationRequest, TranslationResult};
use crate::core::rate_limiter::RateLimiter;

/// How usage and history are recorded after a successful translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageRecording {
    /// Spawned and not awaited
    Background,
    /// Awaited before returning; failures are still only logged
    Inline,
}

/// Orchestrates one translation request end to end
pub struct Translator {
    provider: Arc<dyn TranslationProvider>,
    identity: Arc<dyn IdentityResolver>,
    limiter: Arc<RateLimiter>,
    ledger: Arc<UsageLedger>,
    history: Option<Arc<TranslationHistory>>,
    max_text_bytes: usize,
    usage_recording: UsageRecording,
}

impl Translator {
    /// Create a translator with default text limit and background usage recording
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        identity: Arc<dyn IdentityResolver>,
        limiter: Arc<RateLimiter>,
        ledger: Arc<UsageLedger>,
    ) -> Self {
        Self {
            provider,
            identity,
            limiter,
            ledger,
            history: None,
            max_text_bytes: MAX_TEXT_BYTES,
            usage_recording: UsageRecording::Background,
        }
    }

    /// Reject texts longer than `max_text_bytes` UTF-8 bytes
    pub fn with_max_text_bytes(mut self, max_text_bytes: usize) -> Self {
        self.max_text_bytes = max_text_bytes;
        self
    }

    /// Also append every successful translation to `history`
    pub fn with_history(mut self, history: Arc<TranslationHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Choose between background and inline recording
    pub fn with_usage_recording(mut self, usage_recording: UsageRecording) -> Self {
        self.usage_recording = usage_recording;
        self
    }

    /// Code vocabulary of the underlying provider
    pub fn dialect(&self) -> LanguageDialect {
        self.provider.dialect()
    }

    /// Translate on behalf of the caller holding `bearer`
    pub async fn translate(
        &self,
        bearer: Option<&str>,
        request: &TranslationRequest,
    ) -> Result<TranslationResult> {
        self.validate(request)?;

        let user = require_user(self.identity.as_ref(), bearer).await?;

        if let Some(retry_after) = self.limiter.consume_token(&user.id).await {
            info!(
                "Rate limited {} for another {}s",
                user.id,
                retry_after_secs(retry_after)
            );
            return Err(TranslationError::RateLimited {
                retry_after: Some(retry_after),
            });
        }

        let dialect = self.provider.dialect();
        let target_lang = dialect.to_provider_lang(&request.target_lang);
        let source_lang = request
            .explicit_source_lang()
            .map(|lang| dialect.to_provider_lang(lang));

        debug!(
            "Translating {} bytes via {} ({} -> {})",
            request.text.len(),
            self.provider.name(),
            source_lang.as_deref().unwrap_or("auto"),
            target_lang
        );

        let translation = self
            .provider
            .translate(&request.text, &target_lang, source_lang.as_deref())
            .await
            .map_err(|e| {
                warn!("{} translation failed ({}): {}", self.provider.name(), e.kind(), e);
                e
            })?;

        let detected_source_lang = match translation.detected_source_lang {
            Some(code) => dialect.from_provider_lang(&code),
            None => request
                .explicit_source_lang()
                .map(str::to_string)
                .unwrap_or_default(),
        };

        let result = TranslationResult {
            translated_text: translation.text,
            detected_source_lang,
        };
        self.record_outcome(&user.id, request, &result).await;

        Ok(result)
    }

    fn validate(&self, request: &TranslationRequest) -> Result<()> {
        if request.text.trim().is_empty() {
            return Err(TranslationError::invalid_input(
                "text is required and must be a non-empty string",
            ));
        }
        if request.text.len() > self.max_text_bytes {
            return Err(TranslationError::invalid_input(format!(
                "text exceeds maximum length of {} bytes",
                self.max_text_bytes
            )));
        }
        if request.target_lang.trim().is_empty() {
            return Err(TranslationError::invalid_input(
                "target_lang is required and must be a non-empty string",
            ));
        }
        Ok(())
    }

    async fn record_outcome(
        &self,
        user_id: &str,
        request: &TranslationRequest,
        result: &TranslationResult,
    ) {
        let outcome = Outcome {
            ledger: Arc::clone(&self.ledger),
            history: self.history.clone(),
            user_id: user_id.to_string(),
            request: request.clone(),
            result: result.clone(),
        };
        match self.usage_recording {
            UsageRecording::Inline => outcome.record().await,
            UsageRecording::Background => {
                tokio::spawn(outcome.record());
            }
        }
    }
}

/// Everything needed to record one translation after the response is built
struct Outcome {
    ledger: Arc<UsageLedger>,
    history: Option<Arc<TranslationHistory>>,
    user_id: String,
    request: TranslationRequest,
    result: TranslationResult,
}

impl Outcome {
    async fn record(self) {
        let characters = self.request.text.chars().count() as u64;
        let usage = self.ledger.record(&self.user_id, characters).await;
        log_failure("usage", &self.user_id, usage.map(drop));

        if let Some(history) = &self.history {
            let entry = history.record(&self.user_id, &self.request, &self.result).await;
            log_failure("history", &self.user_id, entry.map(drop));
        }
    }
}

fn log_failure(what: &str, user_id: &str, outcome: StoreResult<()>) {
    match outcome {
        Ok(()) => {}
        Err(StoreError::Contention) => {
            warn!("{} record for {} lost a write race, dropped", what, user_id);
        }
        Err(e) => {
            error!("Failed to record {} for {}: {}", what, user_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::errors::ErrorKind;
    use crate::core::history::InMemoryHistoryStore;
    use crate::core::ledger::InMemoryUsageStore;
    use crate::core::testing::{BrokenStore, FakeIdentity, FakeProvider};
    use std::time::Duration;

    struct Harness {
        provider: Arc<FakeProvider>,
        ledger: Arc<UsageLedger>,
        history: Arc<TranslationHistory>,
        translator: Translator,
    }

    fn harness_with(provider: FakeProvider, ledger: UsageLedger, clock: &ManualClock) -> Harness {
        let provider = Arc::new(provider);
        let ledger = Arc::new(ledger);
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_secs(60),
            20,
            Arc::new(clock.clone()),
        ));
        let identity = Arc::new(FakeIdentity::default().with_user("token-a", "alice"));
        let history = Arc::new(TranslationHistory::new(
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(clock.clone()),
        ));
        let translator = Translator::new(provider.clone(), identity, limiter, ledger.clone())
            .with_history(history.clone())
            .with_usage_recording(UsageRecording::Inline);
        Harness {
            provider,
            ledger,
            history,
            translator,
        }
    }

    fn harness(provider: FakeProvider) -> Harness {
        let clock = ManualClock::default();
        let ledger = UsageLedger::new(Arc::new(InMemoryUsageStore::new()), Arc::new(clock.clone()));
        harness_with(provider, ledger, &clock)
    }

    #[tokio::test]
    async fn test_translate_records_usage() {
        let h = harness(FakeProvider::default().with_reply("Hola", Some("EN")));

        let result = h
            .translator
            .translate(Some("token-a"), &TranslationRequest::new("Hello", "ES"))
            .await
            .unwrap();

        assert_eq!(
            result,
            TranslationResult {
                translated_text: "Hola".to_string(),
                detected_source_lang: "EN".to_string(),
            }
        );

        let stat = h.ledger.get_today("alice").await.unwrap().unwrap();
        assert_eq!(stat.translation_count, 1);
        assert_eq!(stat.character_count, 5);
    }

    #[tokio::test]
    async fn test_oversized_text_never_reaches_provider() {
        let h = harness(FakeProvider::default());
        let text = "a".repeat(MAX_TEXT_BYTES + 1);

        let err = h
            .translator
            .translate(Some("token-a"), &TranslationRequest::new(text, "ES"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(h.provider.translate_calls(), 0);
    }

    #[tokio::test]
    async fn test_text_exactly_at_byte_limit_is_admitted() {
        let h = harness(FakeProvider::default());
        let ascii = "a".repeat(MAX_TEXT_BYTES);
        // 2 and 3 byte chars landing on the limit exactly
        let accented = "é".repeat(MAX_TEXT_BYTES / 2);
        let mixed = format!("ab{}", "€".repeat((MAX_TEXT_BYTES - 2) / 3));

        for text in [ascii, accented, mixed] {
            assert_eq!(text.len(), MAX_TEXT_BYTES);
            h.translator
                .translate(Some("token-a"), &TranslationRequest::new(text.clone(), "ES"))
                .await
                .unwrap();
            let (sent, _, _) = h.provider.last_request().unwrap();
            assert_eq!(sent, text);
        }

        assert_eq!(h.provider.translate_calls(), 3);
        let stat = h.ledger.get_today("alice").await.unwrap().unwrap();
        let expected_chars = MAX_TEXT_BYTES + MAX_TEXT_BYTES / 2 + 2 + (MAX_TEXT_BYTES - 2) / 3;
        assert_eq!(stat.character_count, expected_chars as u64);
    }

    #[tokio::test]
    async fn test_byte_limit_counts_utf8_bytes() {
        let h = harness(FakeProvider::default());
        // 3 bytes per char
        let text = "語".repeat(MAX_TEXT_BYTES / 3 + 1);

        let err = h
            .translator
            .translate(Some("token-a"), &TranslationRequest::new(text, "ES"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_blank_text_and_missing_target_rejected() {
        let h = harness(FakeProvider::default());

        let err = h
            .translator
            .translate(Some("token-a"), &TranslationRequest::new("  \n\t", "ES"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = h
            .translator
            .translate(Some("token-a"), &TranslationRequest::new("Hello", " "))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        assert_eq!(h.provider.translate_calls(), 0);
    }

    #[tokio::test]
    async fn test_unauthenticated_never_reaches_provider() {
        let h = harness(FakeProvider::default());

        for bearer in [None, Some("wrong-token")] {
            let err = h
                .translator
                .translate(bearer, &TranslationRequest::new("Hello", "ES"))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        }

        assert_eq!(h.provider.translate_calls(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_before_provider() {
        let h = harness(FakeProvider::default());
        let request = TranslationRequest::new("Hello", "ES");

        for _ in 0..20 {
            h.translator.translate(Some("token-a"), &request).await.unwrap();
        }
        let err = h
            .translator
            .translate(Some("token-a"), &request)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.to_string(), "Rate limit exceeded. Try again in 60s");
        assert_eq!(h.provider.translate_calls(), 20);
    }

    #[tokio::test]
    async fn test_provider_errors_pass_through_classified() {
        for (kind, status) in [
            (ErrorKind::QuotaExceeded, 429),
            (ErrorKind::Timeout, 504),
            (ErrorKind::ProviderUnavailable, 502),
            (ErrorKind::InvalidCredentials, 401),
        ] {
            let h = harness(FakeProvider::failing(kind));
            let err = h
                .translator
                .translate(Some("token-a"), &TranslationRequest::new("Hello", "ES"))
                .await
                .unwrap_err();

            assert_eq!(err.kind(), kind);
            assert_eq!(err.http_status(), status);
            assert_eq!(h.ledger.get_today("alice").await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_ledger_failure_does_not_fail_request() {
        for contention in [true, false] {
            let clock = ManualClock::default();
            let ledger = UsageLedger::new(Arc::new(BrokenStore { contention }), Arc::new(clock.clone()));
            let h = harness_with(FakeProvider::default(), ledger, &clock);

            let result = h
                .translator
                .translate(Some("token-a"), &TranslationRequest::new("Hello", "ES"))
                .await
                .unwrap();

            assert_eq!(result.translated_text, "Hola");
        }
    }

    #[tokio::test]
    async fn test_translate_records_history() {
        let h = harness(FakeProvider::default().with_reply("Hola", Some("EN")));

        h.translator
            .translate(Some("token-a"), &TranslationRequest::new("Hello", "ES"))
            .await
            .unwrap();

        let entries = h.history.list("alice", None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_text, "Hello");
        assert_eq!(entries[0].target_text, "Hola");
        assert_eq!(entries[0].source_lang, "auto");
        assert_eq!(entries[0].detected_source_lang.as_deref(), Some("EN"));
    }

    #[tokio::test]
    async fn test_failed_translation_leaves_no_history() {
        let h = harness(FakeProvider::failing(ErrorKind::Timeout));

        h.translator
            .translate(Some("token-a"), &TranslationRequest::new("Hello", "ES"))
            .await
            .unwrap_err();

        assert!(h.history.list("alice", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_failure_does_not_fail_request() {
        let h = harness(FakeProvider::default());
        let clock = ManualClock::default();
        let broken = Arc::new(TranslationHistory::new(
            Arc::new(BrokenStore { contention: false }),
            Arc::new(clock),
        ));
        let translator = h.translator.with_history(broken);

        let result = translator
            .translate(Some("token-a"), &TranslationRequest::new("Hello", "ES"))
            .await
            .unwrap();

        assert_eq!(result.translated_text, "Hola");
        let stat = h.ledger.get_today("alice").await.unwrap().unwrap();
        assert_eq!(stat.translation_count, 1);
    }

    #[tokio::test]
    async fn test_auto_source_is_detected_and_codes_mapped() {
        let h = harness(
            FakeProvider::default()
                .with_dialect(LanguageDialect::Azure)
                .with_reply("你好", Some("en")),
        );

        let request = TranslationRequest::new("Hello", "ZH-HANS").with_source_lang("auto");
        let result = h.translator.translate(Some("token-a"), &request).await.unwrap();

        assert_eq!(result.detected_source_lang, "EN");
        assert_eq!(
            h.provider.last_request(),
            Some(("Hello".to_string(), "zh-Hans".to_string(), None))
        );
    }

    #[tokio::test]
    async fn test_missing_detection_falls_back_to_source() {
        let h = harness(
            FakeProvider::default()
                .with_dialect(LanguageDialect::Azure)
                .with_reply("Hallo", None),
        );

        let request = TranslationRequest::new("Hello", "DE").with_source_lang("PT-BR");
        let result = h.translator.translate(Some("token-a"), &request).await.unwrap();

        assert_eq!(result.detected_source_lang, "PT-BR");
        assert_eq!(
            h.provider.last_request(),
            Some(("Hello".to_string(), "de".to_string(), Some("pt".to_string())))
        );
    }

    #[tokio::test]
    async fn test_background_recording_eventually_lands() {
        let h = harness(FakeProvider::default());
        let translator = Translator {
            usage_recording: UsageRecording::Background,
            ..h.translator
        };

        translator
            .translate(Some("token-a"), &TranslationRequest::new("Hello", "ES"))
            .await
            .unwrap();

        let mut stat = None;
        for _ in 0..50 {
            stat = h.ledger.get_today("alice").await.unwrap();
            if stat.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(stat.map(|s| s.character_count), Some(5));
    }
}
