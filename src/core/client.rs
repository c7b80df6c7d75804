//! Outbound clients for the translation providers
//!
//! Every call runs under the configured client timeout. Provider status codes
//! are classified through explicit lookup tables; raw provider bodies are
//! logged at debug level and never returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::config::{ProviderKind, TranslatorConfig};
use crate::core::errors::{ErrorKind, Result, TranslationError};
use crate::core::languages::LanguageDialect;
use crate::core::models::{Language, LanguageDirection, ProviderTranslation, ProviderUsage};

/// DeepL status → error kind
pub const DEEPL_STATUS_KINDS: &[(u16, ErrorKind)] = &[
    (400, ErrorKind::InvalidInput),
    (401, ErrorKind::InvalidCredentials),
    (403, ErrorKind::InvalidCredentials),
    (413, ErrorKind::InvalidInput),
    (414, ErrorKind::InvalidInput),
    (429, ErrorKind::RateLimited),
    (456, ErrorKind::QuotaExceeded),
];

/// Azure Translator status → error kind
pub const AZURE_STATUS_KINDS: &[(u16, ErrorKind)] = &[
    (400, ErrorKind::InvalidInput),
    (401, ErrorKind::InvalidCredentials),
    (403, ErrorKind::InvalidCredentials),
    (429, ErrorKind::RateLimited),
];

/// Look a non-success status up in `table`; unlisted codes are provider failures
pub fn classify_status(table: &[(u16, ErrorKind)], status: u16) -> ErrorKind {
    table
        .iter()
        .find(|(code, _)| *code == status)
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::ProviderUnavailable)
}

/// A third-party translation service
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &'static str;

    /// Language code vocabulary the provider expects
    fn dialect(&self) -> LanguageDialect;

    /// Translate `text`; language codes are already in the provider's dialect
    async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> Result<ProviderTranslation>;

    /// Supported languages, codes in the provider's dialect
    async fn fetch_languages(&self, direction: LanguageDirection) -> Result<Vec<Language>>;

    /// Character quota for the configured key
    async fn fetch_usage(&self) -> Result<ProviderUsage>;
}

/// Build the provider selected in `config`
pub fn provider_from_config(config: &TranslatorConfig) -> Result<Arc<dyn TranslationProvider>> {
    let provider: Arc<dyn TranslationProvider> = match config.provider {
        ProviderKind::DeepL => Arc::new(DeepLClient::new(config)?),
        ProviderKind::Azure => Arc::new(AzureClient::new(config)?),
    };
    Ok(provider)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Some(Duration::from_secs(30)))
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| TranslationError::Internal(format!("failed to build HTTP client: {e}")))
}

/// Turn a non-success response into a normalized error
async fn status_error(
    provider: &str,
    table: &[(u16, ErrorKind)],
    response: reqwest::Response,
) -> TranslationError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let kind = classify_status(table, status);
    warn!("{} responded with status {} ({})", provider, status, kind);
    debug!("{} error body: {}", provider, body);
    TranslationError::from_provider_status(kind, status)
}

fn empty_result() -> TranslationError {
    TranslationError::unavailable("Translation service returned an empty result")
}

/// DeepL `/translate` request body
#[derive(Debug, Serialize)]
struct DeepLTranslateBody<'a> {
    text: [&'a str; 1],
    target_lang: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<&'a str>,
    model_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslateResponse {
    #[serde(default)]
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: Option<String>,
    detected_source_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeepLLanguage {
    language: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DeepLUsage {
    character_count: u64,
    character_limit: u64,
}

/// DeepL API v2 client
#[derive(Debug, Clone)]
pub struct DeepLClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: String,
}

impl DeepLClient {
    /// Create a client for the configured base URL and key
    pub fn new(config: &TranslatorConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout())?,
            base_url: config.api_endpoint.trim_end_matches('/').to_string(),
            auth_header: format!("DeepL-Auth-Key {}", config.api_key),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl TranslationProvider for DeepLClient {
    fn name(&self) -> &'static str {
        "deepl"
    }

    fn dialect(&self) -> LanguageDialect {
        LanguageDialect::DeepL
    }

    async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> Result<ProviderTranslation> {
        let body = DeepLTranslateBody {
            text: [text],
            target_lang,
            source_lang,
            model_type: "latency_optimized",
        };

        let response = self
            .client
            .post(self.url("translate"))
            .header("Authorization", &self.auth_header)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(self.name(), DEEPL_STATUS_KINDS, response).await);
        }

        let payload: DeepLTranslateResponse = response.json().await?;
        let first = payload.translations.into_iter().next().ok_or_else(empty_result)?;
        let text = first.text.ok_or_else(empty_result)?;

        Ok(ProviderTranslation {
            text,
            detected_source_lang: first.detected_source_language,
        })
    }

    async fn fetch_languages(&self, direction: LanguageDirection) -> Result<Vec<Language>> {
        let response = self
            .client
            .get(self.url("languages"))
            .query(&[("type", direction.to_string())])
            .header("Authorization", &self.auth_header)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(self.name(), DEEPL_STATUS_KINDS, response).await);
        }

        let languages: Vec<DeepLLanguage> = response.json().await?;
        Ok(languages
            .into_iter()
            .map(|l| Language::new(l.language, l.name))
            .collect())
    }

    async fn fetch_usage(&self) -> Result<ProviderUsage> {
        let response = self
            .client
            .get(self.url("usage"))
            .header("Authorization", &self.auth_header)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(self.name(), DEEPL_STATUS_KINDS, response).await);
        }

        let usage: DeepLUsage = response.json().await?;
        Ok(ProviderUsage {
            character_count: usage.character_count,
            character_limit: usage.character_limit,
        })
    }
}

#[derive(Debug, Serialize)]
struct AzureTextItem<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureTranslateItem {
    detected_language: Option<AzureDetectedLanguage>,
    #[serde(default)]
    translations: Vec<AzureTranslation>,
}

#[derive(Debug, Deserialize)]
struct AzureDetectedLanguage {
    language: String,
}

#[derive(Debug, Deserialize)]
struct AzureTranslation {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzureLanguagesResponse {
    #[serde(default)]
    translation: HashMap<String, AzureLanguage>,
}

#[derive(Debug, Deserialize)]
struct AzureLanguage {
    name: String,
}

/// Azure Translator v3 client
#[derive(Debug, Clone)]
pub struct AzureClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    region: String,
}

impl AzureClient {
    /// Create a client for the configured endpoint, key and region
    pub fn new(config: &TranslatorConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout())?,
            base_url: config.api_endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            region: config.azure_region.clone(),
        })
    }
}

#[async_trait]
impl TranslationProvider for AzureClient {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn dialect(&self) -> LanguageDialect {
        LanguageDialect::Azure
    }

    async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> Result<ProviderTranslation> {
        let mut query = vec![("api-version", "3.0"), ("to", target_lang)];
        if let Some(source_lang) = source_lang {
            query.push(("from", source_lang));
        }

        let response = self
            .client
            .post(format!("{}/translate", self.base_url))
            .query(&query)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Ocp-Apim-Subscription-Region", &self.region)
            .json(&[AzureTextItem { text }])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(self.name(), AZURE_STATUS_KINDS, response).await);
        }

        let items: Vec<AzureTranslateItem> = response.json().await?;
        let first = items.into_iter().next().ok_or_else(empty_result)?;
        let text = first
            .translations
            .into_iter()
            .next()
            .and_then(|t| t.text)
            .filter(|t| !t.is_empty())
            .ok_or_else(empty_result)?;

        Ok(ProviderTranslation {
            text,
            detected_source_lang: first.detected_language.map(|d| d.language),
        })
    }

    async fn fetch_languages(&self, _direction: LanguageDirection) -> Result<Vec<Language>> {
        let response = self
            .client
            .get(format!("{}/languages", self.base_url))
            .query(&[("api-version", "3.0"), ("scope", "translation")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(self.name(), AZURE_STATUS_KINDS, response).await);
        }

        let payload: AzureLanguagesResponse = response.json().await?;
        let mut languages: Vec<Language> = payload
            .translation
            .into_iter()
            .map(|(code, language)| Language::new(code, language.name))
            .collect();
        languages.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(languages)
    }

    async fn fetch_usage(&self) -> Result<ProviderUsage> {
        Err(TranslationError::unavailable(
            "Usage reporting is not supported by Azure Translator",
        ))
    }
}
