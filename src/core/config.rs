//! Configuration management

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::core::rate_limiter::{MAX_REQUESTS, WINDOW_MS};

/// DeepL free-tier API
pub const DEEPL_FREE_URL: &str = "https://api-free.deepl.com/v2";

/// DeepL paid-tier API
pub const DEEPL_PRO_URL: &str = "https://api.deepl.com/v2";

/// Azure Translator global endpoint
pub const AZURE_URL: &str = "https://api.cognitive.microsofttranslator.com";

/// Largest accepted text, in UTF-8 bytes
pub const MAX_TEXT_BYTES: usize = 128_000;

/// Which translation provider to call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// DeepL API (free or pro endpoint)
    DeepL,
    /// Azure Translator v3
    Azure,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::DeepL => write!(f, "deepl"),
            ProviderKind::Azure => write!(f, "azure"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deepl" => Ok(ProviderKind::DeepL),
            "azure" => Ok(ProviderKind::Azure),
            other => Err(anyhow::anyhow!("Unknown translation provider: {}", other)),
        }
    }
}

/// Configuration for the translation service
#[derive(Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// Provider to call
    pub provider: ProviderKind,
    /// Provider API key
    pub api_key: String,
    /// Provider base URL
    pub api_endpoint: String,
    /// Azure resource region, sent as a header when non-empty
    pub azure_region: String,
    /// Identity issuer domain, JWKS is fetched from it
    pub auth_issuer_domain: String,
    /// Expected `aud` claim, unchecked when unset
    pub auth_audience: Option<String>,
    /// Hard timeout for one provider call
    pub timeout_ms: u64,
    /// Rate limit window length
    pub rate_limit_window_ms: u64,
    /// Requests allowed per user per window
    pub rate_limit_max_requests: u32,
    /// Language list cache lifetime
    pub language_cache_ttl_secs: u64,
    /// Provider usage cache lifetime
    pub usage_cache_ttl_secs: u64,
    /// Largest accepted text in UTF-8 bytes
    pub max_text_bytes: usize,
    /// Browser origins allowed by CORS
    pub cors_allowed_origins: Vec<String>,
    /// MongoDB connection string; data stays in memory when unset
    pub mongodb_uri: Option<String>,
    /// MongoDB database name
    pub mongodb_database: String,
}

impl fmt::Debug for TranslatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatorConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("api_endpoint", &self.api_endpoint)
            .field("azure_region", &self.azure_region)
            .field("auth_issuer_domain", &self.auth_issuer_domain)
            .field("auth_audience", &self.auth_audience)
            .field("timeout_ms", &self.timeout_ms)
            .field("rate_limit_window_ms", &self.rate_limit_window_ms)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("language_cache_ttl_secs", &self.language_cache_ttl_secs)
            .field("usage_cache_ttl_secs", &self.usage_cache_ttl_secs)
            .field("max_text_bytes", &self.max_text_bytes)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("mongodb_uri", &self.mongodb_uri.as_ref().map(|_| "<redacted>"))
            .field("mongodb_database", &self.mongodb_database)
            .finish()
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::DeepL,
            api_key: String::new(),
            api_endpoint: DEEPL_FREE_URL.to_string(),
            azure_region: "global".to_string(),
            auth_issuer_domain: String::new(),
            auth_audience: None,
            timeout_ms: 5000,
            rate_limit_window_ms: WINDOW_MS,
            rate_limit_max_requests: MAX_REQUESTS,
            language_cache_ttl_secs: 24 * 60 * 60,
            usage_cache_ttl_secs: 60,
            max_text_bytes: MAX_TEXT_BYTES,
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            mongodb_uri: None,
            mongodb_database: "translato".to_string(),
        }
    }
}

fn with_key_override<F>(api_key: Option<String>, lookup: F) -> impl Fn(&str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    move |name| match (name, &api_key) {
        ("DEEPL_API_KEY" | "AZURE_TRANSLATOR_KEY", Some(key)) => Some(key.clone()),
        _ => lookup(name),
    }
}

impl TranslatorConfig {
    /// Load configuration from environment variables
    ///
    /// `api_key`, when given, stands in for whichever key variable the
    /// selected provider reads.
    pub fn from_env(api_key: Option<String>) -> anyhow::Result<Self> {
        Self::from_lookup(with_key_override(api_key, |name| std::env::var(name).ok()))
    }

    /// Load configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let parse_or = |name: &str, default: &str| -> String {
            var(name).unwrap_or_else(|| default.to_string())
        };
        let defaults = Self::default();

        let provider: ProviderKind = parse_or("TRANSLATION_PROVIDER", "deepl").parse()?;

        let api_key = match provider {
            ProviderKind::DeepL => var("DEEPL_API_KEY")
                .ok_or_else(|| anyhow::anyhow!("DEEPL_API_KEY environment variable is required"))?,
            ProviderKind::Azure => var("AZURE_TRANSLATOR_KEY").ok_or_else(|| {
                anyhow::anyhow!("AZURE_TRANSLATOR_KEY environment variable is required")
            })?,
        };

        let api_endpoint = match provider {
            ProviderKind::DeepL => match var("DEEPL_API_URL") {
                Some(url) => url,
                None => match parse_or("DEEPL_PLAN", "free").to_ascii_lowercase().as_str() {
                    "free" => DEEPL_FREE_URL.to_string(),
                    "pro" => DEEPL_PRO_URL.to_string(),
                    other => return Err(anyhow::anyhow!("Unknown DEEPL_PLAN: {}", other)),
                },
            },
            ProviderKind::Azure => parse_or("AZURE_TRANSLATOR_URL", AZURE_URL),
        };

        let auth_issuer_domain = var("AUTH_ISSUER_DOMAIN")
            .or_else(|| var("CLERK_JWT_ISSUER_DOMAIN"))
            .ok_or_else(|| anyhow::anyhow!("AUTH_ISSUER_DOMAIN environment variable is required"))?;

        let timeout_ms = parse_or("REQUEST_TIMEOUT_MS", "5000").parse::<u64>()?;
        let rate_limit_window_ms =
            parse_or("RATE_LIMIT_WINDOW_MS", &WINDOW_MS.to_string()).parse::<u64>()?;
        let rate_limit_max_requests =
            parse_or("RATE_LIMIT_MAX_REQUESTS", &MAX_REQUESTS.to_string()).parse::<u32>()?;
        let language_cache_ttl_secs =
            parse_or("LANGUAGE_CACHE_TTL_SECS", "86400").parse::<u64>()?;
        let usage_cache_ttl_secs = parse_or("USAGE_CACHE_TTL_SECS", "60").parse::<u64>()?;
        let max_text_bytes =
            parse_or("MAX_TEXT_BYTES", &MAX_TEXT_BYTES.to_string()).parse::<usize>()?;

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .map(|list| {
                list.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.cors_allowed_origins);

        Ok(Self {
            provider,
            api_key,
            api_endpoint,
            azure_region: parse_or("AZURE_TRANSLATOR_REGION", "global"),
            auth_issuer_domain,
            auth_audience: var("AUTH_AUDIENCE"),
            timeout_ms,
            rate_limit_window_ms,
            rate_limit_max_requests,
            language_cache_ttl_secs,
            usage_cache_ttl_secs,
            max_text_bytes,
            cors_allowed_origins,
            mongodb_uri: var("MONGODB_URI"),
            mongodb_database: parse_or("MONGODB_DATABASE", &defaults.mongodb_database),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            return Err(anyhow::anyhow!("API key is required"));
        }

        if self.api_endpoint.is_empty() {
            return Err(anyhow::anyhow!("API endpoint is required"));
        }

        if self.auth_issuer_domain.is_empty() {
            return Err(anyhow::anyhow!("Auth issuer domain is required"));
        }

        if self.timeout_ms == 0 {
            return Err(anyhow::anyhow!("timeout_ms must be greater than 0"));
        }

        if self.rate_limit_window_ms == 0 || self.rate_limit_max_requests == 0 {
            return Err(anyhow::anyhow!("rate limit window and capacity must be greater than 0"));
        }

        if self.max_text_bytes == 0 {
            return Err(anyhow::anyhow!("max_text_bytes must be greater than 0"));
        }

        if self.cors_allowed_origins.is_empty() {
            warn!("No CORS origins configured, browsers will be refused");
        }

        Ok(())
    }

    /// Outbound request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Rate limit window
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    /// How long a language list stays fresh
    pub fn language_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.language_cache_ttl_secs)
    }

    /// How long a quota reading stays fresh
    pub fn usage_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.usage_cache_ttl_secs)
    }
}
