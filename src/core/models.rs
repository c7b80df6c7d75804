//! Core data models for translation

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of a language pair a list describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageDirection {
    /// Languages text can be translated from
    Source,
    /// Languages text can be translated into
    Target,
}

impl LanguageDirection {
    /// Both directions, source first
    pub const ALL: [LanguageDirection; 2] = [LanguageDirection::Source, LanguageDirection::Target];
}

impl fmt::Display for LanguageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageDirection::Source => write!(f, "source"),
            LanguageDirection::Target => write!(f, "target"),
        }
    }
}

impl FromStr for LanguageDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" => Ok(LanguageDirection::Source),
            "target" => Ok(LanguageDirection::Target),
            other => Err(format!("unknown language direction: {other}")),
        }
    }
}

/// Language code plus display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// Canonical code, e.g. `EN-US`
    pub code: String,
    /// English display name
    pub name: String,
}

impl Language {
    /// Language from a code and display name
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// Translation request, as received over HTTP
///
/// `text` and `target_lang` default to empty so a missing field is reported
/// by validation rather than by the JSON decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    /// Text to translate
    #[serde(default)]
    pub text: String,
    /// Canonical source code; absent, blank or `auto` means detect
    #[serde(default)]
    pub source_lang: Option<String>,
    /// Canonical target code
    #[serde(default)]
    pub target_lang: String,
}

impl TranslationRequest {
    /// Request with auto-detected source
    pub fn new(text: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_lang: None,
            target_lang: target_lang.into(),
        }
    }

    /// Set an explicit source language
    pub fn with_source_lang(mut self, source_lang: impl Into<String>) -> Self {
        self.source_lang = Some(source_lang.into());
        self
    }

    /// Source language to send upstream; `None` means auto-detect
    pub fn explicit_source_lang(&self) -> Option<&str> {
        self.source_lang
            .as_deref()
            .map(str::trim)
            .filter(|lang| !lang.is_empty() && !lang.eq_ignore_ascii_case("auto"))
    }
}

/// Translation result handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    /// Translated text
    pub translated_text: String,
    /// Canonical detected source code, empty when the provider gave none
    pub detected_source_lang: String,
}

/// Provider answer before language codes are mapped back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTranslation {
    /// Translated text
    pub text: String,
    /// Detected source language in the provider's dialect
    pub detected_source_lang: Option<String>,
}

/// Character quota reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUsage {
    /// Characters billed this period
    pub character_count: u64,
    /// Characters allowed this period
    pub character_limit: u64,
}

impl ProviderUsage {
    /// Characters left before the provider starts refusing
    pub fn remaining(&self) -> u64 {
        self.character_limit.saturating_sub(self.character_count)
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable subject id
    pub id: String,
    /// Email claim, if present
    pub email: Option<String>,
    /// Name claim, if present
    pub name: Option<String>,
}

impl AuthUser {
    /// User known only by id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
        }
    }
}

/// Per-user, per-day usage counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStat {
    /// Owner
    pub user_id: String,
    /// UTC day
    pub date: NaiveDate,
    /// Successful translations that day
    pub translation_count: u64,
    /// Characters translated that day
    pub character_count: u64,
}

impl UsageStat {
    /// Empty record for a day with no translations yet
    pub fn empty(user_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            date,
            translation_count: 0,
            character_count: 0,
        }
    }
}

/// One completed translation, as kept in the caller's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Owner
    pub user_id: String,
    /// Text as submitted
    pub source_text: String,
    /// Text as returned
    pub target_text: String,
    /// Source language the caller asked for, `auto` when detection was used
    pub source_lang: String,
    /// Target language the caller asked for
    pub target_lang: String,
    /// Language the provider detected, if it reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_source_lang: Option<String>,
    /// Characters of source text
    pub character_count: u64,
    /// When the translation completed
    pub created_at: DateTime<Utc>,
}

/// Language pair a caller last chose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Canonical source code or `auto`
    #[serde(default)]
    pub source_lang: String,
    /// Canonical target code
    #[serde(default)]
    pub target_lang: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            source_lang: "auto".to_string(),
            target_lang: "EN-US".to_string(),
        }
    }
}

impl Preferences {
    /// Preferences with both codes set
    pub fn new(source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
        }
    }

    /// Trimmed copy; a blank source means auto-detect
    pub fn normalized(&self) -> Self {
        let source_lang = match self.source_lang.trim() {
            "" => "auto",
            lang => lang,
        };
        Self::new(source_lang, self.target_lang.trim())
    }
}
