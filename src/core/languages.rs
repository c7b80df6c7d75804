//! Language code mapping between the canonical vocabulary and provider dialects
//!
//! Canonical codes are DeepL-style uppercase tags (`EN`, `PT-BR`, `ZH-HANS`).
//! Mapping is total: unknown codes pass through with a case transform and the
//! provider is left to reject them.

use crate::core::models::Language;

/// Canonical code ↔ Azure code, bijective
///
/// Azure's `pt` is Brazilian Portuguese and `pt-pt` the European variant.
const AZURE_CODES: &[(&str, &str)] = &[
    ("EN", "en"),
    ("ES", "es"),
    ("PT-BR", "pt"),
    ("PT-PT", "pt-pt"),
    ("ZH-HANS", "zh-Hans"),
    ("ZH-HANT", "zh-Hant"),
    ("NB", "nb"),
];

/// Canonical regional variants Azure folds into a broader code (outbound only)
const AZURE_ALIASES: &[(&str, &str)] = &[
    ("EN-GB", "en"),
    ("EN-US", "en"),
    ("ES-419", "es"),
    ("PT", "pt"),
    ("ZH", "zh-Hans"),
];

/// Hardcoded list served when the provider cannot be reached
const FALLBACK_LANGUAGES: &[(&str, &str)] = &[
    ("AR", "Arabic"),
    ("BG", "Bulgarian"),
    ("CS", "Czech"),
    ("DA", "Danish"),
    ("DE", "German"),
    ("EL", "Greek"),
    ("EN", "English"),
    ("ES", "Spanish"),
    ("ET", "Estonian"),
    ("FI", "Finnish"),
    ("FR", "French"),
    ("HU", "Hungarian"),
    ("ID", "Indonesian"),
    ("IT", "Italian"),
    ("JA", "Japanese"),
    ("KO", "Korean"),
    ("LT", "Lithuanian"),
    ("LV", "Latvian"),
    ("NB", "Norwegian"),
    ("NL", "Dutch"),
    ("PL", "Polish"),
    ("PT", "Portuguese"),
    ("RO", "Romanian"),
    ("RU", "Russian"),
    ("SK", "Slovak"),
    ("SL", "Slovenian"),
    ("SV", "Swedish"),
    ("TR", "Turkish"),
    ("UK", "Ukrainian"),
    ("ZH", "Chinese"),
];

/// Code vocabulary spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageDialect {
    /// DeepL speaks the canonical vocabulary
    DeepL,
    /// Azure Translator: lowercase tags with script subtags
    Azure,
}

impl LanguageDialect {
    /// Canonical → provider
    pub fn to_provider_lang(self, code: &str) -> String {
        match self {
            LanguageDialect::DeepL => code.trim().to_ascii_uppercase(),
            LanguageDialect::Azure => to_azure_lang(code),
        }
    }

    /// Provider → canonical
    pub fn from_provider_lang(self, code: &str) -> String {
        match self {
            LanguageDialect::DeepL => code.trim().to_ascii_uppercase(),
            LanguageDialect::Azure => from_azure_lang(code),
        }
    }

    /// Canonical codes with an explicit entry for this dialect
    pub fn known_codes(self) -> Vec<&'static str> {
        match self {
            LanguageDialect::DeepL => FALLBACK_LANGUAGES.iter().map(|(code, _)| *code).collect(),
            LanguageDialect::Azure => AZURE_CODES.iter().map(|(code, _)| *code).collect(),
        }
    }
}

/// Canonical code to Azure's dialect; unknown codes are lowercased
pub fn to_azure_lang(code: &str) -> String {
    let code = code.trim();
    AZURE_CODES
        .iter()
        .chain(AZURE_ALIASES)
        .find(|(canonical, _)| canonical.eq_ignore_ascii_case(code))
        .map(|(_, azure)| azure.to_string())
        .unwrap_or_else(|| code.to_ascii_lowercase())
}

/// Azure code to canonical; unknown codes are uppercased
pub fn from_azure_lang(code: &str) -> String {
    let code = code.trim();
    AZURE_CODES
        .iter()
        .find(|(_, azure)| azure.eq_ignore_ascii_case(code))
        .map(|(canonical, _)| canonical.to_string())
        .unwrap_or_else(|| code.to_ascii_uppercase())
}

/// Static language list used when the provider is unreachable
pub fn fallback_languages() -> Vec<Language> {
    FALLBACK_LANGUAGES
        .iter()
        .map(|(code, name)| Language::new(*code, *name))
        .collect()
}

/// Codes in the dialect's table that the provider's capability list lacks
pub fn unsupported_codes(dialect: LanguageDialect, provider_list: &[Language]) -> Vec<&'static str> {
    dialect
        .known_codes()
        .into_iter()
        .filter(|code| {
            !provider_list
                .iter()
                .any(|language| language.code.eq_ignore_ascii_case(code))
        })
        .collect()
}
