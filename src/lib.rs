//! Translato - rate limited, usage-accounted translation service
//!
//! This library validates translation requests, authenticates callers,
//! applies per-user rate limits, calls DeepL or Azure Translator under a hard
//! timeout, and records per-user daily usage and translation history.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod core;
pub mod server;

// Re-export key types for convenience
pub use core::{
    cache::MetadataCache,
    client::{AzureClient, DeepLClient, TranslationProvider},
    config::TranslatorConfig,
    errors::{ErrorKind, TranslationError},
    history::TranslationHistory,
    ledger::UsageLedger,
    models::{HistoryEntry, Language, Preferences, TranslationRequest, TranslationResult, UsageStat},
    preferences::UserPreferences,
    rate_limiter::RateLimiter,
    translator::Translator,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
