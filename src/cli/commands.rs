//! CLI command definitions and handlers

use clap::Subcommand;
use tracing::info;

use crate::core::client::provider_from_config;
use crate::core::config::TranslatorConfig;
use crate::core::errors::Result;
use crate::core::languages::{fallback_languages, LanguageDialect};
use crate::core::models::{Language, LanguageDirection, TranslationRequest};

/// Commands for Translato
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP API server
    Serve {
        /// Bind address (default: 0.0.0.0)
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Listen port (default: 3000)
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },

    /// Translate a piece of text directly through the provider
    Translate {
        /// Text to translate
        text: String,

        /// Target language (default: EN-US)
        #[arg(short, long, default_value = "EN-US")]
        target_lang: String,

        /// Source language (auto-detect if not specified)
        #[arg(long)]
        source_lang: Option<String>,
    },

    /// List languages supported by the provider
    Languages {
        /// source or target
        #[arg(long = "type", default_value = "target")]
        direction: LanguageDirection,
    },

    /// Show the provider's character quota
    Usage,
}

/// Handle server command
pub async fn handle_serve(config: TranslatorConfig, host: String, port: u16) -> anyhow::Result<()> {
    use crate::server::api::run_server;

    info!("Starting HTTP server on {}:{}", host, port);
    println!("🚀 Server starting on http://{}:{}", host, port);

    run_server(config, host, port).await
}

/// Handle translate command
///
/// Bypasses authentication and the rate limiter; meant for operators checking
/// a key or a language pair.
pub async fn handle_translate(
    config: TranslatorConfig,
    text: String,
    target_lang: String,
    source_lang: Option<String>,
) -> anyhow::Result<()> {
    let provider = provider_from_config(&config)?;
    let dialect = provider.dialect();

    let mut request = TranslationRequest::new(text, target_lang);
    if let Some(lang) = source_lang {
        request = request.with_source_lang(lang);
    }
    if request.text.len() > config.max_text_bytes {
        anyhow::bail!("text exceeds maximum length of {} bytes", config.max_text_bytes);
    }

    let target = dialect.to_provider_lang(&request.target_lang);
    let source = request
        .explicit_source_lang()
        .map(|lang| dialect.to_provider_lang(lang));

    match provider.translate(&request.text, &target, source.as_deref()).await {
        Ok(result) => {
            let detected = result
                .detected_source_lang
                .map(|code| dialect.from_provider_lang(&code))
                .unwrap_or_else(|| "?".to_string());
            println!("[{} → {}] {}", detected, request.target_lang, result.text);
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("{} ({})", e, e.kind())),
    }
}

/// Handle languages command
pub async fn handle_languages(
    config: TranslatorConfig,
    direction: LanguageDirection,
) -> anyhow::Result<()> {
    let provider = provider_from_config(&config)?;
    let languages = listed_languages(provider.dialect(), provider.fetch_languages(direction).await);

    println!("{} languages ({}):", direction, languages.len());
    for language in languages {
        println!("  {:<10} {}", language.code, language.name);
    }

    Ok(())
}

/// Provider list in canonical codes, or the built-in list (already canonical)
fn listed_languages(dialect: LanguageDialect, fetched: Result<Vec<Language>>) -> Vec<Language> {
    match fetched {
        Ok(languages) => languages
            .into_iter()
            .map(|language| Language {
                code: dialect.from_provider_lang(&language.code),
                name: language.name,
            })
            .collect(),
        Err(e) => {
            eprintln!("⚠️  Provider unavailable ({}), showing built-in list", e);
            fallback_languages()
        }
    }
}

/// Handle usage command
pub async fn handle_usage(config: TranslatorConfig) -> anyhow::Result<()> {
    let provider = provider_from_config(&config)?;
    let usage = provider.fetch_usage().await?;

    let percent = if usage.character_limit == 0 {
        0.0
    } else {
        usage.character_count as f64 * 100.0 / usage.character_limit as f64
    };

    println!("📊 Provider quota");
    println!("   Used:      {}", usage.character_count);
    println!("   Limit:     {}", usage.character_limit);
    println!("   Remaining: {}", usage.remaining());
    println!("   ({:.1}% used)", percent);

    Ok(())
}
