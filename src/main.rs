//! Main entry point for the Translato CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use translato::cli::commands::{self, Commands};
use translato::TranslatorConfig;

/// Translato - rate limited translation service for DeepL and Azure Translator
#[derive(Parser, Debug)]
#[command(name = "translato", version, about, long_about = None)]
struct Args {
    /// Provider API key (optional, defaults to DEEPL_API_KEY / AZURE_TRANSLATOR_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}={}", env!("CARGO_CRATE_NAME"), log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(command) = args.command else {
        println!("Please specify a command. Use --help for more information.");
        return Ok(());
    };

    let config = TranslatorConfig::from_env(args.api_key)?;
    config.validate()?;

    // Execute command
    match command {
        Commands::Serve { host, port } => {
            commands::handle_serve(config, host, port).await?;
        }
        Commands::Translate {
            text,
            target_lang,
            source_lang,
        } => {
            commands::handle_translate(config, text, target_lang, source_lang).await?;
        }
        Commands::Languages { direction } => {
            commands::handle_languages(config, direction).await?;
        }
        Commands::Usage => {
            commands::handle_usage(config).await?;
        }
    }

    Ok(())
}
