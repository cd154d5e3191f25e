//! headless-cms - fetch stories from the Storyblok content delivery API
//!
//! Prints a story in one of four shapes, caching responses between runs, or
//! empties the cache when given the right token.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use headless_cms::cli::{Cli, Command, OutputFormat, StartupConfig};
use headless_cms::transport::HttpTransport;
use headless_cms::CmsClient;

/// Installs a stderr log subscriber honoring `RUST_LOG` (default: warnings only)
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_pretty<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn build_client(config: &StartupConfig) -> Result<CmsClient, Box<dyn std::error::Error>> {
    let cache = config.cache.open().await?;
    let transport = HttpTransport::with_timeout(config.timeout)?;

    let mut builder = CmsClient::builder()
        .auth_token(config.auth_token.clone())
        .invalidation_token(config.invalidation_token.clone())
        .cache(cache)
        .transport(std::sync::Arc::new(transport))
        .cache_timeout(Duration::from_secs(5));
    if let Some(base_url) = &config.base_url {
        builder = builder.base_url(base_url.clone());
    }
    Ok(builder.build()?)
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = StartupConfig::from_cli(&cli)?;
    let client = build_client(&config).await?;

    match cli.command {
        Command::Page {
            slug,
            content_version,
            language,
            format,
        } => {
            let language = language.as_deref();
            match format {
                OutputFormat::Json => {
                    let json = client.fetch_page_json(&slug, &content_version, language).await?;
                    println!("{}", String::from_utf8_lossy(&json));
                }
                OutputFormat::Document => {
                    print_pretty(&client.fetch_page(&slug, &content_version, language).await?)?
                }
                OutputFormat::Blocks => print_pretty(
                    &client
                        .fetch_block_index(&slug, &content_version, language)
                        .await?,
                )?,
                OutputFormat::Texts => print_pretty(
                    &client
                        .fetch_translatable_texts(&slug, &content_version, language)
                        .await?,
                )?,
            }
        }
        Command::EmptyCache { token } => {
            client.empty_cache(&token).await?;
            eprintln!("Cache emptied");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
