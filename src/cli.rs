//! Command-line interface parsing for the headless CMS client
//!
//! Tokens and connection settings can come from flags or environment
//! variables. [`StartupConfig::from_cli`] checks that the combination is usable
//! before anything connects.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;

use crate::cache::{Cache, CacheError, FileCache, MemoryCache, RedisCache, SentinelCache};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// A required token was neither passed as a flag nor set in the environment
    #[error("missing {0}: pass --{1} or set {2}")]
    MissingToken(&'static str, &'static str, &'static str),

    /// `--cache redis` without a server URL
    #[error("--cache redis requires --redis-url or REDIS_URL")]
    MissingRedisUrl,

    /// `--cache sentinel` without Sentinel addresses or master name
    #[error("--cache sentinel requires at least one --sentinel and --sentinel-master")]
    MissingSentinel,

    /// No home directory to derive the default cache directory from
    #[error("could not determine a cache directory; pass --cache-dir")]
    NoCacheDir,

    /// The cache backend could not be reached
    #[error("failed to open cache: {0}")]
    Cache(#[from] CacheError),
}

/// Fetch and cache stories from the Storyblok content delivery API
#[derive(Parser, Debug)]
#[command(name = "headless-cms")]
#[command(about = "Fetch and cache stories from a headless CMS")]
#[command(version)]
pub struct Cli {
    /// Content delivery API token
    #[arg(long, env = "CMS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Secret required to empty the cache
    #[arg(long, env = "CMS_EMPTY_CACHE_TOKEN", hide_env_values = true)]
    pub empty_cache_token: Option<String>,

    /// Where responses are cached
    #[arg(long, value_enum, default_value_t = CacheBackend::File)]
    pub cache: CacheBackend,

    /// Directory for the file cache (defaults to the platform cache dir)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Redis server for `--cache redis`
    #[arg(long, env = "REDIS_URL", value_name = "URL")]
    pub redis_url: Option<String>,

    /// Sentinel address for `--cache sentinel` (repeatable)
    #[arg(long = "sentinel", value_name = "URL")]
    pub sentinels: Vec<String>,

    /// Name of the master monitored by the Sentinels
    #[arg(long, value_name = "NAME")]
    pub sentinel_master: Option<String>,

    /// Password for the Redis master behind Sentinel
    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    /// Database index on the Redis master behind Sentinel
    #[arg(long, default_value_t = 0)]
    pub redis_db: i64,

    /// Stories endpoint to query instead of the public API
    #[arg(long, env = "CMS_BASE_URL", value_name = "URL")]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30, value_name = "SECONDS")]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch a story and print it
    ///
    /// Examples:
    ///   headless-cms page home
    ///   headless-cms page home --language de --format texts
    ///   headless-cms page home --content-version draft
    Page {
        /// Story slug, e.g. `home` or `blog/first-post`
        slug: String,

        /// Content version; `draft` is never cached (default: published)
        #[arg(long = "content-version", value_name = "VERSION", default_value = "")]
        content_version: String,

        /// Language code
        #[arg(long)]
        language: Option<String>,

        /// Output shape
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Empty the cache
    EmptyCache {
        /// Must match the configured empty-cache token
        token: String,
    },
}

/// Cache backends selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheBackend {
    /// In-process only; nothing survives the invocation
    Memory,
    /// One file per entry on disk
    File,
    /// A single Redis server
    Redis,
    /// A Redis master found through Sentinel
    Sentinel,
}

/// Shapes a fetched story can be printed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The response body as received
    Json,
    /// The decoded document, pretty-printed
    Document,
    /// Body blocks keyed by id
    Blocks,
    /// Translatable texts keyed by id
    Texts,
}

/// Validated cache settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheConfig {
    Memory,
    File(Option<PathBuf>),
    Redis(String),
    Sentinel {
        sentinels: Vec<String>,
        master: String,
        password: Option<String>,
        db: i64,
    },
}

impl CacheConfig {
    /// Opens the configured backend
    pub async fn open(&self) -> Result<Arc<dyn Cache>, CliError> {
        let cache: Arc<dyn Cache> = match self {
            CacheConfig::Memory => Arc::new(MemoryCache::new()),
            CacheConfig::File(Some(dir)) => Arc::new(FileCache::with_dir(dir.clone())),
            CacheConfig::File(None) => Arc::new(FileCache::new().ok_or(CliError::NoCacheDir)?),
            CacheConfig::Redis(url) => Arc::new(RedisCache::connect(url).await?),
            CacheConfig::Sentinel {
                sentinels,
                master,
                password,
                db,
            } => Arc::new(SentinelCache::connect(sentinels, master, password.clone(), *db)?),
        };
        Ok(cache)
    }
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub auth_token: String,
    pub invalidation_token: String,
    pub cache: CacheConfig,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` when both tokens are present and the cache backend is fully specified
    /// * `Err(CliError)` naming the first missing setting
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let auth_token = non_empty(&cli.token)
            .ok_or(CliError::MissingToken("API token", "token", "CMS_TOKEN"))?;
        let invalidation_token = non_empty(&cli.empty_cache_token).ok_or(CliError::MissingToken(
            "empty-cache token",
            "empty-cache-token",
            "CMS_EMPTY_CACHE_TOKEN",
        ))?;

        let cache = match cli.cache {
            CacheBackend::Memory => CacheConfig::Memory,
            CacheBackend::File => CacheConfig::File(cli.cache_dir.clone()),
            CacheBackend::Redis => {
                CacheConfig::Redis(non_empty(&cli.redis_url).ok_or(CliError::MissingRedisUrl)?)
            }
            CacheBackend::Sentinel => {
                let master = non_empty(&cli.sentinel_master).ok_or(CliError::MissingSentinel)?;
                if cli.sentinels.is_empty() {
                    return Err(CliError::MissingSentinel);
                }
                CacheConfig::Sentinel {
                    sentinels: cli.sentinels.clone(),
                    master,
                    password: non_empty(&cli.redis_password),
                    db: cli.redis_db,
                }
            }
        };

        Ok(StartupConfig {
            auth_token,
            invalidation_token,
            cache,
            base_url: non_empty(&cli.base_url),
            timeout: Duration::from_secs(cli.timeout),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn test_cli_parse_page_defaults() {
        let cli = parse(&["headless-cms", "--token", "t", "page", "home"]);
        match cli.command {
            Command::Page {
                slug,
                content_version,
                language,
                format,
            } => {
                assert_eq!(slug, "home");
                assert_eq!(content_version, "");
                assert!(language.is_none());
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.cache, CacheBackend::File);
        assert_eq!(cli.timeout, 30);
    }

    #[test]
    fn test_cli_parse_page_with_options() {
        let cli = parse(&[
            "headless-cms",
            "page",
            "blog/post",
            "--content-version",
            "draft",
            "--language",
            "de",
            "--format",
            "texts",
        ]);
        match cli.command {
            Command::Page {
                content_version,
                language,
                format,
                ..
            } => {
                assert_eq!(content_version, "draft");
                assert_eq!(language.as_deref(), Some("de"));
                assert_eq!(format, OutputFormat::Texts);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_empty_cache() {
        let cli = parse(&["headless-cms", "empty-cache", "s3cret"]);
        match cli.command {
            Command::EmptyCache { token } => assert_eq!(token, "s3cret"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_startup_config_requires_tokens() {
        let cli = Cli {
            token: None,
            empty_cache_token: Some("flush".to_string()),
            ..parse(&["headless-cms", "page", "home"])
        };
        let err = StartupConfig::from_cli(&cli).unwrap_err();
        assert!(err.to_string().contains("CMS_TOKEN"));

        let cli = Cli {
            token: Some("t".to_string()),
            empty_cache_token: Some(String::new()),
            ..parse(&["headless-cms", "page", "home"])
        };
        let err = StartupConfig::from_cli(&cli).unwrap_err();
        assert!(err.to_string().contains("CMS_EMPTY_CACHE_TOKEN"));
    }

    #[test]
    fn test_startup_config_file_cache_with_dir() {
        let cli = Cli {
            token: Some("t".to_string()),
            empty_cache_token: Some("flush".to_string()),
            ..parse(&["headless-cms", "--cache-dir", "/tmp/cms", "page", "home"])
        };
        let config = StartupConfig::from_cli(&cli).unwrap();
        assert_eq!(config.cache, CacheConfig::File(Some(PathBuf::from("/tmp/cms"))));
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_startup_config_redis_requires_url() {
        let cli = Cli {
            token: Some("t".to_string()),
            empty_cache_token: Some("flush".to_string()),
            redis_url: None,
            ..parse(&["headless-cms", "--cache", "redis", "page", "home"])
        };
        assert!(matches!(
            StartupConfig::from_cli(&cli),
            Err(CliError::MissingRedisUrl)
        ));
    }

    #[test]
    fn test_startup_config_sentinel_requires_master_and_addresses() {
        let cli = Cli {
            token: Some("t".to_string()),
            empty_cache_token: Some("flush".to_string()),
            ..parse(&[
                "headless-cms",
                "--cache",
                "sentinel",
                "--sentinel",
                "redis://10.0.0.1:26379",
                "page",
                "home",
            ])
        };
        assert!(matches!(
            StartupConfig::from_cli(&cli),
            Err(CliError::MissingSentinel)
        ));

        let cli = Cli {
            sentinel_master: Some("mymaster".to_string()),
            ..cli
        };
        let config = StartupConfig::from_cli(&cli).unwrap();
        assert!(matches!(config.cache, CacheConfig::Sentinel { ref master, .. } if master == "mymaster"));
    }

    #[tokio::test]
    async fn test_open_memory_cache() {
        let cache = CacheConfig::Memory.open().await.unwrap();
        cache.set("k", b"v").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
    }
}
