//! Caching client for the Storyblok content delivery API
//!
//! [`CmsClient`] fetches stories by slug, version and language and caches what
//! it served. The cache is advisory in both directions: a failed or timed-out
//! read falls through to the API, and a failed write still returns the fresh
//! response. Only the API call itself and decoding can fail a fetch.
//!
//! The `draft` version is always fetched live and never read from or written
//! to the cache.

mod coalesce;
mod key;
mod status;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{Cache, CacheError};
use crate::content::{
    decode_block_index, decode_document, decode_translatable_texts, BlockIndex, Document,
    TranslatableTexts,
};
use crate::transport::{ApiRequest, HttpTransport, Transport, TransportError};

use coalesce::InFlight;
pub use key::{cache_key, KeyPrefix};
pub use status::describe as describe_status;

/// Stories endpoint of the content delivery API
pub const DEFAULT_BASE_URL: &str = "https://api.storyblok.com/v2/cdn/stories";

/// Version requested when the caller passes an empty one
pub const DEFAULT_VERSION: &str = "published";

/// Version that is always fetched live and never cached
pub const DRAFT_VERSION: &str = "draft";

/// Errors returned by [`CmsClient`]
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client was built with missing or invalid settings
    #[error("invalid client configuration: {0}")]
    Config(String),

    /// The supplied cache invalidation token is wrong
    #[error("cache invalidation token incorrect")]
    TokenMismatch,

    /// No cache invalidation token is configured
    #[error("cache invalidation token not set")]
    TokenNotSet,

    /// The request never produced a status code
    #[error("request to {url} failed: {source}")]
    Transport {
        /// Request URL with the auth token redacted
        url: String,
        #[source]
        source: TransportError,
    },

    /// The API answered with something other than 200
    #[error("{url}: status {status}: {description}")]
    Status {
        /// Request URL with the auth token redacted
        url: String,
        status: u16,
        description: &'static str,
    },

    /// The response did not have the shape the requested projection needs
    #[error("failed to decode response for {key}: {source}")]
    Decode {
        /// Cache key naming the shape and request
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The cache refused to clear during invalidation
    #[error("failed to empty cache: {0}")]
    CacheClear(#[source] CacheError),

    /// A shared fetch task panicked or was aborted before producing a result
    #[error("shared fetch did not complete: {0}")]
    FetchTask(#[source] tokio::task::JoinError),

    /// Failure of a remote fetch shared with concurrent callers
    #[error(transparent)]
    Shared(Arc<ClientError>),
}

impl ClientError {
    /// HTTP status code for [`ClientError::Status`], looking through shared failures
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Shared(inner) => inner.status(),
            _ => None,
        }
    }
}

/// Builder for [`CmsClient`]
///
/// The auth token, invalidation token and cache are required. Without a
/// transport, an [`HttpTransport`] with default settings is created.
pub struct CmsClientBuilder {
    auth_token: Option<String>,
    invalidation_token: Option<String>,
    cache: Option<Arc<dyn Cache>>,
    transport: Option<Arc<dyn Transport>>,
    base_url: String,
    cache_timeout: Option<Duration>,
    coalesce_requests: bool,
}

impl Default for CmsClientBuilder {
    fn default() -> Self {
        Self {
            auth_token: None,
            invalidation_token: None,
            cache: None,
            transport: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_timeout: None,
            coalesce_requests: false,
        }
    }
}

impl CmsClientBuilder {
    /// Token appended to every API request
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Secret required by [`CmsClient::empty_cache`]
    pub fn invalidation_token(mut self, token: impl Into<String>) -> Self {
        self.invalidation_token = Some(token.into());
        self
    }

    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the stories endpoint (for testing or regional endpoints)
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Deadline for each cache read or write; an elapsed deadline counts as a cache error
    pub fn cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = Some(timeout);
        self
    }

    /// Lets concurrent identical requests share one API call (off by default)
    pub fn coalesce_requests(mut self, enabled: bool) -> Self {
        self.coalesce_requests = enabled;
        self
    }

    pub fn build(self) -> Result<CmsClient, ClientError> {
        let auth_token = self
            .auth_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ClientError::Config("auth token is empty".to_string()))?;
        let invalidation_token = self
            .invalidation_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ClientError::Config("cache invalidation token is empty".to_string()))?;
        let cache = self
            .cache
            .ok_or_else(|| ClientError::Config("cache is not set".to_string()))?;

        let base_url = Url::parse(&self.base_url).map_err(|err| {
            ClientError::Config(format!("invalid base URL {}: {}", self.base_url, err))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "base URL {} cannot carry a path",
                self.base_url
            )));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new().map_err(|err| {
                ClientError::Config(format!("could not build HTTP transport: {}", err))
            })?),
        };

        Ok(CmsClient {
            auth_token,
            invalidation_token,
            cache,
            transport,
            base_url,
            cache_timeout: self.cache_timeout,
            in_flight: self.coalesce_requests.then(InFlight::default),
        })
    }
}

/// Client for fetching and caching stories
///
/// Cloning is cheap and clones share the cache, transport and in-flight requests.
#[derive(Clone)]
pub struct CmsClient {
    auth_token: String,
    invalidation_token: String,
    cache: Arc<dyn Cache>,
    transport: Arc<dyn Transport>,
    base_url: Url,
    cache_timeout: Option<Duration>,
    in_flight: Option<InFlight>,
}

impl fmt::Debug for CmsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmsClient")
            .field("base_url", &self.base_url.as_str())
            .field("cache_timeout", &self.cache_timeout)
            .field("coalesce_requests", &self.in_flight.is_some())
            .finish_non_exhaustive()
    }
}

impl CmsClient {
    pub fn builder() -> CmsClientBuilder {
        CmsClientBuilder::default()
    }

    /// Token appended to API requests
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// The cache this client reads and writes
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Cache key used for a given shape and request
    pub fn cache_key(
        &self,
        prefix: KeyPrefix,
        page: &str,
        version: &str,
        language: Option<&str>,
    ) -> String {
        cache_key(prefix, page, version, language)
    }

    /// Clears the whole cache if `token` matches the configured invalidation token
    pub async fn empty_cache(&self, token: &str) -> Result<(), ClientError> {
        if token != self.invalidation_token {
            warn!("cache invalidation rejected: token mismatch");
            return Err(ClientError::TokenMismatch);
        }
        with_deadline("clear", self.cache_timeout, self.cache.clear())
            .await
            .map_err(ClientError::CacheClear)?;
        info!("cache emptied");
        Ok(())
    }

    /// The configured invalidation token, for callers that hand it out (e.g. an admin endpoint)
    pub fn invalidation_token(&self) -> Result<&str, ClientError> {
        if self.invalidation_token.is_empty() {
            return Err(ClientError::TokenNotSet);
        }
        Ok(&self.invalidation_token)
    }

    /// Fetches a story as raw response bytes
    ///
    /// `page` is the story slug such as `home` or `blog/first-post`; an empty
    /// slug requests the story listing. An empty `version` means `published`.
    pub async fn fetch_page_json(
        &self,
        page: &str,
        version: &str,
        language: Option<&str>,
    ) -> Result<Vec<u8>, ClientError> {
        let key = cache_key(KeyPrefix::Json, page, version, language);
        let cacheable = is_cacheable(version);

        if cacheable {
            if let Some(json) = read_cache(self.cache.as_ref(), self.cache_timeout, &key).await {
                return Ok(json);
            }
        }

        let fetch = RemoteFetch {
            transport: Arc::clone(&self.transport),
            cache: cacheable.then(|| Arc::clone(&self.cache)),
            cache_timeout: self.cache_timeout,
            url: self.page_url(page, version, language)?,
            key: key.clone(),
        };
        match &self.in_flight {
            Some(in_flight) => in_flight.run(&key, fetch.run()).await,
            None => fetch.run().await,
        }
    }

    /// Fetches a story as an untyped JSON document
    pub async fn fetch_page(
        &self,
        page: &str,
        version: &str,
        language: Option<&str>,
    ) -> Result<Document, ClientError> {
        self.fetch_projection(KeyPrefix::Decoded, page, version, language, decode_document)
            .await
    }

    /// Fetches a story's body blocks keyed by block id
    pub async fn fetch_block_index(
        &self,
        page: &str,
        version: &str,
        language: Option<&str>,
    ) -> Result<BlockIndex, ClientError> {
        self.fetch_projection(KeyPrefix::BlockIndex, page, version, language, decode_block_index)
            .await
    }

    /// Fetches the translatable texts of a story
    ///
    /// Built on the raw JSON fetch and its cache; the texts themselves are not cached.
    pub async fn fetch_translatable_texts(
        &self,
        page: &str,
        version: &str,
        language: Option<&str>,
    ) -> Result<TranslatableTexts, ClientError> {
        let json = self.fetch_page_json(page, version, language).await?;
        decode_translatable_texts(&json).map_err(|source| ClientError::Decode {
            key: cache_key(KeyPrefix::Json, page, version, language),
            source,
        })
    }

    /// Serves a derived shape from its own cache entry or decodes it from the raw JSON
    async fn fetch_projection<T>(
        &self,
        prefix: KeyPrefix,
        page: &str,
        version: &str,
        language: Option<&str>,
        decode: fn(&[u8]) -> Result<T, serde_json::Error>,
    ) -> Result<T, ClientError>
    where
        T: Serialize + DeserializeOwned,
    {
        let key = cache_key(prefix, page, version, language);
        let cacheable = is_cacheable(version);

        if cacheable {
            if let Some(payload) = read_cache(self.cache.as_ref(), self.cache_timeout, &key).await {
                match serde_json::from_slice(&payload) {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        warn!(cache_key = %key, error = %err, "discarding undecodable cache entry")
                    }
                }
            }
        }

        let json = self.fetch_page_json(page, version, language).await?;
        let value = decode(&json).map_err(|source| ClientError::Decode {
            key: key.clone(),
            source,
        })?;

        if cacheable {
            match serde_json::to_vec(&value) {
                Ok(payload) => {
                    write_cache(self.cache.as_ref(), self.cache_timeout, &key, &payload).await
                }
                Err(err) => warn!(cache_key = %key, error = %err, "could not serialize for cache"),
            }
        }
        Ok(value)
    }

    /// Builds `<base>/<page>?version=..[&language=..]&token=..`
    fn page_url(&self, page: &str, version: &str, language: Option<&str>) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        if !page.is_empty() {
            url.path_segments_mut()
                .map_err(|_| {
                    ClientError::Config(format!("base URL {} cannot carry a path", self.base_url))
                })?
                .pop_if_empty()
                .extend(page.split('/'));
        }

        let version = if version.is_empty() {
            DEFAULT_VERSION
        } else {
            version
        };
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("version", version);
            if let Some(language) = language.filter(|language| !language.is_empty()) {
                query.append_pair("language", language);
            }
            query.append_pair("token", &self.auth_token);
        }
        Ok(url)
    }
}

/// One API call plus the cache write for its response
struct RemoteFetch {
    transport: Arc<dyn Transport>,
    /// `None` for requests that must not be cached
    cache: Option<Arc<dyn Cache>>,
    cache_timeout: Option<Duration>,
    url: Url,
    key: String,
}

impl RemoteFetch {
    async fn run(self) -> Result<Vec<u8>, ClientError> {
        let shown = redact_token(&self.url);
        debug!(url = %shown, "requesting story");

        let response = self
            .transport
            .execute(ApiRequest { url: self.url })
            .await
            .map_err(|source| ClientError::Transport {
                url: shown.clone(),
                source,
            })?;

        if response.status != 200 {
            return Err(ClientError::Status {
                url: shown,
                status: response.status,
                description: status::describe(response.status),
            });
        }

        if let Some(cache) = &self.cache {
            write_cache(cache.as_ref(), self.cache_timeout, &self.key, &response.body).await;
        }
        Ok(response.body)
    }
}

fn is_cacheable(version: &str) -> bool {
    version != DRAFT_VERSION
}

/// Cache read where errors, timeouts and empty payloads all count as a miss
async fn read_cache(cache: &dyn Cache, timeout: Option<Duration>, key: &str) -> Option<Vec<u8>> {
    match with_deadline("get", timeout, cache.get(key)).await {
        Ok(Some(payload)) if !payload.is_empty() => {
            debug!(cache_key = %key, "cache hit");
            Some(payload)
        }
        Ok(_) => {
            debug!(cache_key = %key, "cache miss");
            None
        }
        Err(err) => {
            warn!(cache_key = %key, error = %err, "cache read failed");
            None
        }
    }
}

/// Cache write whose failure is only logged
async fn write_cache(cache: &dyn Cache, timeout: Option<Duration>, key: &str, payload: &[u8]) {
    if let Err(err) = with_deadline("set", timeout, cache.set(key, payload)).await {
        warn!(cache_key = %key, error = %err, "cache write failed");
    }
}

async fn with_deadline<T>(
    operation: &'static str,
    timeout: Option<Duration>,
    op: impl Future<Output = Result<T, CacheError>>,
) -> Result<T, CacheError> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, op)
            .await
            .unwrap_or(Err(CacheError::Timeout { operation, timeout })),
        None => op.await,
    }
}

/// Renders `url` with the `token` query value masked
fn redact_token(url: &Url) -> String {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            let value = if name == "token" {
                "***".to_string()
            } else {
                value.into_owned()
            };
            (name.into_owned(), value)
        })
        .collect();

    let mut shown = url.clone();
    shown.query_pairs_mut().clear().extend_pairs(pairs);
    shown.to_string()
}
