//! Player script download and caching

use crate::error::CipherError;
use crate::platform::client::{browser_headers, HttpFetch};
use crate::utils::cache::TtlCache;
use crate::Result;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One immutable revision of the player script
#[derive(Debug, Clone)]
pub struct Script {
    url: String,
    body: Arc<[u8]>,
    hash: Arc<str>,
}

impl Script {
    pub fn new(url: impl Into<String>, body: impl Into<Arc<[u8]>>) -> Self {
        let body = body.into();
        let hash = hex::encode(Sha256::digest(&body));
        Self {
            url: url.into(),
            body,
            hash: hash.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// SHA-256 of the body, hex encoded
    pub fn content_hash(&self) -> &str {
        &self.hash
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Where a script came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSource {
    Cache,
    Network,
}

impl fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptSource::Cache => write!(f, "cache"),
            ScriptSource::Network => write!(f, "network"),
        }
    }
}

/// Fetches scripts by URL through a TTL cache
#[derive(Clone)]
pub struct ScriptStore {
    http: Arc<dyn HttpFetch>,
    cache: Arc<TtlCache<String, Script>>,
}

impl ScriptStore {
    pub fn new(http: Arc<dyn HttpFetch>, cache: Arc<TtlCache<String, Script>>) -> Self {
        Self { http, cache }
    }

    /// Script for `url`, from cache when fresh
    pub async fn get(&self, url: &str) -> Result<Script> {
        self.fetch_debug(url).await.map(|(script, _)| script)
    }

    /// Like [`ScriptStore::get`] but also reports where the script came from
    pub async fn fetch_debug(&self, url: &str) -> Result<(Script, ScriptSource)> {
        if let Some(script) = self.cache.get(&url.to_string()) {
            debug!(script_url = url, "script cache hit");
            return Ok((script, ScriptSource::Cache));
        }

        // Concurrent misses for one URL may each fetch; the last insert wins
        let response = self.http.get(url, &browser_headers(None)).await?;
        if !response.is_success() {
            return Err(CipherError::FetchStatus {
                url: url.to_string(),
                status: response.status,
            });
        }

        let script = Script::new(url, response.body);
        debug!(
            script_url = url,
            bytes = script.len(),
            hash = script.content_hash(),
            "script downloaded"
        );
        self.cache.insert(url.to_string(), script.clone());
        Ok((script, ScriptSource::Network))
    }
}
