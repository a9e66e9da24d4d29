//! HTTP fetch primitive used to download player scripts

use crate::error::CipherError;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::debug;

/// Desktop Chrome user agent sent with every script request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: Option<String>,
    /// Proxy URL
    pub proxy_url: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
            proxy_url: None,
        }
    }
}

/// A fully read HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// `GET(url, headers) -> (status, headers, body)`
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse>;
}

#[async_trait]
impl HttpFetch for Client {
    async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse> {
        let mut request = Client::get(self, url);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(url, status, bytes = body.len(), "http response");
        Ok(HttpResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}

/// Browser-like header profile for script requests
pub fn browser_headers(user_agent: Option<&str>) -> Vec<(&'static str, String)> {
    vec![
        (
            "User-Agent",
            user_agent.unwrap_or(DEFAULT_USER_AGENT).to_string(),
        ),
        ("Accept", "*/*".to_string()),
        ("Accept-Language", "en-US,en;q=0.9".to_string()),
        ("Accept-Encoding", "gzip, deflate, br".to_string()),
        ("Connection", "keep-alive".to_string()),
    ]
}

/// Script download client built from [`HttpClientConfig`]
pub struct ScriptClient {
    client: Client,
    config: HttpClientConfig,
}

impl ScriptClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let mut builder = ClientBuilder::new()
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true);

        if let Some(proxy_url) = &config.proxy_url {
            match reqwest::Proxy::all(proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => {
                    return Err(CipherError::InvalidConfig(format!(
                        "invalid proxy {}: {}",
                        proxy_url, e
                    )))
                }
            }
        }

        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    /// Get configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// GET `url` with the browser header profile
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = HttpFetch::get(self, url, &[]).await?;
        if !response.is_success() {
            return Err(CipherError::FetchStatus {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(String::from_utf8_lossy(&response.body).into_owned())
    }
}

/// Overlay `headers` on the browser profile; a configured user agent wins
#[async_trait]
impl HttpFetch for ScriptClient {
    async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse> {
        let mut merged: Vec<(&str, String)> = browser_headers(None);
        for (name, value) in headers {
            match merged
                .iter_mut()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
            {
                Some(existing) => existing.1 = value.clone(),
                None => merged.push((*name, value.clone())),
            }
        }
        if let Some(user_agent) = &self.config.user_agent {
            for (name, value) in merged.iter_mut() {
                if name.eq_ignore_ascii_case("User-Agent") {
                    *value = user_agent.clone();
                }
            }
        }
        HttpFetch::get(&self.client, url, &merged).await
    }
}
