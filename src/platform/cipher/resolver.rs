//! Resolution orchestrator: runs the strategy cascade and owns the caches

use super::config::CipherConfig;
use super::metrics::{Metrics, MetricsSnapshot};
use super::parser::{self, ParseOutcome};
use super::sandbox::Sandbox;
use super::{heuristic, synth};
use crate::error::CipherError;
use crate::platform::client::HttpFetch;
use crate::platform::script_store::{Script, ScriptSource, ScriptStore};
use crate::utils::cache::{CipherCaches, SweeperHandle};
use crate::utils::url::{query_param, set_query_param, SignatureCipher};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a signature was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Cache,
    Structural,
    Synthesized,
    FullScript,
    Heuristic,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Cache => "cache",
            Strategy::Structural => "structural",
            Strategy::Synthesized => "synthesized",
            Strategy::FullScript => "full_script",
            Strategy::Heuristic => "heuristic",
        }
    }

    /// Whether the result came from the script itself rather than a guess
    pub fn is_verified(&self) -> bool {
        !matches!(self, Strategy::Heuristic)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signature strategies in priority order
const SIGNATURE_CASCADE: &[Strategy] = &[
    Strategy::Cache,
    Strategy::Structural,
    Strategy::Synthesized,
    Strategy::FullScript,
    Strategy::Heuristic,
];

/// A resolved signature and the strategy that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub value: String,
    pub strategy: Strategy,
}

/// Per-call view of the script shared by every strategy
struct ResolveContext<'a> {
    script: &'a Script,
    text: Cow<'a, str>,
}

impl<'a> ResolveContext<'a> {
    fn new(script: &'a Script) -> Self {
        Self {
            text: script.text(),
            script,
        }
    }
}

/// Signature and throttle resolution engine.
///
/// Build one per process and share it; every method takes `&self`.
pub struct Cipher {
    store: ScriptStore,
    caches: CipherCaches,
    metrics: Arc<Metrics>,
    sandbox: Sandbox,
    config: CipherConfig,
}

impl Cipher {
    /// Create an engine backed by the V8 sandbox
    pub fn new(http: Arc<dyn HttpFetch>, config: CipherConfig) -> Result<Self> {
        config.validate()?;
        let caches = CipherCaches::new(&config);
        Ok(Self {
            store: ScriptStore::new(http, Arc::clone(&caches.scripts)),
            caches,
            metrics: Arc::new(Metrics::new()),
            sandbox: Sandbox::deno(),
            config,
        })
    }

    pub fn with_sandbox(mut self, sandbox: Sandbox) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &CipherConfig {
        &self.config
    }

    pub fn caches(&self) -> &CipherCaches {
        &self.caches
    }

    /// Start the periodic cache sweep; it stops when the handle is dropped
    pub fn start_sweeper(&self) -> Result<SweeperHandle> {
        self.caches
            .spawn_sweeper(self.config.sweep_interval, Some(Arc::clone(&self.metrics)))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Script bytes and whether they came from the cache or the network
    pub async fn fetch_script_debug(&self, script_url: &str) -> Result<(Vec<u8>, ScriptSource)> {
        let (script, source) = self.store.fetch_debug(script_url).await?;
        Ok((script.bytes().to_vec(), source))
    }

    /// Structural parse of the script at `script_url`
    pub async fn parse_script(&self, script_url: &str) -> Result<ParseOutcome> {
        let script = self.store.get(script_url).await?;
        parser::parse(&script.text())
    }

    pub async fn decipher_signature(&self, script_url: &str, signature: &str) -> Result<String> {
        self.decipher_signature_detailed(script_url, signature)
            .await
            .map(|resolution| resolution.value)
    }

    /// Resolve `signature` and report which strategy produced the value
    pub async fn decipher_signature_detailed(
        &self,
        script_url: &str,
        signature: &str,
    ) -> Result<Resolution> {
        let started = Instant::now();

        // Fetched on the first strategy that needs it, so a cache hit stays offline
        let mut script = None;
        let mut attempts = Vec::with_capacity(SIGNATURE_CASCADE.len());
        for &strategy in SIGNATURE_CASCADE {
            attempts.push(strategy.as_str());
            match self
                .run_strategy(strategy, &mut script, script_url, signature)
                .await
            {
                Ok(value) if strategy == Strategy::Cache => {
                    debug!(strategy = "cache", "signature cache hit");
                    return Ok(Resolution { value, strategy });
                }
                Ok(value) if !value.is_empty() => {
                    let elapsed = started.elapsed();
                    self.caches
                        .signatures
                        .insert(signature.to_string(), value.clone());
                    self.metrics.record_success(strategy, elapsed);
                    if strategy.is_verified() {
                        debug!(
                            strategy = strategy.as_str(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            "signature resolved"
                        );
                    } else {
                        warn!(
                            strategy = strategy.as_str(),
                            confidence = "low",
                            script_url,
                            "signature resolved by keyword heuristic"
                        );
                    }
                    return Ok(Resolution { value, strategy });
                }
                Ok(_) => {
                    debug!(strategy = strategy.as_str(), "empty result, trying next strategy");
                }
                Err(err) if err.is_fallthrough() => {
                    debug!(
                        strategy = strategy.as_str(),
                        error = %err,
                        "strategy failed, trying next"
                    );
                }
                Err(err) => {
                    self.metrics.record_failure(started.elapsed());
                    return Err(err);
                }
            }
        }

        let elapsed = started.elapsed();
        self.metrics.record_failure(elapsed);
        warn!(
            script_url,
            elapsed_ms = elapsed.as_millis() as u64,
            "all decipher strategies failed"
        );
        Err(CipherError::AllStrategiesFailed { attempts, elapsed })
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        script: &mut Option<Script>,
        script_url: &str,
        signature: &str,
    ) -> Result<String> {
        match strategy {
            Strategy::Cache => self.cached_signature(signature),
            Strategy::Structural => {
                let ctx = self.context(script, script_url).await?;
                self.structural(&ctx, signature)
            }
            Strategy::Synthesized => {
                let ctx = self.context(script, script_url).await?;
                self.synthesized(&ctx, signature).await
            }
            Strategy::FullScript => {
                let ctx = self.context(script, script_url).await?;
                self.full_script(&ctx, signature).await
            }
            Strategy::Heuristic => {
                let ctx = self.context(script, script_url).await?;
                heuristic::guess(&ctx.text, signature)
            }
        }
    }

    /// Script view for a strategy, fetching the script on first use
    async fn context<'s>(
        &self,
        slot: &'s mut Option<Script>,
        script_url: &str,
    ) -> Result<ResolveContext<'s>> {
        let script = match slot.take() {
            Some(script) => script,
            None => self.store.get(script_url).await?,
        };
        Ok(ResolveContext::new(slot.insert(script)))
    }

    fn cached_signature(&self, signature: &str) -> Result<String> {
        match self.caches.signatures.get(&signature.to_string()) {
            Some(value) => {
                self.metrics.record_hit();
                Ok(value)
            }
            None => {
                self.metrics.record_miss();
                Err(CipherError::NotFound("signature not cached".into()))
            }
        }
    }

    fn structural(&self, ctx: &ResolveContext<'_>, signature: &str) -> Result<String> {
        let key = ctx.script.content_hash().to_string();
        let (transform, cached) = match self.caches.transforms.get(&key) {
            Some(transform) => (transform, true),
            None => (parser::parse(&ctx.text)?.transform, false),
        };

        let value = transform.apply(signature);
        if !cached && !value.is_empty() {
            debug!(hash = %key, transform = %transform, "caching parsed transform");
            self.caches.transforms.insert(key, transform);
        }
        Ok(value)
    }

    async fn synthesized(&self, ctx: &ResolveContext<'_>, signature: &str) -> Result<String> {
        let entry_point = &self.config.signature_entry_point;
        let program = synth::synthesize(&ctx.text, entry_point)?;
        self.sandbox
            .run(&program, entry_point, signature, self.config.execution_timeout)
            .await
    }

    /// Run the whole script, calling the located transform function first and
    /// the configured entry point second
    async fn full_script(&self, ctx: &ResolveContext<'_>, signature: &str) -> Result<String> {
        let mut candidates = Vec::with_capacity(2);
        if let Some(name) = parser::locate_function_name(&ctx.text) {
            candidates.push(name);
        }
        if !candidates.contains(&self.config.signature_entry_point) {
            candidates.push(self.config.signature_entry_point.clone());
        }

        let mut last_err = None;
        for entry_point in &candidates {
            match self
                .sandbox
                .run_full(&ctx.text, entry_point, signature, self.config.execution_timeout)
                .await
            {
                Ok(value) => return Ok(value),
                // Another entry point would rerun the same program
                Err(err @ (CipherError::Timeout(_) | CipherError::ScriptSyntax(_))) => {
                    return Err(err)
                }
                Err(err) => {
                    debug!(entry_point = entry_point.as_str(), error = %err, "entry point failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CipherError::NotFound("no entry point to call".into())))
    }

    /// Decode a throttle value, returning it unchanged on any failure
    pub async fn decipher_throttle(&self, script_url: &str, value: &str) -> Result<String> {
        if let Some(decoded) = self.caches.throttle.get(&value.to_string()) {
            self.metrics.record_throttle(false);
            return Ok(decoded);
        }

        let script = match self.store.get(script_url).await {
            Ok(script) => script,
            Err(err) => {
                warn!(
                    script_url,
                    error = %err,
                    "throttle script unavailable, passing value through"
                );
                self.metrics.record_throttle(true);
                return Ok(value.to_string());
            }
        };

        let entry_point = &self.config.throttle_entry_point;
        let result = self
            .sandbox
            .run_full(&script.text(), entry_point, value, self.config.execution_timeout)
            .await;

        match result {
            Ok(decoded) if !decoded.is_empty() && decoded != value => {
                self.caches
                    .throttle
                    .insert(value.to_string(), decoded.clone());
                self.metrics.record_throttle(false);
                Ok(decoded)
            }
            Ok(_) => {
                debug!(entry_point = entry_point.as_str(), "throttle function returned its input");
                self.metrics.record_throttle(true);
                Ok(value.to_string())
            }
            Err(err) => {
                debug!(error = %err, "throttle decode failed, passing value through");
                self.metrics.record_throttle(true);
                Ok(value.to_string())
            }
        }
    }

    /// Build a playable media URL from a `signatureCipher` blob
    pub async fn resolve_media_url(&self, script_url: &str, cipher_blob: &str) -> Result<String> {
        let cipher = SignatureCipher::parse(cipher_blob)?;
        let signature = self.decipher_signature(script_url, &cipher.signature).await?;
        let mut url = set_query_param(&cipher.url, &cipher.sp, &signature)?;

        if let Some(n) = query_param(&url, "n")? {
            let decoded = self.decipher_throttle(script_url, &n).await?;
            if decoded != n {
                url = set_query_param(&url, "n", &decoded)?;
            }
        }

        info!(script_url, "media URL resolved");
        Ok(url)
    }
}
