//! # ryt-cipher - signature and throttle resolution
//!
//! Resolves the scrambled `s` signature and throttling `n` parameter of signed
//! media URLs by replaying the transforms defined in the platform's player
//! script.
//!
//! ## Features
//!
//! - Structural transform parsing without executing the script
//! - Minimal-program synthesis for partially resolved transforms
//! - Sandboxed V8 execution under a hard deadline with sanitize-and-retry
//! - Keyword heuristic as a last resort, flagged as unverified
//! - TTL caches for scripts, parsed transforms and resolved values
//!
//! ## Example
//!
//! ```rust,no_run
//! use ryt_cipher::{Cipher, CipherConfig, ScriptClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cipher = Cipher::new(Arc::new(ScriptClient::new()?), CipherConfig::default())?;
//!     let _sweeper = cipher.start_sweeper()?;
//!
//!     let script_url = "https://www.youtube.com/s/player/abc123/player_ias.vflset/en_US/base.js";
//!     let signature = cipher.decipher_signature(script_url, "SCRAMBLED").await?;
//!     let n = cipher.decipher_throttle(script_url, "THROTTLED").await?;
//!     println!("sig={} n={}", signature, n);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod platform;
pub mod utils;

// Re-export main types
pub use error::{CipherError, ErrorReport};
pub use platform::cipher::{
    Cipher, CipherConfig, MetricsSnapshot, Operation, Resolution, Strategy, Transform,
};
pub use platform::client::{HttpClientConfig, HttpFetch, HttpResponse, ScriptClient};
pub use platform::script_store::{Script, ScriptSource, ScriptStore};
pub use utils::cache::{CacheStats, CipherCaches, SweeperHandle, TtlCache};

/// Result type alias for ryt-cipher operations
pub type Result<T> = std::result::Result<T, CipherError>;
