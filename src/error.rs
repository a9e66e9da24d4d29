//! Error types for ryt-cipher

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Main error type for signature and throttle resolution
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Script download failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Script request to {url} returned HTTP {status}")]
    FetchStatus { url: String, status: u16 },

    #[error("Transform function not found: {0}")]
    NotFound(String),

    #[error("Transform could not be resolved statically: {0}")]
    Unresolved(String),

    #[error("Script execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Script could not be parsed: {0}")]
    ScriptSyntax(String),

    #[error("Script execution failed: {0}")]
    Execution(String),

    #[error("All decipher strategies failed ({} attempted in {elapsed:?})", .attempts.join(", "))]
    AllStrategiesFailed {
        attempts: Vec<&'static str>,
        elapsed: Duration,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CipherError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            CipherError::Fetch(_) | CipherError::FetchStatus { .. } => "SCRIPT_DOWNLOAD_FAILED",
            CipherError::NotFound(_) => "TRANSFORM_NOT_FOUND",
            CipherError::Unresolved(_) => "REGEX_PARSING_FAILED",
            CipherError::Timeout(_) => "SIGNATURE_TIMEOUT",
            CipherError::ScriptSyntax(_) => "JS_PARSING_FAILED",
            CipherError::Execution(_) => "JS_EXECUTION_FAILED",
            CipherError::AllStrategiesFailed { .. } => "SIGNATURE_DECIPHER_FAILED",
            CipherError::InvalidConfig(_) => "INVALID_CONFIG",
            CipherError::InvalidUrl(_) | CipherError::UrlError(_) => "INVALID_URL",
            CipherError::RegexError(_) => "REGEX_ERROR",
            CipherError::JsonError(_) => "JSON_ERROR",
            CipherError::IoError(_) => "IO_ERROR",
        }
    }

    /// Check if the script could not be downloaded
    pub fn is_fetch(&self) -> bool {
        matches!(self, CipherError::Fetch(_) | CipherError::FetchStatus { .. })
    }

    /// Check if the sandbox deadline was exceeded
    pub fn is_timeout(&self) -> bool {
        matches!(self, CipherError::Timeout(_))
    }

    /// Check if the error came out of the script interpreter
    pub fn is_js_error(&self) -> bool {
        matches!(
            self,
            CipherError::ScriptSyntax(_) | CipherError::Execution(_)
        )
    }

    /// Check if the resolution cascade may move on to its next strategy
    pub fn is_fallthrough(&self) -> bool {
        matches!(
            self,
            CipherError::NotFound(_)
                | CipherError::Unresolved(_)
                | CipherError::Timeout(_)
                | CipherError::ScriptSyntax(_)
                | CipherError::Execution(_)
        )
    }

    /// Serializable view of the error
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Machine-readable error payload
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
}
