//! Command line argument parsing

use crate::platform::cipher::CipherConfig;
use crate::platform::client::HttpClientConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Signature and throttle resolution debugger for the ryt downloader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// HTTP timeout (e.g., 30s, 1m)
    #[arg(long, global = true, value_name = "DURATION", default_value = "30s")]
    pub timeout: humantime::Duration,

    /// Deadline for one sandboxed script execution
    #[arg(long, global = true, value_name = "DURATION", default_value = "30s")]
    pub exec_timeout: humantime::Duration,

    /// Override User-Agent header
    #[arg(long, global = true, value_name = "USER_AGENT")]
    pub user_agent: Option<String>,

    /// Proxy URL (http/https/socks)
    #[arg(long, global = true, value_name = "URL")]
    pub proxy: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Resolve one or more signatures concurrently
    Decipher {
        /// Player script URL
        script_url: String,
        /// Raw signatures
        #[arg(required = true)]
        signatures: Vec<String>,
    },
    /// Decode throttle (n) values
    Throttle {
        /// Player script URL
        script_url: String,
        /// Raw n values
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Print the transform parsed out of a script
    Parse {
        /// Script on disk
        #[arg(long, value_name = "PATH", conflicts_with = "url", required_unless_present = "url")]
        file: Option<PathBuf>,
        /// Script URL
        #[arg(long, value_name = "URL")]
        url: Option<String>,
    },
    /// Download a script and report whether it came from the cache
    Fetch {
        /// Player script URL
        url: String,
    },
    /// Build a playable media URL from a signatureCipher blob
    Resolve {
        /// Player script URL
        script_url: String,
        /// URL-encoded signatureCipher value
        cipher: String,
    },
    /// Find the player script URL on a watch page
    Discover {
        /// Watch page URL
        page_url: String,
    },
}

impl Args {
    /// Get HTTP timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        self.timeout.into()
    }

    /// Get sandbox execution deadline as Duration
    pub fn exec_timeout_duration(&self) -> Duration {
        self.exec_timeout.into()
    }

    /// HTTP client settings from the command line
    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: self.timeout_duration(),
            user_agent: self.user_agent.clone(),
            proxy_url: self.proxy.clone(),
        }
    }

    /// Engine settings from the command line
    pub fn cipher_config(&self) -> CipherConfig {
        CipherConfig::default().with_execution_timeout(self.exec_timeout_duration())
    }

    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    /// Normal
    Normal,
    /// Verbose (debug info)
    Verbose,
}

impl VerbosityLevel {
    /// Default log filter for this level
    pub fn log_filter(&self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "info",
            VerbosityLevel::Verbose => "debug",
        }
    }
}

impl Default for Args {
    fn default() -> Self {
        Self {
            command: Command::Fetch { url: String::new() },
            timeout: humantime::Duration::from(Duration::from_secs(30)),
            exec_timeout: humantime::Duration::from(Duration::from_secs(30)),
            user_agent: None,
            proxy: None,
            json: false,
            verbose: false,
            quiet: false,
        }
    }
}
