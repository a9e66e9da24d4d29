//! Output formatting for the debug binary

use crate::cli::args::VerbosityLevel;
use crate::error::CipherError;
use crate::platform::cipher::{MetricsSnapshot, ParseOutcome, Resolution};
use crate::platform::script_store::ScriptSource;
use colored::Colorize;
use serde_json::json;
use std::time::Duration;

/// Output formatter for ryt-cipher
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
    json: bool,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(verbosity: VerbosityLevel, json: bool) -> Self {
        Self { verbosity, json }
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet && !self.json {
            println!("{} {}", "info:".blue().bold(), message);
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        }
    }

    /// Print error message
    pub fn error(&self, err: &CipherError) {
        if self.json {
            println!("{}", render_error_json(err));
        } else {
            eprintln!("{} [{}] {}", "error:".red().bold(), err.code(), err);
        }
    }

    /// Print a resolved signature
    pub fn print_resolution(&self, signature: &str, resolution: &Resolution) {
        if self.json {
            println!("{}", render_resolution_json(signature, resolution));
            return;
        }

        let strategy = resolution.strategy.as_str();
        let strategy = if resolution.strategy.is_verified() {
            strategy.green()
        } else {
            strategy.yellow()
        };
        match self.verbosity {
            VerbosityLevel::Quiet => println!("{}", resolution.value),
            _ => println!("{} -> {} ({})", signature, resolution.value, strategy),
        }
    }

    /// Print a decoded throttle value
    pub fn print_throttle(&self, input: &str, output: &str) {
        if self.json {
            let value = json!({
                "input": input,
                "output": output,
                "changed": input != output,
            });
            println!("{}", value);
            return;
        }

        match self.verbosity {
            VerbosityLevel::Quiet => println!("{}", output),
            _ if input == output => {
                println!("{} -> {} ({})", input, output, "passthrough".yellow())
            }
            _ => println!("{} -> {}", input, output),
        }
    }

    /// Print a parsed transform
    pub fn print_transform(&self, outcome: &ParseOutcome) {
        if self.json {
            let value = json!({
                "function": outcome.function_name,
                "operations": outcome.transform.operations(),
                "backfilled": outcome.backfilled,
            });
            println!("{}", value);
            return;
        }

        if let Some(name) = &outcome.function_name {
            self.info(&format!("transform function: {}", name));
        }
        if outcome.backfilled {
            self.warning("slice offset back-filled from a literal elsewhere in the script");
        }
        println!("{}", outcome.transform);
    }

    /// Print script fetch details
    pub fn print_fetch(&self, url: &str, bytes: usize, source: ScriptSource, elapsed: Duration) {
        if self.json {
            let value = json!({
                "url": url,
                "bytes": bytes,
                "source": source.to_string(),
                "elapsed_ms": elapsed.as_millis() as u64,
            });
            println!("{}", value);
            return;
        }
        println!(
            "{} ({}) from {} in {}",
            url,
            format_bytes(bytes as u64),
            source,
            format_duration(elapsed)
        );
    }

    /// Print a single resolved URL
    pub fn print_url(&self, url: &str) {
        if self.json {
            println!("{}", json!({ "url": url }));
        } else {
            println!("{}", url);
        }
    }

    /// Print the metrics summary in verbose mode
    pub fn print_metrics(&self, metrics: &MetricsSnapshot) {
        if self.verbosity != VerbosityLevel::Verbose || self.json {
            return;
        }
        eprintln!("{}", render_metrics(metrics));
    }
}

fn render_error_json(err: &CipherError) -> String {
    json!({ "error": err.report() }).to_string()
}

fn render_resolution_json(signature: &str, resolution: &Resolution) -> String {
    json!({
        "signature": signature,
        "value": resolution.value,
        "strategy": resolution.strategy,
        "verified": resolution.strategy.is_verified(),
    })
    .to_string()
}

fn render_metrics(metrics: &MetricsSnapshot) -> String {
    format!(
        "requests={} hits={} misses={} failures={} hit_ratio={:.2} avg_latency={:.1}ms",
        metrics.requests,
        metrics.cache_hits,
        metrics.cache_misses,
        metrics.failures,
        metrics.hit_ratio(),
        metrics.average_latency().as_secs_f64() * 1000.0
    )
}

/// Format bytes as human-readable string
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exp = (bytes_f64.ln() / THRESHOLD.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);

    let value = bytes_f64 / THRESHOLD.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.1} {}", value, UNITS[exp])
    }
}

/// Format a short duration for timing output
fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
