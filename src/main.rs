//! Main entry point for the ryt-cipher CLI

use anyhow::{bail, Context};
use clap::Parser;
use futures::future::join_all;
use ryt_cipher::cli::{read_script_file, Args, Command, OutputFormatter, VerbosityLevel};
use ryt_cipher::platform::cipher::parse;
use ryt_cipher::utils::url::extract_script_url;
use ryt_cipher::{Cipher, ScriptClient};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbosity_level());

    debug!("Starting ryt-cipher with args: {:?}", args);

    let formatter = OutputFormatter::new(args.verbosity_level(), args.json);
    let client = Arc::new(
        ScriptClient::with_config(args.http_config()).context("failed to build HTTP client")?,
    );
    let cipher = Cipher::new(client.clone(), args.cipher_config())
        .context("invalid resolution settings")?;
    let _sweeper = cipher.start_sweeper()?;

    let outcome = run(&args, &cipher, &client, &formatter).await;
    formatter.print_metrics(&cipher.metrics());
    outcome
}

async fn run(
    args: &Args,
    cipher: &Cipher,
    client: &ScriptClient,
    formatter: &OutputFormatter,
) -> anyhow::Result<()> {
    match &args.command {
        Command::Decipher {
            script_url,
            signatures,
        } => {
            let results = join_all(
                signatures
                    .iter()
                    .map(|signature| cipher.decipher_signature_detailed(script_url, signature)),
            )
            .await;

            let mut failed = 0;
            for (signature, result) in signatures.iter().zip(results) {
                match result {
                    Ok(resolution) => formatter.print_resolution(signature, &resolution),
                    Err(err) => {
                        formatter.error(&err);
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} signatures failed", failed, signatures.len());
            }
        }
        Command::Throttle { script_url, values } => {
            let results = join_all(
                values
                    .iter()
                    .map(|value| cipher.decipher_throttle(script_url, value)),
            )
            .await;
            for (value, result) in values.iter().zip(results) {
                formatter.print_throttle(value, &result?);
            }
        }
        Command::Parse { file, url } => {
            let outcome = match (file, url) {
                (Some(path), _) => {
                    let script = read_script_file(path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    parse(&script)
                }
                (None, Some(url)) => cipher.parse_script(url).await,
                (None, None) => bail!("either --file or --url is required"),
            };
            match outcome {
                Ok(outcome) => formatter.print_transform(&outcome),
                Err(err) => {
                    formatter.error(&err);
                    bail!("no transform found");
                }
            }
        }
        Command::Fetch { url } => {
            let started = Instant::now();
            let (bytes, source) = cipher
                .fetch_script_debug(url)
                .await
                .with_context(|| format!("failed to fetch {}", url))?;
            formatter.print_fetch(url, bytes.len(), source, started.elapsed());
        }
        Command::Resolve { script_url, cipher: blob } => {
            let url = cipher
                .resolve_media_url(script_url, blob)
                .await
                .context("failed to resolve media URL")?;
            formatter.print_url(&url);
        }
        Command::Discover { page_url } => {
            let html = client
                .get_text(page_url)
                .await
                .with_context(|| format!("failed to fetch {}", page_url))?;
            let script_url = extract_script_url(&html, page_url)?;
            info!(script_url = %script_url, "player script located");
            formatter.print_url(&script_url);
        }
    }

    Ok(())
}

/// Initialize logging system
fn init_logging(verbosity: VerbosityLevel) {
    // RUST_LOG wins over the verbosity flags
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(true)
                .compact(),
        )
        .init();
}
