//! Dynatrace Writer CLI
//!
//! Streams newline-delimited JSON samples to the Dynatrace metrics ingest API.
//!
//! # Usage
//!
//! ```bash
//! dtwriter --help
//! dtwriter --out "url=https://abc123.live.dynatrace.com/api/v2/metrics/ingest" < samples.ndjson
//! dtwriter --config dynatrace.json run --input samples.ndjson
//! dtwriter --config dynatrace.json config
//! ```

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use shared::config::Config;
use shared::models::RawSample;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use writer::{Output, OutputParams};

const REDACTED: &str = "<redacted>";
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Dynatrace writer - export load-test samples to the metrics ingest API
#[derive(Parser)]
#[command(name = "dtwriter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "DTWRITER_CONFIG")]
    config: Option<PathBuf>,

    /// Inline configuration, e.g. `url=https://host/api,flushPeriod=5s`
    #[arg(short, long, env = "DTWRITER_OUT", default_value = "")]
    out: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read samples and export them (default)
    Run {
        /// Newline-delimited JSON samples; stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let params = OutputParams::from_process_env(read_json_config(cli.config.as_deref())?, &cli.out);

    match cli.command {
        Some(Commands::Config) => {
            let config = Config::resolve(
                params.json_config.as_deref(),
                &params.environment,
                &params.config_argument,
            )?;
            println!("{}", serde_json::to_string_pretty(&describe_config(&config)?)?);
        }
        Some(Commands::Run { input }) => run(params, input.as_deref()).await?,
        None => run(params, None).await?,
    }

    Ok(())
}

fn read_json_config(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|path| {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))
    })
    .transpose()
}

/// Renders the resolved configuration with the API token hidden.
fn describe_config(config: &Config) -> Result<Value> {
    let request = config.request_config()?;
    Ok(json!({
        "url": config.url,
        "requestUrl": request.url.as_str(),
        "insecureSkipTLSVerify": config.insecure_skip_tls_verify,
        "caCertFile": config.ca_cert_file,
        "apitoken": config.api_token.as_ref().map(|_| REDACTED),
        "flushPeriod": format!("{:?}", config.flush_period),
        "headers": config.headers,
        "keepTags": config.keep_tags,
        "keepNameTag": config.keep_name_tag,
        "keepUrlTag": config.keep_url_tag,
    }))
}

/// Parses one input line. Blank lines yield `Ok(None)`.
fn parse_sample(line: &str) -> Result<Option<RawSample>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let sample: RawSample = serde_json::from_str(line).context("malformed sample")?;
    sample.validate_sample()?;
    Ok(Some(sample))
}

async fn run(params: OutputParams, input: Option<&Path>) -> Result<()> {
    let output = Output::new(params)?;
    tracing::info!(description = output.description(), "Output initialized");
    output.start()?;

    let reader: Box<dyn AsyncRead + Unpin + Send> = match input {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open input {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    tokio::select! {
        result = forward_samples(&output, reader) => {
            let (accepted, rejected) = result?;
            tracing::info!(accepted, rejected, "End of input");
            wait_for_drain(&output).await;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
        }
    }

    output.stop().await;
    Ok(())
}

/// Buffers every valid sample from `reader`.
///
/// # Returns
///
/// The number of accepted and rejected lines.
async fn forward_samples(
    output: &Output,
    reader: impl AsyncRead + Unpin,
) -> Result<(usize, usize)> {
    let mut lines = BufReader::new(reader).lines();
    let mut accepted = 0;
    let mut rejected = 0;
    let mut line_number = 0;

    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        line_number += 1;
        match parse_sample(&line) {
            Ok(Some(sample)) => {
                output.add_sample(sample);
                accepted += 1;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(line = line_number, error = %format!("{e:#}"), "Skipping sample");
                rejected += 1;
            }
        }
    }

    Ok((accepted, rejected))
}

// Stopping does not flush, so give the loop up to two periods to pick up the tail.
async fn wait_for_drain(output: &Output) {
    let deadline = tokio::time::Instant::now() + output.config().flush_period * 2;
    let buffer = output.buffer();
    while !buffer.is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
    if !buffer.is_empty() {
        tracing::warn!(pending = buffer.len(), "Samples left unsent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_cli_parse() {
        let cli = assert_ok!(Cli::try_parse_from(["dtwriter"]));
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_run_command() {
        let cli = assert_ok!(Cli::try_parse_from([
            "dtwriter",
            "--out",
            "url=https://h/api,flushPeriod=2s",
            "run",
            "--input",
            "samples.ndjson",
        ]));
        assert_eq!(cli.out, "url=https://h/api,flushPeriod=2s");
        match cli.command {
            Some(Commands::Run { input }) => {
                assert_eq!(input, Some(PathBuf::from("samples.ndjson")));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_config_command() {
        let cli = assert_ok!(Cli::try_parse_from(["dtwriter", "-c", "dt.json", "config"]));
        assert_eq!(cli.config, Some(PathBuf::from("dt.json")));
        assert!(matches!(cli.command, Some(Commands::Config)));
    }

    #[test]
    fn test_parse_sample() {
        let sample = assert_ok!(parse_sample(
            r#"{"name":"vus","value":3,"tags":{"scenario":"default"}}"#
        ))
        .unwrap();
        assert_eq!(sample.name, "vus");
        assert!((sample.value - 3.0).abs() < f64::EPSILON);

        assert!(assert_ok!(parse_sample("   ")).is_none());
        assert_err!(parse_sample("not json"));
        let err = assert_err!(parse_sample(r#"{"name":"","value":1}"#));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_describe_config_redacts_token() {
        let config = Config::resolve(
            Some(r#"{"url":"https://h/api","apitoken":"secret"}"#),
            &HashMap::new(),
            "",
        )
        .unwrap();

        let described = assert_ok!(describe_config(&config));

        assert_eq!(described["apitoken"], REDACTED);
        assert_eq!(described["requestUrl"], "https://h/api");
        assert_eq!(described["flushPeriod"], "10s");
        assert!(!described.to_string().contains("secret"));
    }

    #[test]
    fn test_describe_config_requires_url() {
        let config = Config::default();
        assert_err!(describe_config(&config));
    }

    #[test]
    fn test_read_json_config_missing_file() {
        assert!(assert_ok!(read_json_config(None)).is_none());
        let err = assert_err!(read_json_config(Some(Path::new("/nonexistent/dt.json"))));
        assert!(err.to_string().contains("dt.json"));
    }
}
