// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use clap::{builder::BoolishValueParser, ArgAction, Parser};
use std::{env, process, sync::Arc, time::Duration};
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use cwlog_writer::{
    http::{HttpClientConfig, LogsApiClient},
    LogWriter, WriterConfig, WriterError,
};

const READ_BUFFER_SIZE: usize = 8192;

/// A tee(1)-like command for piping output to CloudWatch Logs.
///
/// Reads line-oriented data from standard input and sends each line as a log
/// event. Batching, retry and flush settings are read from `CWLOG_*`
/// environment variables.
#[derive(Debug, Parser)]
#[command(name = "cwlog", version)]
struct Args {
    /// Log group where logs are sent
    #[arg(short = 'g', long, env = "CWLOG_LOG_GROUP")]
    log_group: String,

    /// Log stream where logs are sent
    #[arg(short = 's', long, env = "CWLOG_LOG_STREAM")]
    log_stream: String,

    /// Copy input to standard output
    #[arg(
        short = 't',
        long,
        env = "CWLOG_TEE",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    tee: bool,

    /// Base URL of the logs API
    #[arg(long, env = "CWLOG_ENDPOINT")]
    endpoint: String,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "CWLOG_TIMEOUT_MS", default_value_t = 10_000)]
    timeout_ms: u64,

    #[arg(long, env = "HTTPS_PROXY")]
    https_proxy: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CWLOG_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn writer_config(&self) -> Result<WriterConfig, WriterError> {
        WriterConfig::from_lookup(|key| match key {
            "CWLOG_LOG_GROUP" => Some(self.log_group.clone()),
            "CWLOG_LOG_STREAM" => Some(self.log_stream.clone()),
            _ => env::var(key).ok(),
        })
    }
}

#[tokio::main]
pub async fn main() {
    let args = Args::parse();

    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,{}",
        args.log_level.to_lowercase()
    );

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(false)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    if let Err(e) = run(args).await {
        error!("CWLOG | failed to write logs: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), WriterError> {
    let config = args.writer_config()?;

    let mut http_config = HttpClientConfig::new(args.endpoint);
    http_config.timeout = Duration::from_millis(args.timeout_ms);
    http_config.https_proxy = args.https_proxy;
    let client = LogsApiClient::new(http_config)?;

    info!(
        "CWLOG | Shipping standard input to {}/{}",
        config.log_group, config.log_stream
    );
    let writer = LogWriter::new(config, Arc::new(client))?;

    let mut tee = args.tee;
    let mut stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = match stdin.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                writer.abort(e);
                break;
            }
        };
        let chunk = &buf[..n];
        if let Err(e) = writer.write(chunk) {
            error!("CWLOG | {e}");
            break;
        }
        if tee {
            if let Err(e) = stdout.write_all(chunk).await {
                // Stop mirroring but keep shipping.
                error!("CWLOG | Failed to write to standard output: {e}");
                tee = false;
            }
        }
    }
    if tee {
        if let Err(e) = stdout.flush().await {
            error!("CWLOG | Failed to flush standard output: {e}");
        }
    }

    writer.close().await
}
