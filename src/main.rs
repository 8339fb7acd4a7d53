//! openvox-certctl - certificate lifecycle CLI for OpenVox/Puppet nodes

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

use openvox_certctl::cli::Cli;
use openvox_certctl::commands::{self, ERROR_EXIT_CODE};
use openvox_certctl::config::{self, AppConfig, LogFormat};
use openvox_certctl::utils::ErrorResponse;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            if cli.json {
                let body = match err.downcast_ref::<openvox_certctl::AppError>() {
                    Some(app_err) => ErrorResponse::from(app_err),
                    None => ErrorResponse::new("error", format!("{:#}", err)),
                };
                println!(
                    "{}",
                    serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.message.clone())
                );
            } else {
                eprintln!("Error: {:#}", err);
            }
            ExitCode::from(ERROR_EXIT_CODE as u8)
        }
    }
}

async fn run(cli: &Cli) -> Result<i32> {
    // Load configuration first (before logging, so we know log format)
    let mut config =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_verbosity(&mut config, cli.verbose);

    // The guard must be kept alive for the duration of the program
    let _guard = init_logging(&config, cli.verbose);
    debug!(
        "Using CA at {} and SSL directory {}",
        config.ca_server.base_url(),
        config.ssl.effective_ssl_dir().display()
    );

    let output = match commands::run(cli, &config).await {
        Ok(output) => output,
        Err(e) => {
            debug!("Command failed: {:?}", e);
            return Err(e.into());
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output.json)?);
    } else {
        println!("{}", output.text);
    }
    Ok(output.status.code())
}

/// `-v` raises the configured level to debug, `-vv` to trace
fn apply_verbosity(config: &mut AppConfig, verbose: u8) {
    match verbose {
        0 => {}
        1 => config.logging.level = "debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }
}

/// Level filter for the subscriber
///
/// An explicit `-v` wins over `RUST_LOG`.
fn log_filter(level: &str, verbose: u8) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    if verbose > 0 {
        return EnvFilter::new(level);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the logging/tracing infrastructure
///
/// Console output goes to stderr; stdout carries command results.
fn init_logging(
    config: &AppConfig,
    verbose: u8,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use config::LogTarget;
    use tracing_subscriber::prelude::*;

    let env_filter = log_filter(&config.logging.level, verbose);

    let log_config = &config.logging;

    match &log_config.target {
        LogTarget::Console => {
            let subscriber = tracing_subscriber::registry().with(env_filter);
            init_console_logging(subscriber, &log_config.format);
            None
        }
        LogTarget::File => {
            let (writer, guard) = create_file_writer(log_config);
            let subscriber = tracing_subscriber::registry().with(env_filter);
            init_file_logging(subscriber, &log_config.format, writer);
            Some(guard)
        }
        LogTarget::Both => {
            let (writer, guard) = create_file_writer(log_config);
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer(&log_config.format));
            init_file_logging(subscriber, &log_config.format, writer);
            Some(guard)
        }
    }
}

/// Create a file writer with optional daily rotation
fn create_file_writer(
    log_config: &config::LoggingConfig,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    if let Err(e) = std::fs::create_dir_all(&log_config.log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_config.log_dir, e
        );
    }

    let file_appender = if log_config.daily_rotation {
        tracing_appender::rolling::daily(&log_config.log_dir, &log_config.log_prefix)
    } else {
        tracing_appender::rolling::never(&log_config.log_dir, &log_config.log_prefix)
    };

    tracing_appender::non_blocking(file_appender)
}

/// Boxed stderr layer in the configured format
fn console_layer<S>(format: &LogFormat) -> Box<dyn tracing_subscriber::Layer<S> + Send + Sync>
where
    S: tracing::Subscriber
        + for<'a> tracing_subscriber::registry::LookupSpan<'a>
        + Send
        + Sync
        + 'static,
{
    use tracing_subscriber::{fmt, Layer};

    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
            .boxed(),
    }
}

/// Initialize console-only logging
fn init_console_logging<S>(subscriber: S, format: &LogFormat)
where
    S: tracing::Subscriber
        + for<'a> tracing_subscriber::registry::LookupSpan<'a>
        + Send
        + Sync
        + 'static,
{
    use tracing_subscriber::prelude::*;

    subscriber.with(console_layer(format)).init();
}

/// Add the file layer and install the subscriber
fn init_file_logging<S>(
    subscriber: S,
    format: &LogFormat,
    writer: tracing_appender::non_blocking::NonBlocking,
) where
    S: tracing::Subscriber
        + for<'a> tracing_subscriber::registry::LookupSpan<'a>
        + Send
        + Sync
        + 'static,
{
    use tracing_subscriber::{fmt, prelude::*};

    match format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_target(true).with_writer(writer))
                .init();
        }
        LogFormat::Compact => {
            subscriber
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
        }
        LogFormat::Pretty => {
            subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
        }
    }
}
