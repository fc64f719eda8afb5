//! Herald Runner - execute signed webhook requests.
//!
//! This binary loads the configuration, sets up logging and serves the
//! webhook endpoint until SIGINT or SIGTERM.

use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use herald_runner::{
    config::{Cli, Config},
    create_router,
    error::ConfigError,
    CommandExecutor, RouterConfig, Server, SignatureAuth, WebhookPipeline,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    if let Err(e) = init_logging(&config, cli.verbose) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    run(config).await
}

async fn run(config: Config) -> ExitCode {
    info!("{}", "=".repeat(80));
    info!("Initialize...");

    info!("Configuration:");
    info!("  Work dir: {}", config.work_dir.display());
    info!("  Listen: {}", config.bind_target());
    info!("  Max body size: {} bytes", config.max_body_size);
    match config.executor_timeout_secs {
        Some(secs) => info!("  Executor timeout: {}s", secs),
        None => info!("  Executor timeout: none"),
    }

    let executor = CommandExecutor::new(&config.work_dir);
    let pipeline = WebhookPipeline::new(SignatureAuth::new(&config.secret), executor)
        .with_executor_timeout(config.executor_timeout_secs.map(Duration::from_secs));
    let router = create_router(pipeline, RouterConfig::from(&config));
    let server = Server::new(config.bind_target(), router);

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    info!("Start...");

    let exit_code = match server.run(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    };

    info!("Exiting...");
    info!("{}", "-".repeat(80));

    exit_code
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_sigint = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT, shutdown...");
                shutdown_sigint.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, shutdown...");
                    shutdown.cancel();
                }
                Err(e) => {
                    error!(error = %e, "Failed to listen for SIGTERM");
                }
            }
        });
    }
}

/// Initialize the tracing/logging subsystem.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(config: &Config, verbose: bool) -> Result<(), ConfigError> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config.tracing_level()
    };
    let level = level.as_str().to_lowercase();
    let env_filter = format!("herald_runner={level},tower_http={level}");

    let writer = match config.log_output {
        Some(ref path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|source| ConfigError::LogOutput {
                    path: path.clone(),
                    source,
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| ConfigError::LogOutput {
                    path: path.clone(),
                    source,
                })?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(ChronoLocal::new(config.time_format().to_string()))
                .with_ansi(config.log_output.is_none())
                .with_writer(writer),
        )
        .init();

    Ok(())
}
