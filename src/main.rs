//! SMTP intake server binary.
//!
//! Loads configuration, installs logging and metrics, opens the configured
//! storage and serves until Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use smtp_intake::config::{self, validation::validate_config, ConfigError, ServerConfig};
use smtp_intake::lifecycle::{signals, Shutdown};
use smtp_intake::observability::{logging, metrics};
use smtp_intake::server::{ServerError, SmtpServer};
use smtp_intake::storage::open_sink;

#[derive(Parser)]
#[command(name = "smtp-intake")]
#[command(about = "Receive mail over SMTP and store it", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,

    /// Override `smtp.domain`.
    #[arg(long)]
    domain: Option<String>,
}

fn resolve_config(cli: &Cli) -> Result<ServerConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => ServerConfig::default(),
    };

    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(domain) = &cli.domain {
        config.smtp.domain = domain.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("smtp-intake: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.observability) {
        eprintln!("smtp-intake: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        domain = %config.smtp.domain,
        max_message_size = config.smtp.max_message_size,
        delivery = ?config.delivery.mode,
        storage = ?config.storage.backend,
        "smtp-intake starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let sink = match open_sink(&config.storage).await {
        Ok(sink) => sink,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open message storage");
            return ExitCode::FAILURE;
        }
    };

    let server = match SmtpServer::bind(config, sink).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start server");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let mut server_task = tokio::spawn(server.run(shutdown.subscribe()));

    let outcome = tokio::select! {
        signal = signals::wait_for_signal() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "Failed to listen for signals; shutting down");
            }
            shutdown.trigger();
            server_task.await
        }
        outcome = &mut server_task => {
            shutdown.trigger();
            outcome
        }
    };

    match outcome {
        Ok(Ok(())) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Ok(Err(ServerError::ShutdownTimeout(after))) => {
            tracing::error!(after = ?after, "Graceful shutdown timed out");
            ExitCode::FAILURE
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Server stopped with error");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Server task failed");
            ExitCode::FAILURE
        }
    }
}
