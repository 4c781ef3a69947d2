use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use uptee::cli::DaemonOpts;
use uptee::config::RelayConfig;
use uptee::logger::{NoopLogger, TextLogger, UploadLogger};
use uptee::{Webhook, WritePathResolver};

fn main() -> ExitCode {
    let opts = DaemonOpts::parse();

    // Validate everything before any listener exists
    let config = match RelayConfig::from_opts(&opts) {
        Ok(config) => config,
        Err(e) => {
            let prog = std::env::args().next().unwrap_or_else(|| "upteed".to_string());
            eprintln!("{}: {}", prog, e);
            eprintln!("{}: Try --help for usage details.", prog);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(opts.verbose);

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "uptee=info",
        1 => "uptee=debug",
        _ => "uptee=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn run(config: RelayConfig) -> Result<()> {
    tracing::info!("Starting uptee daemon v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("  Root: {}", config.root.display());
    tracing::info!("  Bind: {}", config.bind_addr());
    match &config.webhook {
        Some(url) => tracing::info!("  Webhook: {}", url),
        None => tracing::info!("  Webhook: disabled"),
    }
    tracing::info!(
        "  Passive ports: {}-{} (reserved for FTP engines)",
        config.passive_ports.start(),
        config.passive_ports.end()
    );

    let logger: Arc<dyn UploadLogger> = match &config.log_file {
        Some(path) => Arc::new(
            TextLogger::new(path)
                .with_context(|| format!("open upload log {}", path.display()))?,
        ),
        None => Arc::new(NoopLogger),
    };
    let webhook = Webhook::new(config.webhook.clone(), config.webhook_timeout)
        .context("build webhook client")?;
    let resolver = WritePathResolver::new(config.root.clone(), webhook, logger);

    // Single-threaded event loop: every upload is a task on this one thread
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let bind = config.bind_addr();
    rt.block_on(async {
        tokio::select! {
            res = uptee::server::serve(&bind, resolver, config.idle_timeout) => res,
            _ = shutdown_signal() => {
                tracing::info!("Server shutdown complete");
                Ok(())
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
