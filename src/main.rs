// CLASSIFICATION: COMMUNITY
// Filename: main.rs v0.6
// Author: Lukas Bower
// Date Modified: 2026-07-31

//! ghostd entry point: resolve configuration, build the host, scan the
//! tape root, serve HTTP until a termination signal, then drain.

use clap::Parser;
use ghostd::config::{self, Cli};
use ghostd::host::Host;
use ghostd::http;
use log::{error, info, warn};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = match config::resolve(&cli) {
        Ok(config) => config,
        Err(err) => {
            error!("configuration error: {err}");
            std::process::exit(1);
        }
    };
    let bind = config.bind_addr();
    let drain = config.drain_deadline;

    let host = match Host::new(config) {
        Ok(host) => Arc::new(host),
        Err(err) => {
            error!("boot failed: {err}");
            std::process::exit(1);
        }
    };

    match host.scan_tapes() {
        Ok(report) => {
            info!(
                "discovered {} tape(s), {} failure(s)",
                report.discovered.len(),
                report.failures.len()
            );
            for failure in &report.failures {
                warn!(
                    "tape directory {} rejected: {} ({})",
                    failure.directory,
                    failure.kind.as_str(),
                    failure.message
                );
            }
        }
        Err(err) => {
            error!("tape root unavailable: {err}");
            std::process::exit(1);
        }
    }

    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("cannot bind {bind}: {err}");
            std::process::exit(1);
        }
    };
    info!("ghostd listening on http://{bind}");

    if let Err(err) = http::serve(host, listener, shutdown_signal(), drain).await {
        error!("server error: {err}");
        std::process::exit(1);
    }
    info!("ghostd drained and stopped");
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("termination signal received; draining");
}
