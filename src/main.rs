// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use dnsync::{config::Args, controller::Controller, metrics};
use kube::Client;
use tokio::sync::watch;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("dnsync")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

fn init_tracing() {
    // Respects RUST_LOG environment variable if set, otherwise defaults to INFO level
    // Example: RUST_LOG=dnsync=debug dnsync --source service
    //
    // Respects RUST_LOG_FORMAT environment variable for output format
    // Example: RUST_LOG_FORMAT=json dnsync --source service
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

/// Resolves on SIGTERM or Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

async fn async_main(args: Args) -> Result<()> {
    init_tracing();
    info!("Starting dnsync {}", env!("CARGO_PKG_VERSION"));
    debug!("Configuration: {args:?}");

    let client = if args.needs_kubernetes() {
        debug!("Initializing Kubernetes client");
        Some(Client::try_default().await?)
    } else {
        None
    };

    let source = args.build_source(client.as_ref()).await?;
    let provider = args.build_provider().await?;
    let controller = Controller::new(source, provider, args.to_controller_config());

    if args.once {
        let changes = controller.run_once().await?;
        info!(
            "Single sync finished: {} creates, {} updates, {} deletes",
            changes.create.len(),
            changes.update_new.len(),
            changes.delete.len()
        );
        return Ok(());
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let metrics_server = tokio::spawn({
        let mut stop_rx = stop_rx.clone();
        let addr = args.metrics_address;
        async move {
            let shutdown = async move {
                let _ = stop_rx.changed().await;
            };
            if let Err(e) = metrics::serve(addr, shutdown).await {
                error!("Metrics server failed: {e}");
            }
        }
    });

    controller
        .run(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(true);
        })
        .await;

    drop(stop_rx);
    if let Err(e) = metrics_server.await {
        error!("Metrics server task panicked: {e}");
    }
    info!("dnsync stopped");
    Ok(())
}
