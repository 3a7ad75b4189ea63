use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};

use lib_common::core::{Dispatcher, DownstreamServer, UpstreamManager};
use lib_common::ingestors::{WsLiveConfig, WsLiveSource};
use lib_common::loggers::setup_logging;

mod relay_logic;
use relay_logic::{config, control};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = config::load_config().resolve()?;
    let log_path = setup_logging("server_relay", &settings.log_dir, &settings.log_level)
        .context("failed to initialise logging")?;
    log::info!("Logging to {}", log_path.display());

    let (shutdown_tx, _) = broadcast::channel(1);
    let dispatcher = Arc::new(Dispatcher::new());

    // Bind before anything else: a taken port is fatal.
    let server = DownstreamServer::bind(settings.listen_addr)
        .await
        .with_context(|| format!("cannot listen on {}", settings.listen_addr))?;

    let source = Arc::new(WsLiveSource::new(WsLiveConfig {
        bridge_url: settings.upstream_url.clone(),
        connect_timeout: settings.connect_timeout,
    }));
    let manager = UpstreamManager::with_interval(source, dispatcher.clone(), settings.reconnect_interval);

    if let Some(target) = &settings.target {
        if let Err(e) = manager.set_target(target) {
            log::warn!("Ignoring startup target: {}", e);
        }
    } else {
        log::info!("No target configured; waiting for a client to send setTarget.");
    }

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let control_handle = tokio::spawn(control::run(manager.clone(), control_rx, shutdown_tx.subscribe()));
    let mut server_handle = tokio::spawn(server.serve(dispatcher, control_tx, shutdown_tx.subscribe()));

    // Wait for shutdown signal
    let mut server_result = None;
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
        result = &mut server_handle => {
            log::error!("Downstream server stopped unexpectedly.");
            server_result = Some(result);
        }
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    let server_result = match server_result {
        Some(result) => result,
        None => server_handle.await,
    };
    let _ = control_handle.await;

    server_result.context("downstream server task panicked")??;
    log::info!("Shutdown complete.");
    Ok(())
}
