use lib_common::core::{ControlCommand, UpstreamManager};
use tokio::sync::{broadcast, mpsc};

/// Applies control commands from display clients to the supervisor until
/// shutdown, then tears the upstream subscription down.
pub async fn run(
    manager: UpstreamManager,
    mut control_rx: mpsc::UnboundedReceiver<ControlCommand>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            command = control_rx.recv() => match command {
                Some(ControlCommand::SetTarget(target)) => {
                    if let Err(e) = manager.set_target(&target) {
                        log::warn!("Rejected setTarget from client: {}", e);
                    }
                }
                None => {
                    log::info!("Control channel closed.");
                    break;
                }
            },
            _ = shutdown.recv() => {
                log::info!("Control loop shutting down.");
                break;
            }
        }
    }
    manager.shutdown();
}
