use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use lib_common::loggers::setup_logging;
use lib_common::presentation::PresentationEngine;

mod overlay_logic;
use overlay_logic::config;
use overlay_logic::terminal::TerminalSurface;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config();
    setup_logging("overlay_client", &config.log_dir(), config.log_level()).context("failed to initialise logging")?;

    let url = config.server_url().to_string();
    let (socket, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("cannot connect to relay at {}", url))?;
    log::info!("Connected to relay at {}", url);
    let (mut write, mut read) = socket.split();

    if let Some(target) = config.target.as_deref().filter(|t| !t.trim().is_empty()) {
        let frame = json!({"type": "setTarget", "target": target.trim()}).to_string();
        write.send(Message::text(frame)).await.context("failed to send setTarget")?;
        log::info!("Asked relay to follow '{}'", target.trim());
    }

    let engine = PresentationEngine::new(Arc::new(TerminalSurface));

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                log::info!("Ctrl-C received, closing overlay.");
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    engine.handle_message(text.as_str());
                }
                Some(Ok(Message::Close(_))) | None => {
                    log::warn!("Relay closed the connection.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::error!("WebSocket error: {}", e);
                    break;
                }
            }
        }
    }

    Ok(())
}
