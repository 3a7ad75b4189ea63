//! # Downstream Server
//!
//! The WebSocket side of the relay. Every accepted socket is registered with
//! the [`Dispatcher`], gets a dedicated writer task draining its frame channel,
//! and is tracked until it closes.
//!
//! Routes:
//! - `/` and `/ws`: WebSocket upgrade; server → client frames are events,
//!   client → server frames are control messages.
//! - `/health`: plain `OK`.
//!
//! The only control message understood is
//! `{"type":"setTarget","target":"<id>"}`; it is forwarded as a
//! [`ControlCommand`] to whoever owns the connection supervisor.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use crate::core::dispatcher::Dispatcher;
use crate::core::registry::ClientId;

/// Default listen port of the relay.
pub const DEFAULT_PORT: u16 = 8080;

/// Commands display clients may send to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Switch the upstream subscription to another live room.
    SetTarget(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    SetTarget { target: String },
}

fn parse_control(text: &str) -> Option<ControlCommand> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::SetTarget { target }) => Some(ControlCommand::SetTarget(target)),
        Err(e) => {
            log::debug!("Ignoring client frame ({}): {}", e, text);
            None
        }
    }
}

/// Transport-level failures of the relay server.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listen socket could not be bound. Fatal.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The accept loop failed.
    #[error("relay server failed: {0}")]
    Serve(#[from] io::Error),
}

#[derive(Clone)]
struct RelayState {
    dispatcher: Arc<Dispatcher>,
    control_tx: mpsc::UnboundedSender<ControlCommand>,
    closing: broadcast::Sender<()>,
}

/// A bound, not yet serving, relay listener.
pub struct DownstreamServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl DownstreamServer {
    /// Binds the listen socket. Failure is returned as [`RelayError::Bind`].
    pub async fn bind(addr: SocketAddr) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(|source| RelayError::Bind { addr, source })?;
        Ok(Self { listener, local_addr })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `shutdown` fires, then closes every open
    /// socket.
    pub async fn serve(
        self,
        dispatcher: Arc<Dispatcher>,
        control_tx: mpsc::UnboundedSender<ControlCommand>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), RelayError> {
        let (closing, _) = broadcast::channel(1);
        let state = RelayState {
            dispatcher,
            control_tx,
            closing: closing.clone(),
        };

        let app = Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state);

        log::info!("Downstream server listening on ws://{}", self.local_addr);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                shutdown.recv().await.ok();
                log::info!("Downstream server shutting down.");
                let _ = closing.send(());
            })
            .await?;
        Ok(())
    }
}

/// Binds `addr` and serves until shutdown.
pub async fn start(
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    control_tx: mpsc::UnboundedSender<ControlCommand>,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), RelayError> {
    DownstreamServer::bind(addr).await?.serve(dispatcher, control_tx, shutdown).await
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn handle_socket(socket: WebSocket, state: RelayState) {
    let (id, mut frames) = state.dispatcher.add_client();
    let mut closing = state.closing.subscribe();
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });
    state.dispatcher.mark_open(id);

    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => on_client_text(&state, id, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::warn!("Client #{} read error: {}", id, e);
                    break;
                }
            },
            _ = closing.recv() => break,
        }
    }

    state.dispatcher.mark_closing(id);
    state.dispatcher.remove_client(id);
    let _ = writer.await;
}

fn on_client_text(state: &RelayState, id: ClientId, text: &str) {
    if let Some(command) = parse_control(text) {
        log::info!("Client #{} sent {:?}", id, command);
        if state.control_tx.send(command).is_err() {
            log::warn!("Control channel closed; dropping command from client #{}", id);
        }
    }
}
