//! # Live WSS Ingestor
//!
//! [`LiveSource`] implementation that attaches to a WebSocket event bridge.
//! The bridge is a sidecar process wrapping the live-platform client library;
//! it accepts one socket per live room (`?target=<id>`) and forwards every
//! library event as a JSON text frame:
//!
//! ```json
//! {"event":"chat","data":{"nickname":"Bob","comment":"hi"}}
//! ```
//!
//! The first frame decides the connect outcome: `connected` (or any regular
//! event) resolves `connect()` successfully, `error` fails it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{LiveHandle, LiveSignal, LiveSource, UpstreamError};

type BridgeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default wait for the bridge to confirm a room subscription.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for the event-bridge connection.
#[derive(Debug, Clone)]
pub struct WsLiveConfig {
    /// Base URL of the bridge, e.g. `ws://127.0.0.1:21213/live`.
    pub bridge_url: String,
    /// How long to wait for the bridge to confirm the room subscription.
    pub connect_timeout: Duration,
}

impl Default for WsLiveConfig {
    fn default() -> Self {
        Self {
            bridge_url: "ws://127.0.0.1:21213/live".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Source of [`WsLiveHandle`]s sharing one bridge configuration.
#[derive(Debug, Clone, Default)]
pub struct WsLiveSource {
    config: WsLiveConfig,
}

impl WsLiveSource {
    /// Creates a new source for the given bridge.
    pub fn new(config: WsLiveConfig) -> Self {
        Self { config }
    }
}

impl LiveSource for WsLiveSource {
    fn open(&self, target: &str) -> Arc<dyn LiveHandle> {
        Arc::new(WsLiveHandle::new(&self.config, target))
    }
}

#[derive(Debug, Deserialize)]
struct BridgeFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Maps a bridge event name to a signal. Unknown names are ignored.
fn signal_from_frame(frame: BridgeFrame) -> Option<LiveSignal> {
    let signal = match frame.event.as_str() {
        "connected" => LiveSignal::Connected(frame.data),
        "chat" => LiveSignal::Chat(frame.data),
        "gift" => LiveSignal::Gift(frame.data),
        "follow" => LiveSignal::Follow(frame.data),
        "share" => LiveSignal::Share(frame.data),
        "roomUser" => LiveSignal::RoomUser(frame.data),
        "streamEnd" | "disconnected" => LiveSignal::Close,
        "error" => LiveSignal::Error(
            frame
                .data
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| frame.data.to_string()),
        ),
        other => {
            log::trace!("Ignoring bridge event `{}`", other);
            return None;
        }
    };
    Some(signal)
}

fn parse_frame(text: &str) -> Option<LiveSignal> {
    match serde_json::from_str::<BridgeFrame>(text) {
        Ok(frame) => signal_from_frame(frame),
        Err(e) => {
            log::warn!("Malformed bridge frame ({}): {}", e, text);
            None
        }
    }
}

/// One bridge socket for one live room.
pub struct WsLiveHandle {
    target: String,
    endpoint: Result<String, String>,
    connect_timeout: Duration,
    tx: Mutex<Option<mpsc::UnboundedSender<LiveSignal>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<LiveSignal>>>,
    listening: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl WsLiveHandle {
    fn new(config: &WsLiveConfig, target: &str) -> Self {
        let endpoint = Url::parse(&config.bridge_url)
            .map(|mut url| {
                url.query_pairs_mut().append_pair("target", target);
                url.to_string()
            })
            .map_err(|e| format!("invalid bridge url `{}`: {}", config.bridge_url, e));
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            target: target.to_string(),
            endpoint,
            connect_timeout: config.connect_timeout,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            listening: Arc::new(AtomicBool::new(true)),
            reader: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn connect_error(&self, reason: impl Into<String>) -> UpstreamError {
        UpstreamError::Connect {
            target: self.target.clone(),
            reason: reason.into(),
        }
    }

    /// Waits for the first meaningful frame to learn whether the bridge
    /// actually joined the room.
    async fn await_confirmation(&self, stream: &mut BridgeStream) -> Result<Option<LiveSignal>, UpstreamError> {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => match parse_frame(text.as_str()) {
                    Some(LiveSignal::Error(reason)) => return Err(self.connect_error(reason)),
                    Some(LiveSignal::Close) => return Err(self.connect_error("stream ended before start")),
                    Some(signal) => return Ok(Some(signal)),
                    None => continue,
                },
                Some(Ok(Message::Close(_))) | None => {
                    return Err(self.connect_error("bridge closed the socket"));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(self.connect_error(e.to_string())),
            }
        }
    }
}

/// Pumps bridge frames into the signal channel until the socket ends.
async fn read_loop(
    mut stream: BridgeStream,
    tx: mpsc::UnboundedSender<LiveSignal>,
    listening: Arc<AtomicBool>,
) {
    let forward = |signal: LiveSignal| {
        if listening.load(Ordering::Acquire) {
            let _ = tx.send(signal);
        }
    };

    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Some(signal) = parse_frame(text.as_str()) {
                    forward(signal);
                }
            }
            Some(Ok(Message::Close(frame))) => {
                log::info!("Bridge closed the socket: {:?}", frame);
                forward(LiveSignal::Close);
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                log::error!("Bridge read error: {}", e);
                forward(LiveSignal::Error(e.to_string()));
                break;
            }
            None => {
                log::warn!("Bridge stream ended.");
                forward(LiveSignal::Close);
                break;
            }
        }
    }
}

#[async_trait]
impl LiveHandle for WsLiveHandle {
    async fn connect(&self) -> Result<(), UpstreamError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(UpstreamError::Closed);
        }
        let endpoint = self.endpoint.as_ref().map_err(|e| self.connect_error(e.clone()))?;

        log::info!("Connecting to event bridge: {}", endpoint);
        let (mut stream, _) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| self.connect_error(e.to_string()))?;

        let first = tokio::time::timeout(self.connect_timeout, self.await_confirmation(&mut stream))
            .await
            .map_err(|_| self.connect_error("timed out waiting for the room to start"))??;

        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(UpstreamError::Closed)?;

        if let Some(signal) = first {
            if self.listening.load(Ordering::Acquire) {
                let _ = tx.send(signal);
            }
        }

        let task = tokio::spawn(read_loop(stream, tx, self.listening.clone()));
        if let Some(previous) = self.reader.lock().unwrap_or_else(PoisonError::into_inner).replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn take_signals(&self) -> Option<mpsc::UnboundedReceiver<LiveSignal>> {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn remove_all_listeners(&self) -> Result<(), UpstreamError> {
        self.listening.store(false, Ordering::Release);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), UpstreamError> {
        if let Some(task) = self.reader.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        Ok(())
    }

    fn close(&self) -> Result<(), UpstreamError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(UpstreamError::Closed);
        }
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}
