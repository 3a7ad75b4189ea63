//! Shared fixtures for the end-to-end tests: an in-process stand-in for the
//! live event bridge and a surface that records what the presentation engine
//! renders.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;

use lib_common::presentation::{DisplayLine, GiftCard, Surface};

/// Polls `check` every 20 ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// # Fake Bridge
///
/// Accepts bridge sockets (`/live?target=<id>`), records the requested
/// targets, confirms each room with a `connected` frame and then forwards
/// whatever [`FakeBridge::emit`] publishes.
pub struct FakeBridge {
    addr: SocketAddr,
    targets: Arc<Mutex<Vec<String>>>,
    frames: broadcast::Sender<String>,
}

impl FakeBridge {
    pub async fn start() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let targets = Arc::new(Mutex::new(Vec::new()));
        let (frames, _) = broadcast::channel(64);

        let accept_targets = Arc::clone(&targets);
        let accept_frames = frames.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let targets = Arc::clone(&accept_targets);
                let mut rx = accept_frames.subscribe();
                tokio::spawn(async move {
                    let record = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        let target = req
                            .uri()
                            .query()
                            .and_then(|q| {
                                url::form_urlencoded::parse(q.as_bytes())
                                    .find(|(key, _)| key == "target")
                                    .map(|(_, value)| value.into_owned())
                            })
                            .unwrap_or_default();
                        targets.lock().unwrap().push(target);
                        Ok(resp)
                    };
                    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, record).await else {
                        return;
                    };
                    let hello = json!({"event": "connected", "data": {"roomId": "7"}}).to_string();
                    if ws.send(Message::text(hello)).await.is_err() {
                        return;
                    }
                    loop {
                        tokio::select! {
                            frame = rx.recv() => match frame {
                                Ok(frame) => {
                                    if ws.send(Message::text(frame)).await.is_err() {
                                        break;
                                    }
                                }
                                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                                Err(broadcast::error::RecvError::Closed) => break,
                            },
                            incoming = ws.next() => match incoming {
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                        }
                    }
                });
            }
        });

        Ok(Self { addr, targets, frames })
    }

    /// Base URL to configure a `WsLiveSource` with.
    pub fn url(&self) -> String {
        format!("ws://{}/live", self.addr)
    }

    /// Targets requested so far, in connection order.
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }

    /// Sends `{"event": event, "data": data}` to every open bridge socket.
    pub fn emit(&self, event: &str, data: Value) {
        let _ = self.frames.send(json!({"event": event, "data": data}).to_string());
    }
}

/// One rendering call, as seen by a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    ShowLine(DisplayLine),
    RemoveLine(u64),
    ShowGift(GiftCard),
    FadeGift(u64),
    RemoveGift(u64),
}

/// Records every surface call.
#[derive(Default)]
pub struct RecordingSurface {
    calls: Mutex<Vec<SurfaceCall>>,
}

impl RecordingSurface {
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Lines currently on screen, oldest first.
    pub fn visible_lines(&self) -> Vec<DisplayLine> {
        let mut visible: Vec<DisplayLine> = Vec::new();
        for call in self.calls() {
            match call {
                SurfaceCall::ShowLine(line) => visible.push(line),
                SurfaceCall::RemoveLine(id) => visible.retain(|line| line.id != id),
                _ => {}
            }
        }
        visible
    }

    fn record(&self, call: SurfaceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Surface for RecordingSurface {
    fn show_line(&self, line: &DisplayLine) {
        self.record(SurfaceCall::ShowLine(line.clone()));
    }
    fn remove_line(&self, id: u64) {
        self.record(SurfaceCall::RemoveLine(id));
    }
    fn show_gift(&self, card: &GiftCard) {
        self.record(SurfaceCall::ShowGift(card.clone()));
    }
    fn fade_gift(&self, id: u64) {
        self.record(SurfaceCall::FadeGift(id));
    }
    fn remove_gift(&self, id: u64) {
        self.record(SurfaceCall::RemoveGift(id));
    }
}
