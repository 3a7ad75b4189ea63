//! # Upstream Manager
//!
//! The connection supervisor of the relay. It owns the single upstream live
//! subscription, normalizes whatever the subscription emits and hands the
//! resulting events to the [`Dispatcher`].
//!
//! ## State machine
//!
//! ```text
//!  Idle --set_target--> Connecting --ok--> Connected
//!                          |                   |
//!                          | err        close / error
//!                          v                   v
//!                    ReconnectScheduled <------+
//!                          |
//!                          +--(interval)--> Connecting
//! ```
//!
//! - **Single-flight**: at most one connect attempt is in flight. A second
//!   request while one is pending only updates the stored target.
//! - **One pending timer**: re-arming the reconnect timer is idempotent, and a
//!   successful connect cancels it.
//! - **One live handle**: replacing the subscription tears the previous one
//!   down (listeners, transport, handle) before opening the next.
//!
//! Outcomes of superseded attempts are recognised by a generation counter and
//! ignored; a timer that lost a cancellation race is recognised by its epoch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::core::dispatcher::Dispatcher;
use crate::events::{normalize_chat, normalize_follow, normalize_gift, normalize_share, Event};
use crate::ingestors::{LiveHandle, LiveSignal, LiveSource, UpstreamError};
use crate::loggers::console::event_line;
use crate::utils::sanitize;

/// Fixed delay between a failure and the next connect attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(10_000);

/// Lifecycle of the upstream subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No target set yet, or shut down.
    Idle,
    /// A connect attempt is in flight.
    Connecting,
    /// The subscription is live.
    Connected,
    /// Waiting for the reconnect timer.
    ReconnectScheduled,
}

/// Errors returned to callers of [`UpstreamManager::set_target`]. Upstream
/// failures are never among them; those are retried internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// The identifier is empty once sanitized.
    #[error("target identifier is empty")]
    InvalidTarget,
}

/// Counters exposed for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Connect attempts started.
    pub attempts: u64,
    /// Reconnect timers armed.
    pub reconnects_scheduled: u64,
}

struct Subscription {
    handle: Arc<dyn LiveHandle>,
    listener: Option<JoinHandle<()>>,
    connector: Option<JoinHandle<()>>,
}

struct SupervisorState {
    target: Option<String>,
    state: ConnectionState,
    connecting: bool,
    subscription: Option<Subscription>,
    reconnect_timer: Option<JoinHandle<()>>,
    timer_epoch: u64,
    generation: u64,
    stats: SupervisorStats,
}

impl SupervisorState {
    fn new() -> Self {
        Self {
            target: None,
            state: ConnectionState::Idle,
            connecting: false,
            subscription: None,
            reconnect_timer: None,
            timer_epoch: 0,
            generation: 0,
            stats: SupervisorStats::default(),
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
            self.timer_epoch += 1;
            log::debug!("Pending reconnect cancelled");
        }
    }
}

/// # Upstream Manager
///
/// Cheap to clone; every clone drives the same supervisor.
#[derive(Clone)]
pub struct UpstreamManager {
    source: Arc<dyn LiveSource>,
    dispatcher: Arc<Dispatcher>,
    reconnect_interval: Duration,
    inner: Arc<Mutex<SupervisorState>>,
}

impl UpstreamManager {
    /// Creates an idle supervisor with the default reconnect interval.
    pub fn new(source: Arc<dyn LiveSource>, dispatcher: Arc<Dispatcher>) -> Self {
        Self::with_interval(source, dispatcher, DEFAULT_RECONNECT_INTERVAL)
    }

    /// Creates an idle supervisor with a custom reconnect interval.
    pub fn with_interval(source: Arc<dyn LiveSource>, dispatcher: Arc<Dispatcher>, reconnect_interval: Duration) -> Self {
        Self {
            source,
            dispatcher,
            reconnect_interval,
            inner: Arc::new(Mutex::new(SupervisorState::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SupervisorState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// The stored (sanitized) target identifier.
    pub fn target(&self) -> Option<String> {
        self.lock().target.clone()
    }

    /// Attempt and reconnect counters.
    pub fn stats(&self) -> SupervisorStats {
        self.lock().stats
    }

    /// The fixed reconnect delay.
    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    /// # Set Target
    ///
    /// Validates and sanitizes `identifier`, stores it and triggers
    /// [`connect`](Self::connect). Fails without any state change when the
    /// identifier is blank or sanitizes to nothing.
    pub fn set_target(&self, identifier: &str) -> Result<(), SupervisorError> {
        let target = sanitize(identifier);
        if target.is_empty() {
            log::warn!("Rejected empty target identifier");
            return Err(SupervisorError::InvalidTarget);
        }

        {
            let mut state = self.lock();
            log::info!("Target set to '{}'", target);
            state.target = Some(target);
        }

        self.connect();
        Ok(())
    }

    /// # Connect
    ///
    /// Starts a connect attempt for the stored target unless one is already in
    /// flight.
    ///
    /// ## Logic:
    /// 1.  Claim the in-flight flag and bump the generation.
    /// 2.  Tear down the previous subscription, best-effort.
    /// 3.  Open a new handle, spawn its signal listener and its connector.
    pub fn connect(&self) {
        // --- Phase 1: claim the attempt ---
        let (generation, target, previous) = {
            let mut state = self.lock();
            if state.connecting {
                log::info!("Connect already in flight, not starting another");
                return;
            }
            let Some(target) = state.target.clone() else {
                log::warn!("Connect requested without a target");
                return;
            };
            state.connecting = true;
            state.state = ConnectionState::Connecting;
            state.generation += 1;
            state.stats.attempts += 1;
            (state.generation, target, state.subscription.take())
        };

        // --- Phase 2: retire the previous subscription ---
        if let Some(previous) = previous {
            teardown(previous);
        }

        // --- Phase 3: open and wire the new one ---
        log::info!("Connecting to live room '{}' (attempt #{})", target, generation);
        let handle = self.source.open(&target);

        let listener = handle.take_signals().map(|mut signals| {
            let manager = self.clone();
            tokio::spawn(async move {
                while let Some(signal) = signals.recv().await {
                    manager.on_signal(generation, signal);
                }
            })
        });

        let connector = {
            let manager = self.clone();
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                let outcome = handle.connect().await;
                manager.on_connect_outcome(generation, outcome);
            })
        };

        let mut state = self.lock();
        let subscription = Subscription {
            handle,
            listener,
            connector: Some(connector),
        };
        if state.generation == generation {
            state.subscription = Some(subscription);
        } else {
            drop(state);
            teardown(subscription);
        }
    }

    fn on_connect_outcome(&self, generation: u64, outcome: Result<(), UpstreamError>) {
        let mut state = self.lock();
        if state.generation != generation {
            log::debug!("Ignoring outcome of superseded attempt #{}", generation);
            return;
        }
        state.connecting = false;

        match outcome {
            Ok(()) => {
                state.cancel_reconnect();
                state.state = ConnectionState::Connected;
                log::info!(
                    "Connected to live room '{}'",
                    state.target.as_deref().unwrap_or_default()
                );
            }
            Err(e) => {
                log::error!("Connect failed: {}", e);
                self.arm_reconnect(&mut state);
            }
        }
    }

    fn on_disconnect(&self, generation: u64, reason: &str) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        log::warn!("Upstream lost ({}).", reason);
        state.connecting = false;
        self.arm_reconnect(&mut state);
    }

    /// Schedules exactly one reconnect. A no-op while a timer is pending.
    fn arm_reconnect(&self, state: &mut SupervisorState) {
        state.state = ConnectionState::ReconnectScheduled;
        if state.reconnect_timer.is_some() {
            log::debug!("Reconnect already scheduled");
            return;
        }

        state.timer_epoch += 1;
        state.stats.reconnects_scheduled += 1;
        let epoch = state.timer_epoch;
        let interval = self.reconnect_interval;
        let manager = self.clone();
        log::info!("Reconnecting in {}ms", interval.as_millis());

        state.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            manager.fire_reconnect(epoch);
        }));
    }

    fn fire_reconnect(&self, epoch: u64) {
        {
            let mut state = self.lock();
            if state.timer_epoch != epoch || state.reconnect_timer.is_none() {
                return;
            }
            state.reconnect_timer = None;
        }
        log::info!("Reconnect timer fired");
        self.connect();
    }

    fn on_signal(&self, generation: u64, signal: LiveSignal) {
        match signal {
            LiveSignal::Chat(raw) => {
                if let Some(event) = normalize_chat(&raw) {
                    self.publish(event);
                }
            }
            LiveSignal::Gift(raw) => self.publish(normalize_gift(&raw)),
            LiveSignal::Follow(raw) => self.publish(normalize_follow(&raw)),
            LiveSignal::Share(raw) => self.publish(normalize_share(&raw)),
            LiveSignal::Connected(info) => {
                log::info!("Live room acknowledged: {}", room_summary(&info));
            }
            LiveSignal::RoomUser(info) => {
                if let Some(viewers) = info.get("viewerCount").and_then(Value::as_u64) {
                    log::info!("Viewers: {}", viewers);
                }
            }
            LiveSignal::Close => self.on_disconnect(generation, "stream closed"),
            LiveSignal::Error(reason) => self.on_disconnect(generation, &reason),
        }
    }

    fn publish(&self, event: Event) {
        log::info!("{}", event_line(&event));
        self.dispatcher.broadcast(&event);
    }

    /// Cancels the reconnect timer and tears the subscription down.
    pub fn shutdown(&self) {
        let previous = {
            let mut state = self.lock();
            state.cancel_reconnect();
            state.connecting = false;
            state.generation += 1;
            state.state = ConnectionState::Idle;
            state.subscription.take()
        };
        if let Some(previous) = previous {
            teardown(previous);
        }
        log::info!("Upstream manager stopped");
    }
}

fn room_summary(info: &Value) -> String {
    match info.get("roomId") {
        Some(Value::String(id)) => format!("room {}", id),
        Some(id @ Value::Number(_)) => format!("room {}", id),
        _ => "no room info".to_string(),
    }
}

/// Best-effort teardown: every step runs, failures are only logged.
fn teardown(subscription: Subscription) {
    let Subscription {
        handle,
        listener,
        connector,
    } = subscription;

    if let Err(e) = handle.remove_all_listeners() {
        log::warn!("Teardown: {}", e);
    }
    if let Some(listener) = listener {
        listener.abort();
    }
    if let Err(e) = handle.disconnect() {
        log::warn!("Teardown: {}", e);
    }
    if let Err(e) = handle.close() {
        log::warn!("Teardown: {}", e);
    }
    if let Some(connector) = connector {
        connector.abort();
    }
}
