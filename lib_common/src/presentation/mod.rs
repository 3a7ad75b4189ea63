//! # Presentation Queue Engine
//!
//! Runs on each display client. Bursty event arrivals are turned into a
//! readable, time-paced sequence on a [`Surface`]:
//!
//! - **chat queue**: one line every 300 ms; follow and share lines skip the
//!   pacing. The surface keeps the 4 most recent lines.
//! - **gift queue**: one gift at a time in a mutual-exclusion slot, shown for
//!   5000 ms, faded, removed 500 ms later.
//!
//! Both queues are unbounded and strict FIFO. Nothing orders one queue
//! against the other.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::events::{Event, Role};

/// The paced chat/follow/share queue.
pub mod chat_queue;
/// The one-at-a-time gift queue.
pub mod gift_queue;

pub use chat_queue::ChatQueue;
pub use gift_queue::GiftQueue;

/// What a visible line represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// A chat comment by an author with the given role.
    Chat {
        /// Role of the author.
        role: Role,
    },
    /// A follow notice.
    Follow,
    /// A share notice.
    Share,
}

/// One line on the chat surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    /// Surface-unique id, used for removal.
    pub id: u64,
    /// Line kind.
    pub kind: LineKind,
    /// Author.
    pub user: String,
    /// Body; empty for follow and share notices.
    pub text: String,
}

/// Lifecycle of a gift card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiftState {
    /// Queued.
    Pending,
    /// Occupying the slot.
    Active,
    /// Fading out, still occupying the slot.
    Fading,
    /// Gone; the slot is free.
    Removed,
}

/// A gift as shown in the showcase slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiftCard {
    /// Surface-unique id.
    pub id: u64,
    /// Sender.
    pub user: String,
    /// Gift name.
    pub gift_name: String,
    /// Repeat count.
    pub amount: u32,
    /// Current lifecycle state.
    pub state: GiftState,
}

/// An event waiting in one of the queues.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationItem {
    /// The sanitized event.
    pub payload: Event,
    /// When it was queued.
    pub enqueued_at: Instant,
}

impl PresentationItem {
    /// Wraps `payload`, stamped now.
    pub fn new(payload: Event) -> Self {
        Self {
            payload,
            enqueued_at: Instant::now(),
        }
    }
}

/// Timing constants of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationTimings {
    /// Delay after each rendered chat line.
    pub chat_pacing: Duration,
    /// How long a gift stays fully visible.
    pub gift_display: Duration,
    /// Delay between fading and removing a gift.
    pub gift_removal: Duration,
    /// Upper bound on one wait for the gift slot.
    pub gift_poll: Duration,
    /// Lines kept on the chat surface.
    pub chat_retention: usize,
}

impl Default for PresentationTimings {
    fn default() -> Self {
        Self {
            chat_pacing: Duration::from_millis(300),
            gift_display: Duration::from_millis(5000),
            gift_removal: Duration::from_millis(500),
            gift_poll: Duration::from_millis(300),
            chat_retention: 4,
        }
    }
}

/// # Surface
///
/// Where the engine renders. Implementations must be cheap and non-blocking;
/// they are called from the queue tasks.
pub trait Surface: Send + Sync {
    /// Adds a line at the bottom of the chat area.
    fn show_line(&self, line: &DisplayLine);
    /// Removes a previously shown line.
    fn remove_line(&self, id: u64);
    /// Shows a gift in the showcase slot.
    fn show_gift(&self, card: &GiftCard);
    /// Starts fading the showcased gift out.
    fn fade_gift(&self, id: u64);
    /// Removes the showcased gift.
    fn remove_gift(&self, id: u64);
}

/// # Presentation Engine
///
/// Routes incoming events to the right queue.
pub struct PresentationEngine {
    chat: ChatQueue,
    gifts: GiftQueue,
}

impl PresentationEngine {
    /// Creates an engine with the default timings.
    pub fn new(surface: Arc<dyn Surface>) -> Self {
        Self::with_timings(surface, PresentationTimings::default())
    }

    /// Creates an engine with custom timings.
    pub fn with_timings(surface: Arc<dyn Surface>, timings: PresentationTimings) -> Self {
        Self {
            chat: ChatQueue::new(Arc::clone(&surface), timings),
            gifts: GiftQueue::new(surface, timings),
        }
    }

    /// Sanitizes the event's display fields again and queues it: chats are
    /// paced, follows and shares shown at once, gifts go to the showcase.
    pub fn dispatch(&self, event: Event) {
        let event = event.sanitized();
        match event {
            Event::Chat { .. } => self.chat.enqueue(PresentationItem::new(event)),
            Event::Follow { .. } | Event::Share { .. } => self.chat.show_immediate(PresentationItem::new(event)),
            Event::Gift { .. } => self.gifts.enqueue(PresentationItem::new(event)),
        }
    }

    /// Parses one text frame from the relay and dispatches it. Malformed
    /// frames are logged and ignored; returns whether the frame was accepted.
    pub fn handle_message(&self, text: &str) -> bool {
        match Event::from_json(text) {
            Ok(event) => {
                self.dispatch(event);
                true
            }
            Err(e) => {
                log::warn!("Ignoring malformed frame ({}): {}", e, text);
                false
            }
        }
    }

    /// The chat queue.
    pub fn chat(&self) -> &ChatQueue {
        &self.chat
    }

    /// The gift queue.
    pub fn gifts(&self) -> &GiftQueue {
        &self.gifts
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use tokio::time::Instant;

    use super::{DisplayLine, GiftCard, Surface};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        ShowLine(DisplayLine),
        RemoveLine(u64),
        ShowGift(GiftCard),
        FadeGift(u64),
        RemoveGift(u64),
    }

    /// Records every surface call with its (virtual) timestamp.
    pub struct RecordingSurface {
        start: Instant,
        calls: Mutex<Vec<(u64, Call)>>,
    }

    impl RecordingSurface {
        pub fn new() -> Self {
            Self {
                start: Instant::now(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: Call) {
            let at = self.start.elapsed().as_millis() as u64;
            self.calls.lock().unwrap().push((at, call));
        }

        pub fn calls(&self) -> Vec<(u64, Call)> {
            self.calls.lock().unwrap().clone()
        }

        /// Users of currently visible lines, oldest first.
        pub fn visible_users(&self) -> Vec<String> {
            let mut visible: Vec<DisplayLine> = Vec::new();
            for (_, call) in self.calls() {
                match call {
                    Call::ShowLine(line) => visible.push(line),
                    Call::RemoveLine(id) => visible.retain(|line| line.id != id),
                    _ => {}
                }
            }
            visible.into_iter().map(|line| line.user).collect()
        }
    }

    impl Surface for RecordingSurface {
        fn show_line(&self, line: &DisplayLine) {
            self.record(Call::ShowLine(line.clone()));
        }
        fn remove_line(&self, id: u64) {
            self.record(Call::RemoveLine(id));
        }
        fn show_gift(&self, card: &GiftCard) {
            self.record(Call::ShowGift(card.clone()));
        }
        fn fade_gift(&self, id: u64) {
            self.record(Call::FadeGift(id));
        }
        fn remove_gift(&self, id: u64) {
            self.record(Call::RemoveGift(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Call, RecordingSurface};
    use super::*;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_message_routes_and_sanitizes() {
        let surface = Arc::new(RecordingSurface::new());
        let engine = PresentationEngine::new(surface.clone());

        assert!(engine.handle_message(r#"{"type":"chat","user":"Bob","comment":"hi&amp;bye","role":"mod"}"#));
        assert!(engine.handle_message(r#"{"type":"gift","user":"Ann","gift":"Rose","amount":0}"#));
        assert!(!engine.handle_message(r#"{"type":"status"}"#));
        assert!(!engine.handle_message("{"));
        settle().await;

        let calls = surface.calls();
        assert!(calls.iter().any(|(_, call)| matches!(call,
            Call::ShowLine(DisplayLine { kind: LineKind::Chat { role: Role::Moderator }, text, .. }) if text == "hi&bye")));
        assert!(calls.iter().any(|(_, call)| matches!(call,
            Call::ShowGift(GiftCard { amount: 1, state: GiftState::Active, .. }))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_skips_chat_pacing() {
        let surface = Arc::new(RecordingSurface::new());
        let engine = PresentationEngine::new(surface.clone());

        for user in ["a", "b", "c"] {
            engine.dispatch(Event::Chat {
                user: user.into(),
                text: "x".into(),
                role: Role::User,
            });
        }
        engine.dispatch(Event::Follow { user: "carol".into() });
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let shown: Vec<(u64, String)> = surface
            .calls()
            .into_iter()
            .filter_map(|(at, call)| match call {
                Call::ShowLine(line) => Some((at, line.user)),
                _ => None,
            })
            .collect();
        assert_eq!(
            shown,
            vec![
                (0, "carol".to_string()),
                (0, "a".to_string()),
                (300, "b".to_string()),
                (600, "c".to_string())
            ]
        );
    }
}
