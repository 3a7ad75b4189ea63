//! # Gift Queue
//!
//! Single-consumer loop around a mutual-exclusion showcase slot. While the
//! slot is occupied the consumer waits, up to `gift_poll` per check, and is
//! woken early when the slot is released. Once free it takes the next gift,
//! occupies the slot, shows it for `gift_display`, fades it, removes it after
//! `gift_removal` and frees the slot.
//!
//! Every gift therefore holds the slot for at least
//! `gift_display + gift_removal`, and gifts are shown strictly one at a time
//! in arrival order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use super::{GiftCard, GiftState, PresentationItem, PresentationTimings, Surface};
use crate::events::Event;

struct PendingGift {
    item: PresentationItem,
    card: GiftCard,
}

struct GiftSlotState {
    pending: VecDeque<PendingGift>,
    running: bool,
    active: Option<u64>,
}

struct GiftShared {
    state: Mutex<GiftSlotState>,
    released: Notify,
    next_id: AtomicU64,
    surface: Arc<dyn Surface>,
    timings: PresentationTimings,
}

impl GiftShared {
    fn lock(&self) -> MutexGuard<'_, GiftSlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// # Gift Queue
#[derive(Clone)]
pub struct GiftQueue {
    shared: Arc<GiftShared>,
}

impl GiftQueue {
    /// Creates an idle queue rendering onto `surface`.
    pub fn new(surface: Arc<dyn Surface>, timings: PresentationTimings) -> Self {
        Self {
            shared: Arc::new(GiftShared {
                state: Mutex::new(GiftSlotState {
                    pending: VecDeque::new(),
                    running: false,
                    active: None,
                }),
                released: Notify::new(),
                next_id: AtomicU64::new(0),
                surface,
                timings,
            }),
        }
    }

    /// Queues a gift as `Pending`, starting the consumer if it is idle.
    /// Non-gift events are ignored.
    pub fn enqueue(&self, item: PresentationItem) {
        let card = match &item.payload {
            Event::Gift {
                user,
                gift_name,
                amount,
            } => GiftCard {
                id: self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1,
                user: user.clone(),
                gift_name: gift_name.clone(),
                amount: *amount,
                state: GiftState::Pending,
            },
            other => {
                log::warn!("{} event routed to the gift queue; dropping it", other.kind());
                return;
            }
        };

        let start = {
            let mut state = self.shared.lock();
            state.pending.push_back(PendingGift { item, card });
            !std::mem::replace(&mut state.running, true)
        };
        if start {
            tokio::spawn(run(Arc::clone(&self.shared)));
        }
    }

    /// Gifts waiting for the slot.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Id of the gift occupying the slot.
    pub fn active(&self) -> Option<u64> {
        self.shared.lock().active
    }

    /// Whether the consumer loop is active.
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }
}

async fn wait_for_free_slot(shared: &GiftShared) {
    loop {
        let released = shared.released.notified();
        if shared.lock().active.is_none() {
            return;
        }
        tokio::select! {
            _ = released => {}
            _ = tokio::time::sleep(shared.timings.gift_poll) => {}
        }
    }
}

async fn run(shared: Arc<GiftShared>) {
    loop {
        // --- Phase 1: wait for the slot ---
        wait_for_free_slot(&shared).await;

        // --- Phase 2: claim it ---
        let PendingGift { item, mut card } = {
            let mut state = shared.lock();
            match state.pending.pop_front() {
                Some(next) => {
                    state.active = Some(next.card.id);
                    next
                }
                None => {
                    state.running = false;
                    break;
                }
            }
        };
        log::trace!(
            "Showing gift #{} queued {}ms ago",
            card.id,
            item.enqueued_at.elapsed().as_millis()
        );

        // --- Phase 3: show, fade, remove ---
        card.state = GiftState::Active;
        shared.surface.show_gift(&card);
        tokio::time::sleep(shared.timings.gift_display).await;

        card.state = GiftState::Fading;
        shared.surface.fade_gift(card.id);
        tokio::time::sleep(shared.timings.gift_removal).await;

        card.state = GiftState::Removed;
        shared.surface.remove_gift(card.id);

        // --- Phase 4: release ---
        shared.lock().active = None;
        shared.released.notify_waiters();
    }
}
